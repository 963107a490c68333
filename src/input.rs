//! Translation of surface interaction into host events.
//!
//! The runtime has no event loop of its own to observe pointers and focus, so the embedder
//! forwards them as [`SurfaceInput`] inside `HostCommand::Input`. The [`InputCoordinator`]
//! keeps the small amount of state needed to turn them into host events: which output has
//! focus, and the drag in progress with its pending position.

use crate::cell::CellViewModel;
use crate::config::NotebookOptions;
use crate::events::{EventBus, Modifiers, RuntimeEvent};
use serde::{Deserialize, Serialize};

/// A user interaction observed on the surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SurfaceInput {
    // ****************************************
    // ** Pointer
    PointerEnter { output_id: String },
    PointerLeave { output_id: String },
    /// A link inside rendered content was activated.
    LinkActivated {
        href: String,
        #[serde(default)]
        output_id: Option<String>,
    },

    // ****************************************
    // ** Focus
    FocusIn {
        output_id: String,
        /// Focus landed on an input element inside the output.
        #[serde(default)]
        on_input: bool,
    },
    FocusOut {
        output_id: String,
        #[serde(default)]
        from_input: bool,
    },

    // ****************************************
    // ** Markup cell drag and drop
    DragStart { cell_id: String, client_y: f32 },
    Drag { cell_id: String, client_y: f32 },
    Drop {
        cell_id: String,
        client_y: f32,
        #[serde(default)]
        modifiers: Modifiers,
    },
    DragEnd { cell_id: String },
}

#[derive(Debug)]
struct DragState {
    cell_id: String,
    /// Latest position not yet reported; flushed on the next frame.
    pending: Option<f32>,
}

#[derive(Debug)]
pub struct InputCoordinator {
    bus: EventBus,
    drag_and_drop_enabled: bool,
    focused: Option<String>,
    drag: Option<DragState>,
}

impl InputCoordinator {
    pub fn new(bus: EventBus, options: &NotebookOptions) -> Self {
        Self {
            bus,
            drag_and_drop_enabled: options.drag_and_drop_enabled,
            focused: None,
            drag: None,
        }
    }

    pub fn update_options(&mut self, options: &NotebookOptions) {
        self.drag_and_drop_enabled = options.drag_and_drop_enabled;
        if !self.drag_and_drop_enabled {
            self.drag = None;
        }
    }

    /// Output currently holding focus.
    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn handle(&mut self, input: SurfaceInput, vm: &CellViewModel) {
        match input {
            SurfaceInput::PointerEnter { output_id } => {
                self.bus.publish(RuntimeEvent::MouseEnter { id: output_id });
            }
            SurfaceInput::PointerLeave { output_id } => {
                self.bus.publish(RuntimeEvent::MouseLeave { id: output_id });
            }
            SurfaceInput::LinkActivated { href, .. } => self.link_activated(href, vm),
            SurfaceInput::FocusIn { output_id, on_input } => {
                self.focus(&output_id);
                if on_input {
                    self.bus.publish(RuntimeEvent::OutputInputFocus {
                        id: output_id,
                        input_focused: true,
                    });
                }
            }
            SurfaceInput::FocusOut { output_id, from_input } => {
                if from_input {
                    self.bus.publish(RuntimeEvent::OutputInputFocus {
                        id: output_id.clone(),
                        input_focused: false,
                    });
                }
                if self.focused.as_deref() == Some(output_id.as_str()) {
                    self.blur();
                }
            }
            SurfaceInput::DragStart { cell_id, client_y } => {
                if !self.drag_and_drop_enabled {
                    log::debug!("Input: drag of {cell_id} ignored, drag and drop is disabled");
                    return;
                }
                self.drag = Some(DragState {
                    cell_id: cell_id.clone(),
                    pending: None,
                });
                self.bus.publish(RuntimeEvent::CellDragStart {
                    cell_id,
                    drag_offset_y: client_y,
                });
            }
            SurfaceInput::Drag { cell_id, client_y } => match self.drag.as_mut() {
                Some(drag) if drag.cell_id == cell_id => drag.pending = Some(client_y),
                _ => {}
            },
            SurfaceInput::Drop {
                cell_id,
                client_y,
                modifiers,
            } => {
                if self.drag.take().is_none() {
                    return;
                }
                self.bus.publish(RuntimeEvent::CellDrop {
                    cell_id,
                    drag_offset_y: client_y,
                    ctrl_key: modifiers.contains(Modifiers::CONTROL),
                    alt_key: modifiers.contains(Modifiers::ALT),
                });
            }
            SurfaceInput::DragEnd { cell_id } => {
                // a drop already ended the drag; the end still reaches the host
                if self.drag_and_drop_enabled {
                    self.drag = None;
                    self.bus.publish(RuntimeEvent::CellDragEnd { cell_id });
                }
            }
        }
    }

    /// Report the latest drag position, at most once per frame.
    pub fn on_frame(&mut self) {
        let Some(drag) = self.drag.as_mut() else { return };
        if let Some(y) = drag.pending.take() {
            self.bus.publish(RuntimeEvent::CellDrag {
                cell_id: drag.cell_id.clone(),
                drag_offset_y: y,
            });
        }
    }

    /// Move focus to `output_id`, blurring the previous output.
    pub fn focus(&mut self, output_id: &str) {
        if self.focused.as_deref() == Some(output_id) {
            return;
        }
        self.blur();
        self.focused = Some(output_id.to_string());
        self.bus.publish(RuntimeEvent::OutputFocus { id: output_id.to_string() });
    }

    pub fn blur(&mut self) {
        if let Some(id) = self.focused.take() {
            self.bus.publish(RuntimeEvent::OutputBlur { id });
        }
    }

    fn link_activated(&self, href: String, vm: &CellViewModel) {
        if let Some(fragment) = href.strip_prefix('#') {
            if let Some(scroll_top) = vm.locate(fragment) {
                self.bus.publish(RuntimeEvent::ScrollToReveal { scroll_top });
                return;
            }
            log::debug!("Input: fragment {href} not found in rendered content");
        }
        self.bus.publish(RuntimeEvent::ClickedLink { href });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::test_support::{drain, services, settle};
    use crate::events::MarkupCellInit;

    fn coordinator() -> (InputCoordinator, CellViewModel, tokio::sync::broadcast::Receiver<RuntimeEvent>) {
        let (services, _loader) = services();
        let rx = services.bus.subscribe();
        let input = InputCoordinator::new(services.bus.clone(), &NotebookOptions::default());
        (input, CellViewModel::new(services), rx)
    }

    #[tokio::test]
    async fn focus_moves_between_outputs() {
        let (mut input, vm, mut rx) = coordinator();
        input.handle(SurfaceInput::FocusIn { output_id: "o1".into(), on_input: false }, &vm);
        input.handle(SurfaceInput::FocusIn { output_id: "o1".into(), on_input: false }, &vm);
        input.focus("o2");
        assert_eq!(input.focused(), Some("o2"));

        assert_eq!(
            drain(&mut rx),
            vec![
                RuntimeEvent::OutputFocus { id: "o1".into() },
                RuntimeEvent::OutputBlur { id: "o1".into() },
                RuntimeEvent::OutputFocus { id: "o2".into() },
            ]
        );
    }

    #[tokio::test]
    async fn input_focus_is_reported_both_ways() {
        let (mut input, vm, mut rx) = coordinator();
        input.handle(SurfaceInput::FocusIn { output_id: "o1".into(), on_input: true }, &vm);
        input.handle(SurfaceInput::FocusOut { output_id: "o1".into(), from_input: true }, &vm);

        assert_eq!(
            drain(&mut rx),
            vec![
                RuntimeEvent::OutputFocus { id: "o1".into() },
                RuntimeEvent::OutputInputFocus { id: "o1".into(), input_focused: true },
                RuntimeEvent::OutputInputFocus { id: "o1".into(), input_focused: false },
                RuntimeEvent::OutputBlur { id: "o1".into() },
            ]
        );
        assert_eq!(input.focused(), None);
    }

    #[tokio::test]
    async fn drags_are_throttled_to_frames() {
        let (mut input, vm, mut rx) = coordinator();
        input.handle(SurfaceInput::DragStart { cell_id: "m1".into(), client_y: 1.0 }, &vm);
        for y in [2.0, 3.0, 4.0] {
            input.handle(SurfaceInput::Drag { cell_id: "m1".into(), client_y: y }, &vm);
        }
        input.on_frame();
        input.on_frame();
        input.handle(
            SurfaceInput::Drop {
                cell_id: "m1".into(),
                client_y: 5.0,
                modifiers: Modifiers::CONTROL,
            },
            &vm,
        );
        input.handle(SurfaceInput::DragEnd { cell_id: "m1".into() }, &vm);

        assert_eq!(
            drain(&mut rx),
            vec![
                RuntimeEvent::CellDragStart { cell_id: "m1".into(), drag_offset_y: 1.0 },
                RuntimeEvent::CellDrag { cell_id: "m1".into(), drag_offset_y: 4.0 },
                RuntimeEvent::CellDrop { cell_id: "m1".into(), drag_offset_y: 5.0, ctrl_key: true, alt_key: false },
                RuntimeEvent::CellDragEnd { cell_id: "m1".into() },
            ]
        );
        assert!(!input.is_dragging());
    }

    #[tokio::test]
    async fn drags_are_ignored_when_disabled() {
        let (mut input, vm, mut rx) = coordinator();
        input.update_options(&NotebookOptions {
            drag_and_drop_enabled: false,
            ..Default::default()
        });
        input.handle(SurfaceInput::DragStart { cell_id: "m1".into(), client_y: 1.0 }, &vm);
        input.handle(SurfaceInput::Drag { cell_id: "m1".into(), client_y: 2.0 }, &vm);
        input.on_frame();
        input.handle(SurfaceInput::DragEnd { cell_id: "m1".into() }, &vm);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn fragment_links_scroll_when_resolved() {
        let (mut input, mut vm, mut rx) = coordinator();
        let cell: MarkupCellInit = serde_json::from_value(serde_json::json!({
            "cellId": "m1",
            "content": "# Title\n\n```py\nx = 1\n```\n",
            "offset": 200.0,
        }))
        .unwrap();
        vm.ensure_markup_cell(&cell).unwrap().await.unwrap();
        settle().await;
        drain(&mut rx);

        input.handle(SurfaceInput::LinkActivated { href: "#m1_0".into(), output_id: None }, &vm);
        input.handle(SurfaceInput::LinkActivated { href: "#nowhere".into(), output_id: None }, &vm);
        input.handle(SurfaceInput::PointerEnter { output_id: "o1".into() }, &vm);

        assert_eq!(
            drain(&mut rx),
            vec![
                RuntimeEvent::ScrollToReveal { scroll_top: 210.0 },
                RuntimeEvent::ClickedLink { href: "#nowhere".into() },
                RuntimeEvent::MouseEnter { id: "o1".into() },
            ]
        );
    }

    #[test]
    fn input_decodes_from_wire_form() {
        let input: SurfaceInput =
            serde_json::from_value(serde_json::json!({ "kind": "drop", "cellId": "m1", "clientY": 3.0, "modifiers": 2 }))
                .unwrap();
        assert_eq!(
            input,
            SurfaceInput::Drop {
                cell_id: "m1".into(),
                client_y: 3.0,
                modifiers: Modifiers::CONTROL,
            }
        );
    }
}
