//! Host ⇄ runtime message types.
//!
//! This module defines the closed set of messages exchanged between the host and the
//! runtime. Both directions are plain enums so the compiler checks every handler for
//! exhaustiveness; both are `serde`-tagged (`{"type": "render-output", ...}`) so a host
//! living in another process can speak JSON over whatever transport it owns.
//!
//! # Main Types
//!
//! - [`HostCommand`]: messages the host sends to the runtime.
//! - [`RuntimeEvent`]: messages the runtime emits back to the host.
//! - [`RenderOutputRequest`], [`OutputPayload`]: the body of a `render-output` command.
//! - [`Modifiers`]: keyboard modifiers carried by drop input.

use crate::config::{LogLevel, NotebookOptions, RendererSettings};
use crate::dimension::DimensionUpdate;
use crate::highlight::{FindMatchInfo, FindOptions};
use crate::input::SurfaceInput;
use crate::renderer::RendererDescriptor;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;
use tokio::sync::broadcast;

bitflags! {
    #[derive(Serialize, Deserialize, Default)]
    #[serde(transparent)]
    pub struct Modifiers: u8 {
        const SHIFT   = 0b0001;
        const CONTROL = 0b0010;
        const ALT     = 0b0100;
        const META    = 0b1000;
    }
}

impl Display for Modifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();

        if self.contains(Modifiers::SHIFT) {
            parts.push("Shift");
        }
        if self.contains(Modifiers::CONTROL) {
            parts.push("Control");
        }
        if self.contains(Modifiers::ALT) {
            parts.push("Alt");
        }
        if self.contains(Modifiers::META) {
            parts.push("Meta");
        }

        if parts.is_empty() {
            write!(f, "None")
        } else {
            write!(f, "{}", parts.join("+"))
        }
    }
}

/// Initial state of a markup (preview) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkupCellInit {
    pub cell_id: String,
    #[serde(default = "default_markup_mime")]
    pub mime: String,
    pub content: String,
    #[serde(default)]
    pub offset: f32,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub metadata: Value,
}

fn default_markup_mime() -> String {
    "text/markdown".to_string()
}

fn default_true() -> bool {
    true
}

/// Streaming delta appended to a previously rendered output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendedPayload {
    pub value_bytes: Vec<u8>,
    pub previous_version: u64,
}

/// A single output representation as sent by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputPayload {
    pub mime: String,
    pub value_bytes: Vec<u8>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub appended: Option<AppendedPayload>,
    /// Every mime type the output is available in, in preference order.
    #[serde(default)]
    pub all_mimes: Vec<String>,
}

impl OutputPayload {
    pub fn text(mime: impl Into<String>, text: impl AsRef<str>) -> Self {
        Self {
            mime: mime.into(),
            value_bytes: text.as_ref().as_bytes().to_vec(),
            metadata: Value::Null,
            appended: None,
            all_mimes: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutputRequest {
    pub cell_id: String,
    pub output_id: String,
    #[serde(default)]
    pub cell_top: f32,
    #[serde(default)]
    pub output_offset: f32,
    #[serde(default)]
    pub renderer_id: Option<String>,
    pub content: OutputPayload,
    #[serde(default)]
    pub create_on_idle: bool,
    #[serde(default)]
    pub initially_hidden: bool,
    #[serde(default)]
    pub required_preloads: Vec<String>,
    #[serde(default)]
    pub execution_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadResource {
    pub uri: String,
    #[serde(default)]
    pub original_uri: Option<String>,
}

/// Host acknowledgement of a reported output height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionAck {
    pub cell_id: String,
    pub output_id: String,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputScroll {
    pub cell_id: String,
    pub output_id: String,
    pub cell_top: f32,
    pub output_offset: f32,
    #[serde(default)]
    pub force_display: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupScroll {
    pub id: String,
    pub top: f32,
}

/// A fenced code block found in rendered content, reported so the host can colorize it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub id: String,
    pub value: String,
    pub lang: String,
}

/// Commands sent from the host to the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum HostCommand {
    // ****************************************
    // ** Markup cells
    /// Create or update a batch of markup cells; answered by `initialized-markup`.
    InitializeMarkup { request_id: u64, cells: Vec<MarkupCellInit> },
    CreateMarkupCell { cell: MarkupCellInit },
    ShowMarkupCell {
        id: String,
        top: f32,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        metadata: Option<Value>,
    },
    HideMarkupCells { ids: Vec<String> },
    UnhideMarkupCells { ids: Vec<String> },
    DeleteMarkupCell { ids: Vec<String> },
    UpdateMarkupScrolls { markup_cells: Vec<MarkupScroll> },
    UpdateSelectedCells { selected_cell_ids: Vec<String> },

    // ****************************************
    // ** Outputs
    RenderOutput(RenderOutputRequest),
    /// Drop every cell, output and in-flight task.
    Clear,
    ClearOutput {
        cell_id: String,
        output_id: String,
        #[serde(default)]
        renderer_id: Option<String>,
    },
    HideOutput { cell_id: String, output_id: String },
    ShowOutput {
        cell_id: String,
        output_id: String,
        cell_top: f32,
        #[serde(default)]
        content: Option<OutputPayload>,
        #[serde(default)]
        renderer_id: Option<String>,
    },
    AckDimension { updates: Vec<DimensionAck> },
    ViewScroll {
        #[serde(default)]
        widgets: Vec<OutputScroll>,
        #[serde(default)]
        markup_cells: Vec<MarkupScroll>,
    },
    Decorations {
        cell_id: String,
        #[serde(default)]
        added_class_names: Vec<String>,
        #[serde(default)]
        removed_class_names: Vec<String>,
    },

    // ****************************************
    // ** Renderers and preloads
    Preload { resources: Vec<PreloadResource> },
    UpdateRenderers { renderers: Vec<RendererDescriptor> },
    CustomRendererMessage { renderer_id: String, message: Value },
    ReturnOutputItem {
        request_id: u64,
        #[serde(default)]
        output: Option<OutputPayload>,
    },

    // ****************************************
    // ** Focus and input
    FocusOutput {
        cell_or_output_id: String,
        #[serde(default)]
        alternate_id: Option<String>,
    },
    BlurOutput,
    Input { event: SurfaceInput },

    // ****************************************
    // ** Presentation
    NotebookStyles { styles: BTreeMap<String, String> },
    NotebookOptions {
        options: NotebookOptions,
        #[serde(default)]
        render_options: Option<RendererSettings>,
    },

    // ****************************************
    // ** Find
    Find { query: String, options: FindOptions },
    FindHighlightCurrent { index: usize, owner_id: String },
    FindUnhighlightCurrent { index: usize, owner_id: String },
    FindStop { owner_id: String },

    // ****************************************
    // ** Runtime control
    EnableLogging { level: LogLevel },
    Shutdown,
}

/// Events emitted by the runtime to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum RuntimeEvent {
    // ****************************************
    // ** Lifecycle
    Initialized,
    InitializedMarkup { request_id: u64 },
    RuntimeShutdown,

    // ****************************************
    // ** Layout
    Dimension { updates: Vec<DimensionUpdate> },
    OutputResized { cell_id: String },
    ScrollToReveal { scroll_top: f32 },

    // ****************************************
    // ** Rendering
    RenderedMarkup { cell_id: String, html: String, code_blocks: Vec<CodeBlock> },
    RenderedCellOutput { output_id: String, code_blocks: Vec<CodeBlock> },
    GetOutputItem { request_id: u64, output_id: String, mime: String },
    CustomRendererMessage { renderer_id: String, message: Value },
    LogRendererDebugMessage {
        message: String,
        #[serde(default)]
        data: Option<Value>,
    },

    // ****************************************
    // ** Interaction
    ClickedLink { href: String },
    OutputFocus { id: String },
    OutputBlur { id: String },
    OutputInputFocus { id: String, input_focused: bool },
    #[serde(rename = "mouseenter")]
    MouseEnter { id: String },
    #[serde(rename = "mouseleave")]
    MouseLeave { id: String },
    CellDragStart { cell_id: String, drag_offset_y: f32 },
    CellDrag { cell_id: String, drag_offset_y: f32 },
    CellDragEnd { cell_id: String },
    CellDrop { cell_id: String, drag_offset_y: f32, ctrl_key: bool, alt_key: bool },

    // ****************************************
    // ** Find
    DidFind { matches: Vec<FindMatchInfo> },
    DidFindHighlightCurrent { offset: f32 },
}

/// Broadcast bus carrying [`RuntimeEvent`]s to every subscriber.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RuntimeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, ev: RuntimeEvent) {
        // Only fails when nobody is subscribed, in which case there is no one to tell.
        let _ = self.tx.send(ev);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::DEFAULT_CHANNEL_CAPACITY)
    }
}

impl HostCommand {
    /// Decode a command from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, crate::errors::RuntimeError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl RuntimeEvent {
    /// Encode the event into its JSON wire form.
    pub fn to_json(&self) -> Result<String, crate::errors::RuntimeError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_display() {
        assert_eq!(Modifiers::empty().to_string(), "None");
        assert_eq!((Modifiers::CONTROL | Modifiers::ALT).to_string(), "Control+Alt");
    }

    #[test]
    fn render_output_decodes_from_wire_form() {
        let cmd = HostCommand::from_json(
            r#"{
                "type": "render-output",
                "cellId": "c1",
                "outputId": "o1",
                "content": { "mime": "text/plain", "valueBytes": [104, 105] },
                "createOnIdle": true
            }"#,
        )
        .unwrap();

        match cmd {
            HostCommand::RenderOutput(req) => {
                assert_eq!(req.cell_id, "c1");
                assert_eq!(req.output_id, "o1");
                assert_eq!(req.content.value_bytes, b"hi".to_vec());
                assert!(req.create_on_idle);
                assert!(req.renderer_id.is_none());
                assert!(req.required_preloads.is_empty());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn struct_variant_fields_are_camel_case() {
        let cmd = HostCommand::from_json(
            r#"{ "type": "clear-output", "cellId": "c1", "outputId": "o1", "rendererId": "r1" }"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            HostCommand::ClearOutput {
                cell_id: "c1".into(),
                output_id: "o1".into(),
                renderer_id: Some("r1".into()),
            }
        );
    }

    #[test]
    fn events_encode_with_kebab_tags() {
        let json = RuntimeEvent::OutputResized { cell_id: "c1".into() }.to_json().unwrap();
        assert_eq!(json, r#"{"type":"output-resized","cellId":"c1"}"#);

        let json = RuntimeEvent::MouseEnter { id: "o1".into() }.to_json().unwrap();
        assert_eq!(json, r#"{"type":"mouseenter","id":"o1"}"#);
    }

    #[tokio::test]
    async fn bus_delivers_to_every_subscriber() {
        let bus = EventBus::default();
        bus.publish(RuntimeEvent::Initialized);

        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(RuntimeEvent::OutputBlur { id: "o1".into() });
        assert_eq!(a.recv().await.unwrap(), RuntimeEvent::OutputBlur { id: "o1".into() });
        assert_eq!(b.recv().await.unwrap(), RuntimeEvent::OutputBlur { id: "o1".into() });
    }

    #[test]
    fn markup_init_defaults() {
        let cell: MarkupCellInit =
            serde_json::from_str(r##"{ "cellId": "m1", "content": "# hi" }"##).unwrap();
        assert_eq!(cell.mime, "text/markdown");
        assert!(cell.visible);
        assert_eq!(cell.offset, 0.0);
    }
}
