use super::{collect_code_blocks, CellServices};
use crate::dimension::DimensionOptions;
use crate::dom::Container;
use crate::events::{MarkupCellInit, OutputPayload, RuntimeEvent};
use crate::lock;
use crate::output::OutputItem;
use crate::renderer::RenderOutcome;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct MarkupState {
    mime: String,
    content: String,
    metadata: Value,
    /// Bumped on every content change; stale renders compare against it.
    version: u64,
    top: f32,
    render: Option<CancellationToken>,
}

/// A rendered markup (preview) cell.
pub struct MarkupCell {
    id: String,
    container: Container,
    state: Mutex<MarkupState>,
    services: CellServices,
}

impl std::fmt::Debug for MarkupCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkupCell")
            .field("id", &self.id)
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

impl MarkupCell {
    pub(super) fn new(init: &MarkupCellInit, services: CellServices) -> Arc<Self> {
        let container = services.new_container();
        container.write(|t| {
            let root = t.root();
            t.set_dom_id(root, &init.cell_id);
            t.add_class(root, "preview");
            t.set_style(root, "top", &format!("{}px", init.offset));
            t.set_style(root, "visibility", if init.visible { "visible" } else { "hidden" });
        });

        Arc::new(Self {
            id: init.cell_id.clone(),
            container,
            state: Mutex::new(MarkupState {
                mime: init.mime.clone(),
                content: init.content.clone(),
                metadata: init.metadata.clone(),
                version: 0,
                top: init.offset,
                render: None,
            }),
            services,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn version(&self) -> u64 {
        lock(&self.state).version
    }

    pub fn content(&self) -> String {
        lock(&self.state).content.clone()
    }

    pub fn top(&self) -> f32 {
        lock(&self.state).top
    }

    pub fn is_visible(&self) -> bool {
        self.container.style(self.container.root(), "visibility").as_deref() != Some("hidden")
    }

    /// Replace the content and re-render. Identical content and metadata are a no-op.
    pub fn update_content(self: &Arc<Self>, content: &str, metadata: Option<Value>) -> Option<JoinHandle<()>> {
        {
            let mut state = lock(&self.state);
            let metadata_changed = metadata.as_ref().is_some_and(|m| *m != state.metadata);
            if state.content == content && !metadata_changed {
                return None;
            }
            state.content = content.to_string();
            if let Some(m) = metadata {
                state.metadata = m;
            }
            state.version += 1;
        }
        Some(self.render())
    }

    /// Render the current content, superseding any render still in flight.
    pub fn render(self: &Arc<Self>) -> JoinHandle<()> {
        let token = CancellationToken::new();
        let (version, item) = {
            let mut state = lock(&self.state);
            if let Some(previous) = state.render.replace(token.clone()) {
                previous.cancel();
            }
            let payload = OutputPayload {
                metadata: state.metadata.clone(),
                ..OutputPayload::text(state.mime.clone(), &state.content)
            };
            (state.version, Arc::new(OutputItem::new(self.id.clone(), payload)))
        };

        let cell = self.clone();
        tokio::spawn(async move {
            let services = &cell.services;
            let outcome = services.registry.render(item, None, &cell.container, token.clone()).await;
            if token.is_cancelled() || outcome == RenderOutcome::Cancelled {
                return;
            }
            if lock(&cell.state).version != version {
                log::debug!("Markup[{}]: dropping stale render v{version}", cell.id);
                return;
            }

            let code_blocks = collect_code_blocks(&cell.container, &cell.id);
            services.bus.publish(RuntimeEvent::RenderedMarkup {
                cell_id: cell.id.clone(),
                html: cell.container.inner_html(),
                code_blocks,
            });

            let height = cell.container.offset_height();
            services.reporter.update_height(&cell.id, height, DimensionOptions::markup());
            services.tracker.observe(&cell.id, &cell.id, cell.container.clone(), false, Some(height));
        })
    }

    /// Make the cell visible at `top`, optionally with new content.
    pub fn show(self: &Arc<Self>, top: f32, content: Option<&str>, metadata: Option<Value>) -> Option<JoinHandle<()>> {
        self.set_visibility(true);
        self.set_top(top);
        match content {
            Some(content) => self.update_content(content, metadata),
            None => {
                self.services.tracker.measure_now(&self.id);
                None
            }
        }
    }

    pub fn hide(&self) {
        self.set_visibility(false);
    }

    pub fn unhide(&self) {
        self.set_visibility(true);
        self.services.tracker.measure_now(&self.id);
    }

    pub(super) fn set_visibility(&self, visible: bool) {
        let root = self.container.root();
        self.container.set_style(root, "visibility", if visible { "visible" } else { "hidden" });
    }

    /// Pure offset write; never re-renders.
    pub fn set_top(&self, top: f32) {
        lock(&self.state).top = top;
        let root = self.container.root();
        self.container.set_style(root, "top", &format!("{top}px"));
    }

    pub fn set_selected(&self, selected: bool) {
        let root = self.container.root();
        if selected {
            self.container.add_class(root, "selected");
        } else {
            self.container.remove_class(root, "selected");
        }
    }

    pub(super) fn remove(&self) {
        if let Some(token) = lock(&self.state).render.take() {
            token.cancel();
        }
        self.services.tracker.unobserve(&self.id);
        self.container.clear();
    }
}
