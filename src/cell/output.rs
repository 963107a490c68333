use super::CellServices;
use crate::dimension::DimensionOptions;
use crate::dom::{Container, Edges};
use crate::events::RuntimeEvent;
use crate::lock;
use crate::output::OutputItem;
use crate::renderer::RenderOutcome;
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// One render request for a slot.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub item: Arc<OutputItem>,
    pub renderer_id: Option<String>,
    pub required_preloads: Vec<String>,
}

struct SlotState {
    /// Offset of the output inside its cell.
    offset: f32,
    /// Height acknowledged by the host.
    fixed_height: Option<f32>,
    visible: bool,
    renderer_id: Option<String>,
    item: Option<Arc<OutputItem>>,
    render: Option<CancellationToken>,
}

/// Rendering target of one output. The container is reused across renders so streamed
/// appends can extend what is already painted.
pub struct OutputSlot {
    output_id: String,
    cell_id: String,
    container: Container,
    state: Mutex<SlotState>,
    services: CellServices,
}

impl std::fmt::Debug for OutputSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSlot")
            .field("output_id", &self.output_id)
            .field("cell_id", &self.cell_id)
            .finish_non_exhaustive()
    }
}

impl OutputSlot {
    fn new(cell_id: &str, output_id: &str, offset: f32, services: CellServices) -> Arc<Self> {
        let container = services.new_container();
        container.write(|t| {
            let root = t.root();
            t.set_dom_id(root, output_id);
            t.add_class(root, "output_container");
        });

        Arc::new(Self {
            output_id: output_id.to_string(),
            cell_id: cell_id.to_string(),
            container,
            state: Mutex::new(SlotState {
                offset,
                fixed_height: None,
                visible: true,
                renderer_id: None,
                item: None,
                render: None,
            }),
            services,
        })
    }

    pub fn output_id(&self) -> &str {
        &self.output_id
    }

    pub fn cell_id(&self) -> &str {
        &self.cell_id
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn offset(&self) -> f32 {
        lock(&self.state).offset
    }

    pub fn set_offset(&self, offset: f32) {
        lock(&self.state).offset = offset;
    }

    pub fn fixed_height(&self) -> Option<f32> {
        lock(&self.state).fixed_height
    }

    pub fn set_fixed_height(&self, height: f32) {
        lock(&self.state).fixed_height = Some(height);
    }

    pub fn is_visible(&self) -> bool {
        lock(&self.state).visible
    }

    pub fn set_visible(&self, visible: bool) {
        lock(&self.state).visible = visible;
    }

    /// The item and renderer of the last render request.
    pub fn current(&self) -> Option<(Arc<OutputItem>, Option<String>)> {
        let state = lock(&self.state);
        state.item.clone().map(|item| (item, state.renderer_id.clone()))
    }

    /// Render `job` into this slot. Runs on the scheduler; `signal` is the output's record token.
    pub async fn render(self: Arc<Self>, job: RenderJob, signal: CancellationToken) {
        let token = signal.child_token();
        {
            let mut state = lock(&self.state);
            if let Some(previous) = state.render.replace(token.clone()) {
                previous.cancel();
            }
            state.item = Some(job.item.clone());
            state.renderer_id = job.renderer_id.clone();
        }

        let waits = job.required_preloads.iter().map(|uri| self.services.preloads.wait_for(uri));
        let failures: Vec<String> = join_all(waits)
            .await
            .into_iter()
            .filter_map(|r| r.err().map(|e| e.to_string()))
            .collect();
        if token.is_cancelled() {
            return;
        }

        if !failures.is_empty() {
            log::warn!("Output[{}]: {} preload(s) failed", self.output_id, failures.len());
            self.paint_preload_errors(&failures);
        } else {
            let outcome = self
                .services
                .registry
                .render(job.item.clone(), job.renderer_id.as_deref(), &self.container, token.clone())
                .await;
            if token.is_cancelled() || outcome == RenderOutcome::Cancelled {
                return;
            }
            if let RenderOutcome::Rendered { renderer_id } = outcome {
                lock(&self.state).renderer_id = Some(renderer_id);
            }
        }

        let height = self.measure();
        self.services.reporter.update_height(&self.output_id, height, DimensionOptions::output(true));
        self.services
            .tracker
            .observe(&self.output_id, &self.cell_id, self.container.clone(), true, Some(height));

        let code_blocks = super::collect_code_blocks(&self.container, &self.output_id);
        self.services.bus.publish(RuntimeEvent::RenderedCellOutput {
            output_id: self.output_id.clone(),
            code_blocks,
        });
    }

    /// Apply output padding according to whether anything visible was painted, and return
    /// the height to report.
    fn measure(&self) -> f32 {
        let settings = self.services.tracker.settings();
        let root = self.container.root();
        if settings.has_content(self.container.content_height()) {
            self.container.set_padding(root, settings.padding);
            self.container.offset_height()
        } else {
            self.container.set_padding(root, Edges::ZERO);
            0.0
        }
    }

    fn paint_preload_errors(&self, failures: &[String]) {
        self.container.write(|t| {
            let root = t.root();
            t.clear(root);
            let error = t.append_element(root, "div");
            t.add_class(error, "no-renderer-error");
            t.append_text(error, "Error loading preloads:");
            let list = t.append_element(root, "ul");
            for failure in failures {
                let li = t.append_element(list, "li");
                t.append_text(li, failure);
            }
        });
    }

    /// Stop rendering, stop observing and drop the painted content.
    pub(super) fn clear(&self) {
        if let Some(token) = lock(&self.state).render.take() {
            token.cancel();
        }
        self.services.tracker.unobserve(&self.output_id);
        self.container.clear();
    }
}

struct OutputCellState {
    top: f32,
    slots: Vec<Arc<OutputSlot>>,
}

/// Wrapper of every output of one code cell.
pub struct OutputCell {
    cell_id: String,
    /// Carries the cell's decoration classes.
    container: Container,
    state: Mutex<OutputCellState>,
    services: CellServices,
}

impl std::fmt::Debug for OutputCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputCell")
            .field("cell_id", &self.cell_id)
            .field("top", &self.top())
            .finish_non_exhaustive()
    }
}

impl OutputCell {
    pub(super) fn new(cell_id: &str, top: f32, services: CellServices) -> Arc<Self> {
        let container = services.new_container();
        container.write(|t| {
            let root = t.root();
            t.set_dom_id(root, cell_id);
            t.add_class(root, "cell_container");
            t.set_style(root, "top", &format!("{top}px"));
        });

        Arc::new(Self {
            cell_id: cell_id.to_string(),
            container,
            state: Mutex::new(OutputCellState { top, slots: Vec::new() }),
            services,
        })
    }

    pub fn cell_id(&self) -> &str {
        &self.cell_id
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn top(&self) -> f32 {
        lock(&self.state).top
    }

    pub fn set_top(&self, top: f32) {
        lock(&self.state).top = top;
        let root = self.container.root();
        self.container.set_style(root, "top", &format!("{top}px"));
    }

    /// The slot for `output_id`, created at `offset` if missing.
    pub fn ensure_slot(&self, output_id: &str, offset: f32) -> Arc<OutputSlot> {
        let mut state = lock(&self.state);
        if let Some(slot) = state.slots.iter().find(|s| s.output_id == output_id) {
            slot.set_offset(offset);
            return slot.clone();
        }
        let slot = OutputSlot::new(&self.cell_id, output_id, offset, self.services.clone());
        state.slots.push(slot.clone());
        slot
    }

    pub fn slot(&self, output_id: &str) -> Option<Arc<OutputSlot>> {
        lock(&self.state).slots.iter().find(|s| s.output_id == output_id).cloned()
    }

    pub fn slots(&self) -> Vec<Arc<OutputSlot>> {
        lock(&self.state).slots.clone()
    }

    pub(super) fn remove_slot(&self, output_id: &str) -> Option<Arc<OutputSlot>> {
        let mut state = lock(&self.state);
        let index = state.slots.iter().position(|s| s.output_id == output_id)?;
        let slot = state.slots.remove(index);
        drop(state);
        slot.clear();
        Some(slot)
    }

    pub fn apply_decorations(&self, added: &[String], removed: &[String]) {
        self.container.write(|t| {
            let root = t.root();
            for class in added {
                t.add_class(root, class);
            }
            for class in removed {
                t.remove_class(root, class);
            }
        });
    }

    pub(super) fn dispose(&self) {
        let slots = std::mem::take(&mut lock(&self.state).slots);
        for slot in slots {
            slot.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::test_support::{dimension_ids, drain, services, settle};
    use crate::events::OutputPayload;
    use crate::preload::PreloadModule;
    use futures::future::{self, BoxFuture, FutureExt};

    fn job(mime: &str, text: &str) -> RenderJob {
        RenderJob {
            item: Arc::new(OutputItem::new("o1", OutputPayload::text(mime, text))),
            renderer_id: None,
            required_preloads: vec![],
        }
    }

    #[tokio::test]
    async fn render_pads_reports_and_observes() {
        let (services, _loader) = services();
        let mut rx = services.bus.subscribe();
        let cell = OutputCell::new("c1", 0.0, services.clone());
        let slot = cell.ensure_slot("o1", 0.0);

        slot.clone().render(job("text/plain", "hi"), CancellationToken::new()).await;
        settle().await;
        services.reporter.flush_now();

        let events = drain(&mut rx);
        // 10px of text plus 8px padding top and bottom
        assert_eq!(dimension_ids(&events), vec![("o1".to_string(), 26.0, true)]);
        assert!(events.contains(&RuntimeEvent::RenderedCellOutput {
            output_id: "o1".into(),
            code_blocks: vec![]
        }));
        assert!(services.tracker.is_observed("o1"));
        assert_eq!(slot.current().map(|(_, r)| r), Some(Some("vscode.builtin-renderer".to_string())));
    }

    #[tokio::test]
    async fn empty_output_reports_zero_without_padding() {
        let (services, _loader) = services();
        let mut rx = services.bus.subscribe();
        let cell = OutputCell::new("c1", 0.0, services.clone());
        let slot = cell.ensure_slot("o1", 0.0);

        slot.clone().render(job("text/plain", ""), CancellationToken::new()).await;
        settle().await;
        services.reporter.flush_now();

        assert_eq!(dimension_ids(&drain(&mut rx)), vec![("o1".to_string(), 0.0, true)]);
        assert!(slot.container().read(|t| t.padding(t.root())).is_zero());
    }

    #[tokio::test]
    async fn cancelled_render_reports_nothing() {
        let (services, _loader) = services();
        let mut rx = services.bus.subscribe();
        let cell = OutputCell::new("c1", 0.0, services.clone());
        let slot = cell.ensure_slot("o1", 0.0);

        let signal = CancellationToken::new();
        signal.cancel();
        slot.clone().render(job("text/plain", "hi"), signal).await;
        settle().await;
        services.reporter.flush_now();

        assert!(drain(&mut rx).is_empty());
        assert_eq!(slot.container().text_content(), "");
    }

    struct FailingPreload;

    impl PreloadModule for FailingPreload {
        fn activate(&self, _ctx: crate::preload::PreloadContext) -> BoxFuture<'static, anyhow::Result<()>> {
            future::ready(Err(anyhow::anyhow!("bad preload"))).boxed()
        }
    }

    #[tokio::test]
    async fn preload_failures_are_painted_in_the_slot() {
        let (services, loader) = services();
        loader.register_preload("file:///p.js", Arc::new(FailingPreload)).unwrap();
        let _ = services.preloads.load("file:///p.js").await;

        let cell = OutputCell::new("c1", 0.0, services);
        let slot = cell.ensure_slot("o1", 0.0);
        let mut j = job("text/plain", "hi");
        j.required_preloads = vec!["file:///p.js".into(), "file:///missing.js".into()];
        slot.clone().render(j, CancellationToken::new()).await;

        let text = slot.container().text_content();
        assert!(text.starts_with("Error loading preloads:"));
        assert!(text.contains("bad preload"));
        assert!(text.contains("Preload not ready: file:///missing.js"));
    }

    #[tokio::test]
    async fn slots_are_created_once_and_decorations_apply_to_the_cell() {
        let (services, _loader) = services();
        let cell = OutputCell::new("c1", 10.0, services);
        let a = cell.ensure_slot("o1", 0.0);
        let b = cell.ensure_slot("o1", 30.0);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.offset(), 30.0);
        assert_eq!(cell.slots().len(), 1);

        cell.apply_decorations(&["running".into()], &[]);
        let root = cell.container().root();
        assert!(cell.container().has_class(root, "running"));
        cell.apply_decorations(&[], &["running".into()]);
        assert!(!cell.container().has_class(root, "running"));

        assert!(cell.remove_slot("o1").is_some());
        assert!(cell.slot("o1").is_none());
    }
}
