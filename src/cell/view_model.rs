use super::{CellServices, MarkupCell, OutputCell, OutputSlot, RenderJob, OFFSCREEN_TOP};
use crate::dom::Container;
use crate::events::{DimensionAck, MarkupCellInit, MarkupScroll, OutputPayload, OutputScroll, RenderOutputRequest};
use crate::output::OutputItem;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Kind of content a search target holds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SearchKind {
    /// A markup cell preview.
    Preview,
    Output,
}

/// A rendered container the find walk visits.
#[derive(Debug, Clone)]
pub struct SearchTarget {
    pub kind: SearchKind,
    /// Markup cell id or output id.
    pub id: String,
    pub cell_id: String,
    pub container: Container,
    /// Absolute top of the container in the document.
    pub top: f32,
}

/// Maps host commands onto cell and slot lifecycles.
///
/// Markup cells go absent → created → visible ⇄ hidden → removed; output slots go
/// absent → rendering → rendered ⇄ hidden → cleared.
pub struct CellViewModel {
    services: CellServices,
    markup: HashMap<String, Arc<MarkupCell>>,
    outputs: HashMap<String, Arc<OutputCell>>,
}

impl std::fmt::Debug for CellViewModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellViewModel")
            .field("markup", &self.markup.len())
            .field("outputs", &self.outputs.len())
            .finish_non_exhaustive()
    }
}

impl CellViewModel {
    pub fn new(services: CellServices) -> Self {
        Self {
            services,
            markup: HashMap::new(),
            outputs: HashMap::new(),
        }
    }

    pub fn services(&self) -> &CellServices {
        &self.services
    }

    // ---------- Markup ----------

    pub fn markup_cell(&self, id: &str) -> Option<Arc<MarkupCell>> {
        self.markup.get(id).cloned()
    }

    /// Create and render a markup cell. A cell that already exists is left alone and returned
    /// without a render.
    pub fn create_markup_cell(&mut self, init: &MarkupCellInit) -> (Arc<MarkupCell>, Option<JoinHandle<()>>) {
        if let Some(existing) = self.markup.get(&init.cell_id) {
            log::warn!("Markup[{}]: Trying to create markup that already exists", init.cell_id);
            return (existing.clone(), None);
        }
        let cell = MarkupCell::new(init, self.services.clone());
        let render = cell.render();
        self.markup.insert(init.cell_id.clone(), cell.clone());
        (cell, Some(render))
    }

    /// Update an existing markup cell in place, or create it.
    pub fn ensure_markup_cell(&mut self, init: &MarkupCellInit) -> Option<JoinHandle<()>> {
        let Some(cell) = self.markup.get(&init.cell_id) else {
            return self.create_markup_cell(init).1;
        };
        cell.set_visibility(init.visible);
        cell.set_top(init.offset);
        cell.update_content(&init.content, Some(init.metadata.clone()))
    }

    pub fn show_markup_cell(
        &mut self,
        id: &str,
        top: f32,
        content: Option<&str>,
        metadata: Option<Value>,
    ) -> Option<JoinHandle<()>> {
        let cell = self.expect_markup(id)?;
        cell.show(top, content, metadata)
    }

    pub fn hide_markup_cells(&self, ids: &[String]) {
        for id in ids {
            if let Some(cell) = self.expect_markup(id) {
                cell.hide();
            }
        }
    }

    pub fn unhide_markup_cells(&self, ids: &[String]) {
        for id in ids {
            if let Some(cell) = self.expect_markup(id) {
                cell.unhide();
            }
        }
    }

    pub fn delete_markup_cells(&mut self, ids: &[String]) {
        for id in ids {
            match self.markup.remove(id) {
                Some(cell) => cell.remove(),
                None => log::warn!("Markup[{id}]: delete of unknown cell"),
            }
        }
    }

    pub fn update_selected_cells(&self, selected: &[String]) {
        for (id, cell) in &self.markup {
            cell.set_selected(selected.contains(id));
        }
    }

    pub fn update_markup_scrolls(&self, scrolls: &[MarkupScroll]) {
        for scroll in scrolls {
            if let Some(cell) = self.markup.get(&scroll.id) {
                cell.set_top(scroll.top);
            }
        }
    }

    fn expect_markup(&self, id: &str) -> Option<Arc<MarkupCell>> {
        let cell = self.markup.get(id).cloned();
        if cell.is_none() {
            log::warn!("Markup[{id}]: Could not find markup cell");
        }
        cell
    }

    // ---------- Outputs ----------

    pub fn output_cell(&self, cell_id: &str) -> Option<Arc<OutputCell>> {
        self.outputs.get(cell_id).cloned()
    }

    /// Find the slot of `output_id` in any cell.
    pub fn slot(&self, output_id: &str) -> Option<Arc<OutputSlot>> {
        self.outputs.values().find_map(|c| c.slot(output_id))
    }

    /// The output cell for `cell_id`, created at `top` when missing. An existing cell is moved
    /// to `top` unless `skip_top_update` is set.
    pub fn ensure_output_cell(&mut self, cell_id: &str, top: f32, skip_top_update: bool) -> Arc<OutputCell> {
        if let Some(cell) = self.outputs.get(cell_id) {
            if !skip_top_update {
                cell.set_top(top);
            }
            return cell.clone();
        }
        let cell = OutputCell::new(cell_id, top, self.services.clone());
        self.outputs.insert(cell_id.to_string(), cell.clone());
        cell
    }

    /// Create the slot for the request and queue its render.
    pub fn render_output(&mut self, req: RenderOutputRequest) -> Arc<OutputSlot> {
        let cell = self.ensure_output_cell(&req.cell_id, req.cell_top, false);
        let slot = cell.ensure_slot(&req.output_id, req.output_offset);
        slot.set_visible(!req.initially_hidden);

        let job = RenderJob {
            item: self.output_item(&req.output_id, req.content),
            renderer_id: req.renderer_id,
            required_preloads: req.required_preloads,
        };
        self.schedule(&slot, job, req.create_on_idle);
        slot
    }

    fn output_item(&self, output_id: &str, payload: OutputPayload) -> Arc<OutputItem> {
        let item = OutputItem::new(output_id, payload);
        Arc::new(match &self.services.fetcher {
            Some(fetcher) => item.with_fetcher(fetcher.clone()),
            None => item,
        })
    }

    fn schedule(&self, slot: &Arc<OutputSlot>, job: RenderJob, on_idle: bool) {
        let target = slot.clone();
        let task = move |signal| target.render(job, signal);
        if on_idle {
            self.services.scheduler.enqueue_idle(slot.output_id(), task);
        } else {
            self.services.scheduler.enqueue(slot.output_id(), task);
        }
    }

    /// Cancel the output's work, let its renderer dispose it and drop the slot.
    pub fn clear_output(&mut self, cell_id: &str, output_id: &str, renderer_id: Option<&str>) {
        match renderer_id {
            Some(renderer_id) => self.services.registry.clear_output(renderer_id, output_id),
            None => self.services.scheduler.cancel_output(output_id),
        }
        let removed = self.outputs.get(cell_id).and_then(|c| c.remove_slot(output_id));
        if removed.is_none() {
            log::debug!("Output[{output_id}]: clear of unknown output in cell {cell_id}");
        }
    }

    pub fn hide_output(&self, cell_id: &str, output_id: &str) {
        if let Some(slot) = self.outputs.get(cell_id).and_then(|c| c.slot(output_id)) {
            slot.set_visible(false);
        }
    }

    /// Show a hidden output, re-rendering it when new content comes along.
    pub fn show_output(
        &mut self,
        cell_id: &str,
        output_id: &str,
        cell_top: f32,
        content: Option<OutputPayload>,
        renderer_id: Option<String>,
    ) {
        let cell = self.ensure_output_cell(cell_id, cell_top, false);
        let Some(slot) = cell.slot(output_id) else {
            log::warn!("Output[{output_id}]: show of unknown output");
            return;
        };
        slot.set_visible(true);

        if let Some(content) = content {
            let renderer_id = renderer_id.or_else(|| slot.current().and_then(|(_, r)| r));
            let job = RenderJob {
                item: self.output_item(output_id, content),
                renderer_id,
                required_preloads: vec![],
            };
            self.schedule(&slot, job, false);
        }
    }

    pub fn ack_dimension(&self, acks: &[DimensionAck]) {
        for ack in acks {
            if let Some(slot) = self.outputs.get(&ack.cell_id).and_then(|c| c.slot(&ack.output_id)) {
                slot.set_fixed_height(ack.height);
            }
        }
    }

    /// Apply decoration classes, creating the cell off-screen if it does not exist yet.
    pub fn decorations(&mut self, cell_id: &str, added: &[String], removed: &[String]) {
        let cell = self.ensure_output_cell(cell_id, OFFSCREEN_TOP, true);
        cell.apply_decorations(added, removed);
    }

    /// Offset writes for scrolled outputs. Never re-renders.
    pub fn view_scroll(&self, widgets: &[OutputScroll]) {
        for widget in widgets {
            let Some(cell) = self.outputs.get(&widget.cell_id) else { continue };
            cell.set_top(widget.cell_top);
            if let Some(slot) = cell.slot(&widget.output_id) {
                slot.set_offset(widget.output_offset);
                if widget.force_display {
                    slot.set_visible(true);
                }
            }
        }
    }

    /// Drop every cell. In-flight renders are cancelled before any container goes away.
    pub fn clear_all(&mut self) {
        self.services.registry.dispose_all();
        for (_, cell) in self.markup.drain() {
            cell.remove();
        }
        for (_, cell) in self.outputs.drain() {
            cell.dispose();
        }
    }

    // ---------- Queries ----------

    /// Visible containers in document order.
    pub fn searchable(&self, include_markup: bool, include_output: bool, cell_ids: &[String]) -> Vec<SearchTarget> {
        let wanted = |cell_id: &str| cell_ids.is_empty() || cell_ids.iter().any(|c| c == cell_id);
        let mut targets = Vec::new();

        if include_markup {
            for cell in self.markup.values().filter(|c| c.is_visible() && wanted(c.id())) {
                targets.push(SearchTarget {
                    kind: SearchKind::Preview,
                    id: cell.id().to_string(),
                    cell_id: cell.id().to_string(),
                    container: cell.container().clone(),
                    top: cell.top(),
                });
            }
        }

        if include_output {
            for cell in self.outputs.values().filter(|c| wanted(c.cell_id())) {
                let top = cell.top();
                for slot in cell.slots().into_iter().filter(|s| s.is_visible()) {
                    targets.push(SearchTarget {
                        kind: SearchKind::Output,
                        id: slot.output_id().to_string(),
                        cell_id: cell.cell_id().to_string(),
                        container: slot.container().clone(),
                        top: top + slot.offset(),
                    });
                }
            }
        }

        targets.sort_by(|a, b| a.top.total_cmp(&b.top).then_with(|| a.id.cmp(&b.id)));
        targets
    }

    /// Absolute top of the element with dom id `id` inside any rendered container.
    pub fn locate(&self, id: &str) -> Option<f32> {
        self.searchable(true, true, &[]).into_iter().find_map(|target| {
            let node = target.container.find_by_dom_id(id)?;
            Some(target.top + target.container.offset_top(node))
        })
    }

    /// Resolve a focus target: an output id, or a cell id meaning the cell's first output.
    pub fn focus_target(&self, cell_or_output_id: &str) -> Option<String> {
        if let Some(slot) = self.slot(cell_or_output_id) {
            return Some(slot.output_id().to_string());
        }
        self.outputs
            .get(cell_or_output_id)
            .and_then(|c| c.slots().first().map(|s| s.output_id().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::test_support::{dimension_ids, drain, services, settle};
    use crate::events::RuntimeEvent;

    fn markup(id: &str, content: &str) -> MarkupCellInit {
        serde_json::from_value(serde_json::json!({ "cellId": id, "content": content })).unwrap()
    }

    fn request(cell: &str, output: &str, text: &str) -> RenderOutputRequest {
        serde_json::from_value(serde_json::json!({
            "cellId": cell,
            "outputId": output,
            "cellTop": 100.0,
            "outputOffset": 5.0,
            "content": { "mime": "text/plain", "valueBytes": text.as_bytes() },
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn ensuring_twice_renders_and_reports_once() {
        let (services, _loader) = services();
        let mut rx = services.bus.subscribe();
        let mut vm = CellViewModel::new(services);

        vm.ensure_markup_cell(&markup("m1", "hello")).unwrap().await.unwrap();
        assert!(vm.ensure_markup_cell(&markup("m1", "hello")).is_none());
        settle().await;
        vm.services().reporter.flush_now();

        let events = drain(&mut rx);
        let rendered = events.iter().filter(|e| matches!(e, RuntimeEvent::RenderedMarkup { .. })).count();
        assert_eq!(rendered, 1);
        assert_eq!(dimension_ids(&events).len(), 1);
    }

    #[tokio::test]
    async fn duplicate_create_keeps_the_existing_cell() {
        let (services, _loader) = services();
        let mut vm = CellViewModel::new(services);
        let (first, render) = vm.create_markup_cell(&markup("m1", "a"));
        render.unwrap().await.unwrap();

        let (again, render) = vm.create_markup_cell(&markup("m1", "b"));
        assert!(render.is_none());
        assert!(Arc::ptr_eq(&first, &again));
        assert!(Arc::ptr_eq(&first, &vm.markup_cell("m1").unwrap()));
        assert_eq!(first.content(), "a");
    }

    #[tokio::test]
    async fn render_output_creates_cell_and_slot_lazily() {
        let (services, _loader) = services();
        let mut rx = services.bus.subscribe();
        let mut vm = CellViewModel::new(services);

        let slot = vm.render_output(request("c1", "o1", "hi"));
        assert_eq!(vm.output_cell("c1").unwrap().top(), 100.0);
        assert_eq!(slot.offset(), 5.0);
        settle().await;
        vm.services().reporter.flush_now();

        assert_eq!(slot.container().text_content(), "hi");
        assert_eq!(dimension_ids(&drain(&mut rx)), vec![("o1".to_string(), 26.0, true)]);
    }

    #[tokio::test]
    async fn skip_top_update_keeps_position() {
        let (services, _loader) = services();
        let mut vm = CellViewModel::new(services);
        vm.ensure_output_cell("c1", 10.0, false);
        vm.ensure_output_cell("c1", 50.0, true);
        assert_eq!(vm.output_cell("c1").unwrap().top(), 10.0);
        vm.ensure_output_cell("c1", 50.0, false);
        assert_eq!(vm.output_cell("c1").unwrap().top(), 50.0);
    }

    #[tokio::test]
    async fn decorations_create_an_offscreen_cell() {
        let (services, _loader) = services();
        let mut vm = CellViewModel::new(services);
        vm.decorations("c9", &["selected".into()], &[]);
        let cell = vm.output_cell("c9").unwrap();
        assert_eq!(cell.top(), OFFSCREEN_TOP);
        assert!(cell.container().has_class(cell.container().root(), "selected"));
    }

    #[tokio::test]
    async fn view_scroll_is_a_pure_offset_write() {
        let (services, _loader) = services();
        let mut rx = services.bus.subscribe();
        let mut vm = CellViewModel::new(services);
        let slot = vm.render_output(request("c1", "o1", "hi"));
        settle().await;
        vm.services().reporter.flush_now();
        drain(&mut rx);
        slot.set_visible(false);

        vm.view_scroll(&[OutputScroll {
            cell_id: "c1".into(),
            output_id: "o1".into(),
            cell_top: 300.0,
            output_offset: 12.0,
            force_display: true,
        }]);
        settle().await;
        vm.services().reporter.flush_now();

        assert_eq!(vm.output_cell("c1").unwrap().top(), 300.0);
        assert_eq!(slot.offset(), 12.0);
        assert!(slot.is_visible());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn clearing_a_settled_output_does_not_touch_its_replacement() {
        let (services, _loader) = services();
        let mut rx = services.bus.subscribe();
        let mut vm = CellViewModel::new(services);

        let old = vm.render_output(request("c1", "o1", "old"));
        settle().await;
        assert_eq!(old.container().text_content(), "old");

        vm.clear_output("c1", "o1", None);
        vm.services().reporter.flush_now();
        drain(&mut rx);
        let fresh = vm.render_output(request("c1", "o1", "new"));
        settle().await;
        vm.services().reporter.flush_now();

        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(fresh.container().text_content(), "new");
        assert!(vm.services().scheduler.has_record("o1"));
        assert_eq!(dimension_ids(&drain(&mut rx)), vec![("o1".to_string(), 26.0, true)]);
    }

    #[tokio::test]
    async fn clear_output_then_render_leaves_one_fresh_render() {
        let (services, _loader) = services();
        let mut rx = services.bus.subscribe();
        let mut vm = CellViewModel::new(services);

        vm.render_output(request("c1", "o1", "old"));
        vm.clear_output("c1", "o1", Some("vscode.builtin-renderer"));
        let slot = vm.render_output(request("c1", "o1", "new"));
        settle().await;
        vm.services().reporter.flush_now();

        assert_eq!(slot.container().text_content(), "new");
        let events = drain(&mut rx);
        assert_eq!(dimension_ids(&events), vec![("o1".to_string(), 26.0, true)]);
        let rendered = events
            .iter()
            .filter(|e| matches!(e, RuntimeEvent::RenderedCellOutput { .. }))
            .count();
        assert_eq!(rendered, 1);
    }

    #[tokio::test]
    async fn clear_all_cancels_and_drops_everything() {
        let (services, _loader) = services();
        let scheduler = services.scheduler.clone();
        let mut vm = CellViewModel::new(services);
        vm.create_markup_cell(&markup("m1", "x"));
        vm.render_output(request("c1", "o1", "hi"));

        vm.clear_all();
        assert!(!scheduler.has_record("o1"));
        assert!(vm.markup_cell("m1").is_none());
        assert!(vm.output_cell("c1").is_none());
    }

    #[tokio::test]
    async fn searchable_orders_by_top_and_skips_hidden() {
        let (services, _loader) = services();
        let mut vm = CellViewModel::new(services);
        let mut late = markup("m1", "x");
        late.offset = 500.0;
        vm.create_markup_cell(&late);
        vm.create_markup_cell(&markup("m2", "y"));
        vm.render_output(request("c1", "o1", "hi"));
        vm.hide_markup_cells(&["m2".into()]);

        let order: Vec<(SearchKind, String, f32)> =
            vm.searchable(true, true, &[]).into_iter().map(|t| (t.kind, t.id, t.top)).collect();
        assert_eq!(
            order,
            vec![
                (SearchKind::Output, "o1".to_string(), 105.0),
                (SearchKind::Preview, "m1".to_string(), 500.0),
            ]
        );
        assert_eq!(vm.searchable(true, true, &["c1".into()]).len(), 1);
        assert_eq!(vm.focus_target("c1").as_deref(), Some("o1"));
        assert_eq!(vm.focus_target("o1").as_deref(), Some("o1"));
        assert!(vm.focus_target("nope").is_none());
    }
}
