//! Cells: markup previews and output containers, and the view model that owns them.

mod markup;
mod output;
mod view_model;

pub use markup::MarkupCell;
pub use output::{OutputCell, OutputSlot, RenderJob};
pub use view_model::{CellViewModel, SearchKind, SearchTarget};

use crate::config::RuntimeConfig;
use crate::dimension::DimensionReporter;
use crate::dom::Container;
use crate::events::{CodeBlock, EventBus};
use crate::output::OutputItemFetcher;
use crate::preload::PreloadManager;
use crate::renderer::RendererRegistry;
use crate::resize::ResizeTracker;
use crate::scheduler::OutputScheduler;
use std::sync::Arc;

/// Top offset for output cells created only to carry decorations, off-screen until the host
/// positions them.
pub const OFFSCREEN_TOP: f32 = -100000.0;

/// Everything a cell needs to render and report. Cheap to clone.
#[derive(Clone)]
pub struct CellServices {
    pub registry: RendererRegistry,
    pub scheduler: OutputScheduler,
    pub preloads: PreloadManager,
    pub reporter: DimensionReporter,
    pub tracker: ResizeTracker,
    pub bus: EventBus,
    pub config: Arc<RuntimeConfig>,
    /// Source of alternate output representations, usually the host.
    pub fetcher: Option<Arc<dyn OutputItemFetcher>>,
}

impl CellServices {
    pub(crate) fn new_container(&self) -> Container {
        Container::new("div", self.config.line_height)
    }
}

/// Collect `pre > code.language-*` blocks and tag each with a dom id `{prefix}_{n}` so the
/// host can send back colorized html.
pub(crate) fn collect_code_blocks(container: &Container, prefix: &str) -> Vec<CodeBlock> {
    container.write(|t| {
        let mut blocks = Vec::new();
        for code in t.elements_by_tag("code") {
            let in_pre = t.parent(code).and_then(|p| t.tag(p)) == Some("pre");
            let lang = t
                .element(code)
                .and_then(|e| e.classes.iter().find_map(|c| c.strip_prefix("language-")))
                .map(str::to_string);
            let (true, Some(lang)) = (in_pre, lang) else { continue };

            let id = format!("{prefix}_{}", blocks.len());
            t.set_dom_id(code, &id);
            blocks.push(CodeBlock {
                id,
                value: t.text_content(code),
                lang,
            });
        }
        blocks
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_blocks_get_stable_ids() {
        let c = Container::new("div", 10.0);
        c.write(|t| {
            let root = t.root();
            let pre = t.append_element(root, "pre");
            let code = t.append_element(pre, "code");
            t.add_class(code, "language-rust");
            t.append_text(code, "fn x() {}");
            let inline = t.append_element(root, "code");
            t.append_text(inline, "not a block");
        });

        let blocks = collect_code_blocks(&c, "m1");
        assert_eq!(
            blocks,
            vec![CodeBlock {
                id: "m1_0".into(),
                value: "fn x() {}".into(),
                lang: "rust".into()
            }]
        );
        assert!(c.find_by_dom_id("m1_0").is_some());
    }
}
