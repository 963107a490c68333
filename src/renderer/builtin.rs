//! Renderers shipped with the runtime: plain text and streams, images and markdown.
//!
//! They are registered under `builtin:` entrypoints and marked built-in, so any contributed
//! renderer for the same mime type takes precedence.

use super::{RendererApi, RendererContext, RendererDescriptor, RendererModule, RendererRegistry, StaticModuleLoader};
use crate::dom::{Container, NodeId, Tree};
use crate::errors::{LoaderError, RenderError};
use crate::output::OutputItem;
use futures::future::{self, BoxFuture, FutureExt};
use markdown::{mdast, to_mdast, ParseOptions};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const TEXT_RENDERER_ID: &str = "vscode.builtin-renderer";
pub const IMAGE_RENDERER_ID: &str = "vscode.builtin-image-renderer";
pub const MARKDOWN_RENDERER_ID: &str = "vscode.markdown-renderer";

pub const STDOUT_MIME: &str = "application/vnd.code.notebook.stdout";
pub const STDERR_MIME: &str = "application/vnd.code.notebook.stderr";
pub const ERROR_MIME: &str = "application/vnd.code.notebook.error";

const TRUNCATION_NOTICE: &str =
    "Output is truncated. View as a scrollable element or open in a text editor.";
const DEFAULT_IMAGE_HEIGHT: f32 = 150.0;

pub fn descriptors() -> Vec<RendererDescriptor> {
    vec![
        RendererDescriptor::new(TEXT_RENDERER_ID, "builtin:text")
            .with_mime_types([
                "text/plain",
                STDOUT_MIME,
                STDERR_MIME,
                ERROR_MIME,
                "application/json",
                "text/x-javascript",
            ])
            .builtin(),
        RendererDescriptor::new(IMAGE_RENDERER_ID, "builtin:image")
            .with_mime_types(["image/png", "image/jpeg", "image/gif", "image/svg+xml"])
            .builtin(),
        RendererDescriptor::new(MARKDOWN_RENDERER_ID, "builtin:markdown")
            .with_mime_types(["text/markdown", "text/x-markdown"])
            .builtin(),
    ]
}

/// Register the built-in modules with `loader` and their descriptors with `registry`.
pub fn register_builtins(loader: &StaticModuleLoader, registry: &RendererRegistry) -> Result<(), LoaderError> {
    loader.register_renderer("builtin:text", Arc::new(TextModule))?;
    loader.register_renderer("builtin:image", Arc::new(ImageModule))?;
    loader.register_renderer("builtin:markdown", Arc::new(MarkdownModule))?;
    for descriptor in descriptors() {
        registry.register(descriptor);
    }
    Ok(())
}

fn check(signal: &CancellationToken) -> Result<(), RenderError> {
    if signal.is_cancelled() {
        Err(RenderError::Cancelled)
    } else {
        Ok(())
    }
}

// ****************************************
// ** Text

struct TextModule;

impl RendererModule for TextModule {
    fn activate(&self, ctx: RendererContext) -> BoxFuture<'static, anyhow::Result<Arc<dyn RendererApi>>> {
        let api: Arc<dyn RendererApi> = Arc::new(TextRenderer { ctx });
        future::ready(Ok(api)).boxed()
    }
}

struct TextRenderer {
    ctx: RendererContext,
}

impl TextRenderer {
    fn body(item: &OutputItem) -> (String, &'static str) {
        match item.mime() {
            "application/json" => {
                let text = item
                    .json()
                    .ok()
                    .and_then(|v| serde_json::to_string_pretty(&v).ok())
                    .unwrap_or_else(|| item.text().into_owned());
                (text, "output-json")
            }
            ERROR_MIME => (format_error(item), "error"),
            STDERR_MIME => (item.text().into_owned(), "output-stream error"),
            STDOUT_MIME => (item.text().into_owned(), "output-stream"),
            _ => (item.text().into_owned(), "output-plaintext"),
        }
    }

    /// Append a streamed delta to the block painted by the previous render, if possible.
    fn try_append(container: &Container, appended: &str) -> bool {
        container.write(|t| {
            let Some(pre) = t.elements_by_tag("pre").into_iter().next() else { return false };
            if t.has_class(pre, "truncated") {
                return false;
            }
            match t.children(pre).last().copied().filter(|n| t.text(*n).is_some()) {
                Some(text) => t.append_to_text(text, appended),
                None => {
                    t.append_text(pre, appended);
                }
            }
            true
        })
    }
}

fn format_error(item: &OutputItem) -> String {
    let Ok(value) = item.json() else { return item.text().into_owned() };
    let field = |k: &str| value.get(k).and_then(|v| v.as_str()).unwrap_or_default().to_string();

    let stack = field("stack");
    if !stack.is_empty() {
        return stack;
    }
    match (field("name"), field("message")) {
        (name, message) if name.is_empty() => message,
        (name, message) => format!("{name}: {message}"),
    }
}

impl RendererApi for TextRenderer {
    fn render_output_item<'a>(
        &'a self,
        item: Arc<OutputItem>,
        container: Container,
        signal: CancellationToken,
    ) -> BoxFuture<'a, Result<(), RenderError>> {
        Box::pin(async move {
            check(&signal)?;
            if let Some(appended) = item.appended_text() {
                if Self::try_append(&container, &appended) {
                    return Ok(());
                }
            }

            let settings = self.ctx.settings();
            let (text, class) = Self::body(&item);
            let lines: Vec<&str> = text.lines().collect();
            let truncate = !settings.output_scrolling && lines.len() > settings.line_limit;
            check(&signal)?;

            container.write(|t| {
                let root = t.root();
                t.clear(root);
                let pre = t.append_element(root, "pre");
                for c in class.split(' ') {
                    t.add_class(pre, c);
                }
                if settings.output_word_wrap {
                    t.add_class(pre, "word-wrap");
                }
                if truncate {
                    t.add_class(pre, "truncated");
                    t.append_text(pre, &lines[..settings.line_limit].join("\n"));
                    let notice = t.append_element(root, "div");
                    t.add_class(notice, "truncation-message");
                    t.append_text(notice, TRUNCATION_NOTICE);
                } else if !text.is_empty() {
                    t.append_text(pre, &text);
                }
            });
            self.ctx.debug(format!("rendered {} ({} lines)", item.id(), lines.len()), None);
            Ok(())
        })
    }
}

// ****************************************
// ** Images

struct ImageModule;

impl RendererModule for ImageModule {
    fn activate(&self, _ctx: RendererContext) -> BoxFuture<'static, anyhow::Result<Arc<dyn RendererApi>>> {
        let api: Arc<dyn RendererApi> = Arc::new(ImageRenderer);
        future::ready(Ok(api)).boxed()
    }
}

struct ImageRenderer;

impl RendererApi for ImageRenderer {
    fn render_output_item<'a>(
        &'a self,
        item: Arc<OutputItem>,
        container: Container,
        signal: CancellationToken,
    ) -> BoxFuture<'a, Result<(), RenderError>> {
        Box::pin(async move {
            check(&signal)?;
            if item.data().is_empty() {
                return Err(RenderError::Fallback);
            }

            let metadata = item.metadata();
            let height = metadata
                .get("height")
                .and_then(|h| h.as_f64())
                .map(|h| h as f32)
                .unwrap_or(DEFAULT_IMAGE_HEIGHT);
            let alt = metadata.get("alt").and_then(|a| a.as_str()).unwrap_or_default();

            container.write(|t| {
                let root = t.root();
                t.clear(root);
                let img = t.append_element(root, "img");
                t.set_attr(img, "src", &format!("output-item:{}", item.id()));
                t.set_attr(img, "data-mime", item.mime());
                if !alt.is_empty() {
                    t.set_attr(img, "alt", alt);
                }
                t.set_height(img, Some(height));
            });
            Ok(())
        })
    }
}

// ****************************************
// ** Markdown

struct MarkdownModule;

impl RendererModule for MarkdownModule {
    fn activate(&self, ctx: RendererContext) -> BoxFuture<'static, anyhow::Result<Arc<dyn RendererApi>>> {
        let api: Arc<dyn RendererApi> = Arc::new(MarkdownRenderer { ctx });
        future::ready(Ok(api)).boxed()
    }
}

struct MarkdownRenderer {
    ctx: RendererContext,
}

impl RendererApi for MarkdownRenderer {
    fn render_output_item<'a>(
        &'a self,
        item: Arc<OutputItem>,
        container: Container,
        signal: CancellationToken,
    ) -> BoxFuture<'a, Result<(), RenderError>> {
        Box::pin(async move {
            check(&signal)?;
            let source = item.text();
            let ast = to_mdast(&source, &ParseOptions::gfm()).map_err(|e| RenderError::failed(e.to_string()))?;
            check(&signal)?;

            container.write(|t| {
                let root = t.root();
                t.clear(root);
                let shadow = t.attach_shadow(root);
                build_markdown(t, shadow, &ast);
            });
            self.ctx.debug(format!("rendered markup {}", item.id()), None);
            Ok(())
        })
    }
}

fn build_markdown(t: &mut Tree, parent: NodeId, node: &mdast::Node) {
    let children = |t: &mut Tree, el: NodeId, nodes: &[mdast::Node]| {
        for child in nodes {
            build_markdown(t, el, child);
        }
    };

    match node {
        mdast::Node::Root(root) => children(t, parent, &root.children),
        mdast::Node::Heading(heading) => {
            let el = t.append_element(parent, &format!("h{}", heading.depth.clamp(1, 6)));
            children(t, el, &heading.children);
        }
        mdast::Node::Paragraph(p) => {
            let el = t.append_element(parent, "p");
            children(t, el, &p.children);
        }
        mdast::Node::Text(text) => {
            t.append_text(parent, &text.value);
        }
        mdast::Node::Strong(strong) => {
            let el = t.append_element(parent, "strong");
            children(t, el, &strong.children);
        }
        mdast::Node::Emphasis(em) => {
            let el = t.append_element(parent, "em");
            children(t, el, &em.children);
        }
        mdast::Node::Delete(del) => {
            let el = t.append_element(parent, "span");
            t.set_style(el, "text-decoration", "line-through");
            children(t, el, &del.children);
        }
        mdast::Node::InlineCode(code) => {
            let el = t.append_element(parent, "code");
            t.append_text(el, &code.value);
        }
        mdast::Node::Link(link) => {
            let el = t.append_element(parent, "a");
            t.set_attr(el, "href", &link.url);
            children(t, el, &link.children);
        }
        mdast::Node::Image(image) => {
            let el = t.append_element(parent, "img");
            t.set_attr(el, "src", &image.url);
            t.set_attr(el, "alt", &image.alt);
        }
        mdast::Node::Break(_) => {
            t.append_text(parent, "\n");
        }
        mdast::Node::Code(code) => {
            let pre = t.append_element(parent, "pre");
            let el = t.append_element(pre, "code");
            if let Some(lang) = code.lang.as_deref().filter(|l| !l.is_empty()) {
                t.add_class(el, &format!("language-{lang}"));
            }
            t.append_text(el, &code.value);
        }
        mdast::Node::List(list) => {
            let el = t.append_element(parent, if list.ordered { "ol" } else { "ul" });
            children(t, el, &list.children);
        }
        mdast::Node::ListItem(item) => {
            let el = t.append_element(parent, "li");
            children(t, el, &item.children);
        }
        mdast::Node::Blockquote(quote) => {
            let el = t.append_element(parent, "blockquote");
            children(t, el, &quote.children);
        }
        mdast::Node::ThematicBreak(_) => {
            t.append_element(parent, "hr");
        }
        mdast::Node::Table(table) => {
            let el = t.append_element(parent, "table");
            children(t, el, &table.children);
        }
        mdast::Node::TableRow(row) => {
            let el = t.append_element(parent, "tr");
            children(t, el, &row.children);
        }
        mdast::Node::TableCell(cell) => {
            let el = t.append_element(parent, "td");
            children(t, el, &cell.children);
        }
        mdast::Node::Html(html) => {
            t.append_text(parent, &html.value);
        }
        other => {
            if let Some(nodes) = other.children() {
                children(t, parent, nodes);
            }
        }
    }
}
