use super::RendererContext;
use crate::dom::Container;
use crate::errors::RenderError;
use crate::output::OutputItem;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// An activated renderer.
///
/// `render_output_item` paints `item` into `container`. Implementations should check `signal`
/// between expensive steps and stop painting once it is cancelled; returning
/// [`RenderError::Fallback`] asks the registry to try the output's next representation.
pub trait RendererApi: Send + Sync {
    fn render_output_item<'a>(
        &'a self,
        item: Arc<OutputItem>,
        container: Container,
        signal: CancellationToken,
    ) -> BoxFuture<'a, Result<(), RenderError>>;

    /// Whether [`dispose_output_item`](Self::dispose_output_item) does anything.
    fn supports_dispose(&self) -> bool {
        false
    }

    /// Release state for one output (`Some(id)`) or for every output (`None`).
    fn dispose_output_item(&self, _id: Option<&str>) {}
}

/// A loadable renderer module. Activated at most once per descriptor.
pub trait RendererModule: Send + Sync {
    fn activate(&self, ctx: RendererContext) -> BoxFuture<'static, anyhow::Result<Arc<dyn RendererApi>>>;
}
