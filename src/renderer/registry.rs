use super::context::{RendererContext, RendererMessaging};
use super::{ModuleLoader, RendererApi, RendererDescriptor};
use crate::config::RendererSettings;
use crate::dom::Container;
use crate::errors::{ActivationError, RenderError};
use crate::events::EventBus;
use crate::lock;
use crate::output::OutputItem;
use crate::preload::PreloadManager;
use crate::scheduler::OutputScheduler;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

const NOT_FOUND_VAR: &str = "--notebook-cell-renderer-not-found-error";
const EXHAUSTED_VAR: &str = "--notebook-cell-renderer-fallbacks-exhausted";
const DEFAULT_NOT_FOUND: &str = "No renderer could be found for output. It has the following mime type: $0";
const DEFAULT_EXHAUSTED: &str = "Could not render content for '$0'";
const RENDER_FAILED: &str = "Error rendering output";

type Activation = Shared<BoxFuture<'static, Result<Arc<dyn RendererApi>, ActivationError>>>;

/// What happened to a render request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered { renderer_id: String },
    /// No renderer handles the item's mime type; an error block was painted.
    NotFound,
    /// Every representation asked for fallback; an error block was painted.
    FallbacksExhausted,
    /// A renderer failed or could not be activated; an error block was painted.
    Failed(String),
    /// The signal fired; nothing more was painted.
    Cancelled,
}

struct RendererEntry {
    descriptor: RendererDescriptor,
    activation: Mutex<Option<Activation>>,
    /// Set as soon as `activate` returns, before dependants finish loading.
    api: Mutex<Option<Arc<dyn RendererApi>>>,
}

impl RendererEntry {
    fn new(descriptor: RendererDescriptor) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            activation: Mutex::new(None),
            api: Mutex::new(None),
        })
    }

    fn api(&self) -> Option<Arc<dyn RendererApi>> {
        lock(&self.api).clone()
    }
}

pub(super) struct RegistryInner {
    entries: Mutex<Vec<Arc<RendererEntry>>>,
    loader: Arc<dyn ModuleLoader>,
    preloads: PreloadManager,
    scheduler: OutputScheduler,
    pub(super) bus: EventBus,
    settings: watch::Sender<RendererSettings>,
    styles: Mutex<BTreeMap<String, String>>,
    pub(super) state: Mutex<HashMap<String, Value>>,
    channels: Mutex<HashMap<String, broadcast::Sender<Value>>>,
    workspace_trusted: bool,
    pub(super) debug_logging: AtomicBool,
}

/// Resolves, activates and invokes renderers.
///
/// Cloning is cheap; all clones share the same registry.
#[derive(Clone)]
pub struct RendererRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("renderers", &self.ids())
            .finish_non_exhaustive()
    }
}

impl RendererRegistry {
    pub fn new(
        loader: Arc<dyn ModuleLoader>,
        preloads: PreloadManager,
        scheduler: OutputScheduler,
        bus: EventBus,
        settings: RendererSettings,
        workspace_trusted: bool,
    ) -> Self {
        let (settings, _rx) = watch::channel(settings);
        Self {
            inner: Arc::new(RegistryInner {
                entries: Mutex::new(Vec::new()),
                loader,
                preloads,
                scheduler,
                bus,
                settings,
                styles: Mutex::new(BTreeMap::new()),
                state: Mutex::new(HashMap::new()),
                channels: Mutex::new(HashMap::new()),
                workspace_trusted,
                debug_logging: AtomicBool::new(false),
            }),
        }
    }

    pub(super) fn from_inner(inner: Arc<RegistryInner>) -> Self {
        Self { inner }
    }

    fn entry(&self, id: &str) -> Option<Arc<RendererEntry>> {
        lock(&self.inner.entries).iter().find(|e| e.descriptor.id == id).cloned()
    }

    /// Registered renderer ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        lock(&self.inner.entries).iter().map(|e| e.descriptor.id.clone()).collect()
    }

    pub fn descriptor(&self, id: &str) -> Option<RendererDescriptor> {
        self.entry(id).map(|e| e.descriptor.clone())
    }

    /// Add a renderer, or replace an existing one with the same id unless it is equivalent.
    pub fn register(&self, descriptor: RendererDescriptor) {
        let mut entries = lock(&self.inner.entries);
        match entries.iter_mut().find(|e| e.descriptor.id == descriptor.id) {
            Some(existing) if existing.descriptor.is_equivalent(&descriptor) => {}
            Some(existing) => {
                log::debug!("Renderer[{}]: replaced", descriptor.id);
                *existing = RendererEntry::new(descriptor);
            }
            None => entries.push(RendererEntry::new(descriptor)),
        }
    }

    /// Replace the whole renderer set.
    ///
    /// Equivalent renderers keep their entry, and with it their activation. Kept and replaced
    /// renderers stay in place; new ones are appended in the given order.
    pub fn update_all(&self, descriptors: Vec<RendererDescriptor>) {
        let removed: Vec<Arc<RendererEntry>> = {
            let mut entries = lock(&self.inner.entries);
            let wanted: HashSet<&str> = descriptors.iter().map(|d| d.id.as_str()).collect();
            let (kept, removed): (Vec<_>, Vec<_>) = entries
                .drain(..)
                .partition(|e| wanted.contains(e.descriptor.id.as_str()));
            *entries = kept;
            removed
        };

        for entry in removed {
            log::debug!("Renderer[{}]: removed", entry.descriptor.id);
            if let Some(api) = entry.api().filter(|api| api.supports_dispose()) {
                api.dispose_output_item(None);
            }
        }

        for descriptor in descriptors {
            self.register(descriptor);
        }
    }

    /// Pick the renderer for `mime`.
    ///
    /// A preferred id is looked up directly. Otherwise the first non-extending renderer that
    /// lists the mime type wins, with contributed renderers ahead of built-in ones.
    pub fn resolve(&self, preferred: Option<&str>, mime: &str) -> Option<RendererDescriptor> {
        if let Some(id) = preferred {
            return self.descriptor(id);
        }

        let entries = lock(&self.inner.entries);
        let mut candidates: Vec<&RendererDescriptor> = entries
            .iter()
            .map(|e| &e.descriptor)
            .filter(|d| d.extends.is_none() && d.supports_mime(mime))
            .collect();
        candidates.sort_by_key(|d| d.is_builtin);
        candidates.first().map(|d| (*d).clone())
    }

    /// The api of `id`, if it has already been activated.
    pub fn activated(&self, id: &str) -> Option<Arc<dyn RendererApi>> {
        self.entry(id).and_then(|e| e.api())
    }

    /// Activate renderer `id`, once.
    ///
    /// Waits for every preload requested so far, imports the module, activates it and then
    /// loads the renderers that extend it. The result, including failure, is memoized on the
    /// renderer's entry.
    pub fn load_renderer(&self, id: &str) -> BoxFuture<'static, Result<Arc<dyn RendererApi>, ActivationError>> {
        let Some(entry) = self.entry(id) else {
            return future::ready(Err(ActivationError::UnknownRenderer(id.to_string()))).boxed();
        };

        let mut slot = lock(&entry.activation);
        if let Some(activation) = slot.as_ref() {
            return activation.clone().boxed();
        }

        let activation = self.clone().activate(entry.clone()).boxed().shared();
        *slot = Some(activation.clone());
        activation.boxed()
    }

    async fn activate(self, entry: Arc<RendererEntry>) -> Result<Arc<dyn RendererApi>, ActivationError> {
        let id = entry.descriptor.id.clone();

        for result in self.inner.preloads.wait_for_all_current().await {
            if let Err(e) = result {
                log::warn!("Renderer[{id}]: {e}");
            }
        }

        let module = self
            .inner
            .loader
            .load_renderer(&entry.descriptor.entrypoint)
            .await
            .map_err(|e| {
                log::error!("Renderer[{id}]: import failed: {e}");
                ActivationError::Import {
                    renderer_id: id.clone(),
                    message: e.to_string(),
                }
            })?;

        let api = module.activate(self.context_for(&entry.descriptor)).await.map_err(|e| {
            log::error!("Renderer[{id}]: activation failed: {e:#}");
            ActivationError::Activate {
                renderer_id: id.clone(),
                message: format!("{e:#}"),
            }
        })?;
        *lock(&entry.api) = Some(api.clone());
        log::info!("Renderer[{id}]: activated");

        let dependants: Vec<String> = {
            let entries = lock(&self.inner.entries);
            entries
                .iter()
                .filter(|e| e.descriptor.extends.as_deref() == Some(id.as_str()))
                .map(|e| e.descriptor.id.clone())
                .filter(|dep| {
                    let cyclic = extends_chain_contains(&entries, &id, dep);
                    if cyclic {
                        log::warn!("Renderer[{id}]: skipping '{dep}', its extends chain is cyclic");
                    }
                    !cyclic
                })
                .collect()
        };

        let loads = dependants.iter().map(|dep| self.load_renderer(dep));
        for (dep, result) in dependants.iter().zip(future::join_all(loads).await) {
            if let Err(e) = result {
                log::warn!("Renderer[{id}]: dependant '{dep}' failed to load: {e}");
            }
        }

        Ok(api)
    }

    fn context_for(&self, descriptor: &RendererDescriptor) -> RendererContext {
        let messaging = descriptor.messaging.then(|| {
            RendererMessaging::new(
                descriptor.id.clone(),
                self.inner.bus.clone(),
                self.channel(&descriptor.id),
            )
        });

        RendererContext::new(
            descriptor.id.clone(),
            Arc::downgrade(&self.inner),
            self.inner.settings.subscribe(),
            messaging,
            self.inner.workspace_trusted,
        )
    }

    fn channel(&self, renderer_id: &str) -> broadcast::Sender<Value> {
        lock(&self.inner.channels)
            .entry(renderer_id.to_string())
            .or_insert_with(|| broadcast::channel(crate::DEFAULT_CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Deliver a host message to renderer `renderer_id`.
    pub fn post_message(&self, renderer_id: &str, message: Value) {
        if self.channel(renderer_id).send(message).is_err() {
            log::debug!("Renderer[{renderer_id}]: message dropped, nobody is listening");
        }
    }

    /// Render `item` into `container`, falling back through the item's other representations.
    ///
    /// Error blocks for missing renderers, exhausted fallbacks and failures are painted into
    /// the container. Nothing is painted once `signal` is cancelled.
    pub async fn render(
        &self,
        item: Arc<OutputItem>,
        preferred: Option<&str>,
        container: &Container,
        signal: CancellationToken,
    ) -> RenderOutcome {
        let Some(primary) = self.resolve(preferred, item.mime()) else {
            let message = self.error_text(NOT_FOUND_VAR, DEFAULT_NOT_FOUND, item.mime());
            log::warn!("Output[{}]: {message}", item.id());
            self.paint_error(&item, container, &message);
            return RenderOutcome::NotFound;
        };

        match self.try_render(&primary.id, item.clone(), container, &signal).await {
            Some(outcome) => return outcome,
            None => log::debug!("Renderer[{}]: fallback requested for {}", primary.id, item.mime()),
        }

        for mime in item.all_mimes() {
            if mime == item.mime() {
                continue;
            }
            let alternate = tokio::select! {
                _ = signal.cancelled() => return RenderOutcome::Cancelled,
                alternate = item.alternate(mime) => alternate,
            };
            let Some(alternate) = alternate else { continue };
            let Some(renderer) = self.resolve(None, alternate.mime()) else { continue };

            if let Some(outcome) = self.try_render(&renderer.id, alternate, container, &signal).await {
                return outcome;
            }
        }

        let message = self.error_text(EXHAUSTED_VAR, DEFAULT_EXHAUSTED, item.mime());
        self.paint_error(&item, container, &message);
        RenderOutcome::FallbacksExhausted
    }

    /// `None` means "try the next representation".
    async fn try_render(
        &self,
        renderer_id: &str,
        item: Arc<OutputItem>,
        container: &Container,
        signal: &CancellationToken,
    ) -> Option<RenderOutcome> {
        let loaded = tokio::select! {
            _ = signal.cancelled() => return Some(RenderOutcome::Cancelled),
            loaded = self.load_renderer(renderer_id) => loaded,
        };
        let api = match loaded {
            Ok(api) => api,
            Err(e) => {
                let message = e.to_string();
                log::error!("Renderer[{renderer_id}]: {message}");
                self.paint_error(&item, container, &message);
                return Some(RenderOutcome::Failed(message));
            }
        };

        let result = tokio::select! {
            _ = signal.cancelled() => return Some(RenderOutcome::Cancelled),
            result = api.render_output_item(item.clone(), container.clone(), signal.clone()) => result,
        };
        if signal.is_cancelled() {
            return Some(RenderOutcome::Cancelled);
        }

        match result {
            Ok(()) => Some(RenderOutcome::Rendered {
                renderer_id: renderer_id.to_string(),
            }),
            Err(RenderError::Fallback) => None,
            Err(RenderError::Cancelled) => Some(RenderOutcome::Cancelled),
            Err(RenderError::Failed(message)) => {
                log::error!("Renderer[{renderer_id}]: failed to render {}: {message}", item.id());
                self.paint_error(&item, container, RENDER_FAILED);
                Some(RenderOutcome::Failed(message))
            }
        }
    }

    fn error_text(&self, var: &str, default: &str, mime: &str) -> String {
        let styles = lock(&self.inner.styles);
        let template = styles
            .get(var)
            .map(|s| s.trim().trim_matches('"'))
            .filter(|s| !s.is_empty())
            .unwrap_or(default);
        template.replacen("$0", mime, 1)
    }

    fn paint_error(&self, item: &OutputItem, container: &Container, message: &str) {
        let text = item.text();
        container.write(|t| {
            let root = t.root();
            t.clear(root);
            let block = t.append_element(root, "div");
            let error = t.append_element(block, "div");
            t.add_class(error, "no-renderer-error");
            t.append_text(error, message);
            let body = t.append_element(block, "div");
            t.append_text(body, &text);
        });
    }

    /// Cancel all output work and let every activated renderer release its outputs.
    pub fn dispose_all(&self) {
        self.inner.scheduler.cancel_all();
        let entries: Vec<Arc<RendererEntry>> = lock(&self.inner.entries).clone();
        for entry in entries {
            if let Some(api) = entry.api().filter(|api| api.supports_dispose()) {
                api.dispose_output_item(None);
            }
        }
    }

    /// Cancel work for one output and let its renderer release it.
    pub fn clear_output(&self, renderer_id: &str, output_id: &str) {
        self.inner.scheduler.cancel_output(output_id);
        if let Some(api) = self.activated(renderer_id).filter(|api| api.supports_dispose()) {
            api.dispose_output_item(Some(output_id));
        }
    }

    /// Replace the notebook style variables used for error texts.
    pub fn set_styles(&self, styles: BTreeMap<String, String>) {
        *lock(&self.inner.styles) = styles;
    }

    pub fn update_settings(&self, settings: RendererSettings) {
        self.inner.settings.send_replace(settings);
    }

    pub fn settings(&self) -> RendererSettings {
        self.inner.settings.borrow().clone()
    }

    pub fn set_debug_logging(&self, on: bool) {
        self.inner.debug_logging.store(on, Ordering::Relaxed);
    }
}

/// Whether following `extends` links from `start` reaches `target` (`start` itself included).
fn extends_chain_contains(entries: &[Arc<RendererEntry>], start: &str, target: &str) -> bool {
    let mut seen = HashSet::new();
    let mut cursor = Some(start.to_string());
    while let Some(id) = cursor {
        if id == target {
            return true;
        }
        if !seen.insert(id.clone()) {
            return false;
        }
        cursor = entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .and_then(|e| e.descriptor.extends.clone());
    }
    false
}
