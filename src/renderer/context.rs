use super::registry::RegistryInner;
use super::{RendererApi, RendererRegistry};
use crate::config::RendererSettings;
use crate::events::{EventBus, RuntimeEvent};
use crate::lock;
use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};

/// Two-way message channel between a renderer and the host. Only handed to renderers whose
/// descriptor asks for messaging.
#[derive(Debug, Clone)]
pub struct RendererMessaging {
    renderer_id: String,
    bus: EventBus,
    incoming: broadcast::Sender<Value>,
}

impl RendererMessaging {
    pub(super) fn new(renderer_id: String, bus: EventBus, incoming: broadcast::Sender<Value>) -> Self {
        Self {
            renderer_id,
            bus,
            incoming,
        }
    }

    /// Send a message to the host (`custom-renderer-message`).
    pub fn post_message(&self, message: Value) {
        self.bus.publish(RuntimeEvent::CustomRendererMessage {
            renderer_id: self.renderer_id.clone(),
            message,
        });
    }

    /// Messages the host sends to this renderer.
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.incoming.subscribe()
    }
}

/// What an activated renderer can reach in the runtime.
#[derive(Clone)]
pub struct RendererContext {
    renderer_id: String,
    registry: Weak<RegistryInner>,
    settings: watch::Receiver<RendererSettings>,
    messaging: Option<RendererMessaging>,
    workspace_trusted: bool,
}

impl std::fmt::Debug for RendererContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererContext")
            .field("renderer_id", &self.renderer_id)
            .field("workspace_trusted", &self.workspace_trusted)
            .field("messaging", &self.messaging.is_some())
            .finish_non_exhaustive()
    }
}

impl RendererContext {
    pub(super) fn new(
        renderer_id: String,
        registry: Weak<RegistryInner>,
        settings: watch::Receiver<RendererSettings>,
        messaging: Option<RendererMessaging>,
        workspace_trusted: bool,
    ) -> Self {
        Self {
            renderer_id,
            registry,
            settings,
            messaging,
            workspace_trusted,
        }
    }

    pub fn renderer_id(&self) -> &str {
        &self.renderer_id
    }

    pub fn is_workspace_trusted(&self) -> bool {
        self.workspace_trusted
    }

    /// Current renderer settings.
    pub fn settings(&self) -> RendererSettings {
        self.settings.borrow().clone()
    }

    /// Receiver that is notified whenever the host changes renderer settings.
    pub fn settings_changes(&self) -> watch::Receiver<RendererSettings> {
        self.settings.clone()
    }

    pub fn messaging(&self) -> Option<&RendererMessaging> {
        self.messaging.as_ref()
    }

    /// State previously stored by this renderer with [`set_state`](Self::set_state).
    pub fn get_state(&self) -> Option<Value> {
        let inner = self.registry.upgrade()?;
        let state = lock(&inner.state).get(&self.renderer_id).cloned();
        state
    }

    pub fn set_state(&self, value: Value) {
        if let Some(inner) = self.registry.upgrade() {
            lock(&inner.state).insert(self.renderer_id.clone(), value);
        }
    }

    /// Load another renderer, typically the one this renderer extends.
    ///
    /// Returns the already activated api without waiting when there is one, so an extending
    /// renderer can reach its base while the base is still loading its dependants.
    pub fn get_renderer(&self, id: &str) -> BoxFuture<'static, Option<Arc<dyn RendererApi>>> {
        let Some(inner) = self.registry.upgrade() else {
            return future::ready(None).boxed();
        };
        let registry = RendererRegistry::from_inner(inner);
        if let Some(api) = registry.activated(id) {
            return future::ready(Some(api)).boxed();
        }
        registry.load_renderer(id).map(|res| res.ok()).boxed()
    }

    /// Debug log. Forwarded to the host when renderer debug logging is enabled.
    pub fn debug(&self, message: impl Into<String>, data: Option<Value>) {
        let message = message.into();
        log::debug!("Renderer[{}]: {}", self.renderer_id, message);

        let Some(inner) = self.registry.upgrade() else { return };
        if inner.debug_logging.load(Ordering::Relaxed) {
            inner.bus.publish(RuntimeEvent::LogRendererDebugMessage {
                message: format!("[{}] {}", self.renderer_id, message),
                data,
            });
        }
    }
}
