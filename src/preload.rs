//! Kernel preloads.
//!
//! Preloads are modules the host asks the runtime to run before renderers that depend on
//! them. Loading is idempotent per uri, and every load also waits for the preloads that were
//! already requested, so preloads activate in request order. Failures are captured as values:
//! a failing preload never poisons the barrier for everyone else.

use crate::errors::PreloadError;
use crate::lock;
use crate::renderer::ModuleLoader;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

/// What a preload module sees when it is activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadContext {
    pub is_workspace_trusted: bool,
}

/// A module run once before renderers that require it.
pub trait PreloadModule: Send + Sync {
    fn activate(&self, ctx: PreloadContext) -> BoxFuture<'static, anyhow::Result<()>>;
}

pub type PreloadFuture = Shared<BoxFuture<'static, Result<(), PreloadError>>>;

#[derive(Clone)]
pub struct PreloadManager {
    loader: Arc<dyn ModuleLoader>,
    workspace_trusted: bool,
    /// Requested preloads in request order.
    preloads: Arc<Mutex<Vec<(String, PreloadFuture)>>>,
}

impl Debug for PreloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let uris: Vec<String> = lock(&self.preloads).iter().map(|(u, _)| u.clone()).collect();
        f.debug_struct("PreloadManager")
            .field("preloads", &uris)
            .finish_non_exhaustive()
    }
}

impl PreloadManager {
    pub fn new(loader: Arc<dyn ModuleLoader>, workspace_trusted: bool) -> Self {
        Self {
            loader,
            workspace_trusted,
            preloads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Request the preload at `uri`. Returns the existing activation when already requested.
    ///
    /// The returned future is lazy; the runtime drives it by spawning a task that awaits it.
    pub fn load(&self, uri: &str) -> PreloadFuture {
        let mut preloads = lock(&self.preloads);
        if let Some((_, existing)) = preloads.iter().find(|(u, _)| u == uri) {
            return existing.clone();
        }

        let previous: Vec<PreloadFuture> = preloads.iter().map(|(_, f)| f.clone()).collect();
        let loader = self.loader.clone();
        let ctx = PreloadContext {
            is_workspace_trusted: self.workspace_trusted,
        };
        let owned_uri = uri.to_string();

        let run = async move {
            let module = loader
                .load_preload(&owned_uri)
                .await
                .map_err(|e| PreloadError::Failed {
                    uri: owned_uri.clone(),
                    message: e.to_string(),
                })?;
            module.activate(ctx).await.map_err(|e| PreloadError::Failed {
                uri: owned_uri.clone(),
                message: format!("{e:#}"),
            })
        };

        let fut = async move {
            let (result, _) = future::join(run, future::join_all(previous)).await;
            if let Err(e) = &result {
                log::warn!("Preload: {e}");
            }
            result
        }
        .boxed()
        .shared();

        preloads.push((uri.to_string(), fut.clone()));
        fut
    }

    /// Wait for a single preload. Resolves to an error immediately when `uri` was never requested.
    pub fn wait_for(&self, uri: &str) -> BoxFuture<'static, Result<(), PreloadError>> {
        let found = lock(&self.preloads)
            .iter()
            .find(|(u, _)| u == uri)
            .map(|(_, f)| f.clone());

        match found {
            Some(fut) => fut.boxed(),
            None => future::ready(Err(PreloadError::NotRequested(uri.to_string()))).boxed(),
        }
    }

    /// Barrier over every preload requested so far. Each result is reported as a value.
    pub fn wait_for_all_current(&self) -> BoxFuture<'static, Vec<Result<(), PreloadError>>> {
        let current: Vec<PreloadFuture> = lock(&self.preloads).iter().map(|(_, f)| f.clone()).collect();
        future::join_all(current).boxed()
    }

    pub fn is_requested(&self, uri: &str) -> bool {
        lock(&self.preloads).iter().any(|(u, _)| u == uri)
    }
}
