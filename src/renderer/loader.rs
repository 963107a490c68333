use super::RendererModule;
use crate::errors::LoaderError;
use crate::lock;
use crate::preload::PreloadModule;
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;

/// Produces renderer and preload modules from their uris.
pub trait ModuleLoader: Send + Sync {
    fn load_renderer(&self, entrypoint: &str) -> BoxFuture<'static, Result<Arc<dyn RendererModule>, LoaderError>>;
    fn load_preload(&self, uri: &str) -> BoxFuture<'static, Result<Arc<dyn PreloadModule>, LoaderError>>;
}

/// Loader backed by modules registered in-process.
#[derive(Clone, Default)]
pub struct StaticModuleLoader {
    renderers: Arc<Mutex<HashMap<String, Arc<dyn RendererModule>>>>,
    preloads: Arc<Mutex<HashMap<String, Arc<dyn PreloadModule>>>>,
}

impl std::fmt::Debug for StaticModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticModuleLoader")
            .field("renderers", &lock(&self.renderers).len())
            .field("preloads", &lock(&self.preloads).len())
            .finish()
    }
}

fn parse(uri: &str) -> Result<Url, LoaderError> {
    Url::parse(uri).map_err(|source| LoaderError::InvalidUri {
        uri: uri.to_string(),
        source,
    })
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_renderer(&self, entrypoint: &str, module: Arc<dyn RendererModule>) -> Result<(), LoaderError> {
        let url = parse(entrypoint)?;
        lock(&self.renderers).insert(url.to_string(), module);
        Ok(())
    }

    pub fn register_preload(&self, uri: &str, module: Arc<dyn PreloadModule>) -> Result<(), LoaderError> {
        let url = parse(uri)?;
        lock(&self.preloads).insert(url.to_string(), module);
        Ok(())
    }

    fn lookup<T: ?Sized>(map: &Mutex<HashMap<String, Arc<T>>>, uri: &str) -> Result<Arc<T>, LoaderError> {
        let url = parse(uri)?;
        lock(map)
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| LoaderError::NotFound(uri.to_string()))
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn load_renderer(&self, entrypoint: &str) -> BoxFuture<'static, Result<Arc<dyn RendererModule>, LoaderError>> {
        future::ready(Self::lookup(&*self.renderers, entrypoint)).boxed()
    }

    fn load_preload(&self, uri: &str) -> BoxFuture<'static, Result<Arc<dyn PreloadModule>, LoaderError>> {
        future::ready(Self::lookup(&*self.preloads, uri)).boxed()
    }
}
