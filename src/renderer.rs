//! Renderer registry and module contracts.
//!
//! This module contains everything needed to turn an [`OutputItem`](crate::output::OutputItem)
//! into painted content: renderer descriptors, the traits renderer modules implement, the
//! loader that produces modules from entrypoints, the per-renderer context and the registry
//! that resolves, activates and invokes renderers with mime-type fallback.
//!
//! # Main Types
//!
//! - [`RendererDescriptor`]: static description of a renderer sent by the host.
//! - [`RendererModule`] / [`RendererApi`]: the plugin contract.
//! - [`ModuleLoader`] / [`StaticModuleLoader`]: how modules are obtained.
//! - [`RendererContext`]: state, settings and messaging offered to an activated renderer.
//! - [`RendererRegistry`]: resolution, memoized activation and the fallback protocol.

pub mod builtin;
mod context;
mod descriptor;
mod loader;
mod module;
mod registry;

pub use context::{RendererContext, RendererMessaging};
pub use descriptor::RendererDescriptor;
pub use loader::{ModuleLoader, StaticModuleLoader};
pub use module::{RendererApi, RendererModule};
pub use registry::{RenderOutcome, RendererRegistry};
