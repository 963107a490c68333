//! The runtime loop and the host-facing handle.
//!
//! [`OutputRuntime`] owns every component. [`OutputRuntime::start`] spawns its loop and returns a
//! [`RuntimeHandle`]; from then on the host only talks to the runtime through the handle.

mod fetcher;
mod handle;
#[allow(clippy::module_inception)]
mod runtime;

pub use fetcher::HostFetcher;
pub use handle::RuntimeHandle;
pub use runtime::OutputRuntime;
