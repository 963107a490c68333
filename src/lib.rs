//! Output rendering runtime.
//!
//! An isolated surface that receives mime-typed output items from a host, activates pluggable
//! renderer modules to paint them into containers, and reports layout back so the host can
//! position the rendered content inside a larger scrollable document. It also carries an
//! in-surface find/highlight engine and focus and drag coordination.
//!
//! The host talks to the runtime through a [`RuntimeHandle`]: commands go in over a bounded
//! queue, events come back on a broadcast bus.

pub mod cell;
pub mod config;
pub mod dimension;
pub mod dom;
pub mod errors;
pub mod events;
pub mod highlight;
pub mod input;
pub mod logging;
pub mod output;
pub mod preload;
pub mod renderer;
pub mod resize;
pub mod runtime;
pub mod scheduler;

pub use config::RuntimeConfig;
pub use errors::{RenderError, RuntimeError};
pub use events::{HostCommand, RuntimeEvent};
pub use runtime::{OutputRuntime, RuntimeHandle};

use std::sync::{Mutex, MutexGuard};

/// Default capacity of the command queue and event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
