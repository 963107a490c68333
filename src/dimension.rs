//! Batched height reporting.
//!
//! Height changes are coalesced per id and sent to the host as a single `dimension` event when
//! the runtime loop flushes, once after each command and once per frame. Nothing else flushes,
//! so a burst of updates made between two flushes is always one message, whatever runtime
//! flavor the loop runs on.

use crate::events::{EventBus, RuntimeEvent};
use crate::lock;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionUpdate {
    pub id: String,
    pub height: f32,
    /// First report after a render.
    pub init: bool,
    pub is_output: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DimensionOptions {
    pub init: bool,
    pub is_output: bool,
}

impl DimensionOptions {
    pub fn output(init: bool) -> Self {
        Self { init, is_output: true }
    }

    pub fn markup() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone)]
pub struct DimensionReporter {
    pending: Arc<Mutex<Vec<DimensionUpdate>>>,
    bus: EventBus,
}

impl DimensionReporter {
    pub fn new(bus: EventBus) -> Self {
        Self {
            pending: Arc::new(Mutex::new(Vec::new())),
            bus,
        }
    }

    /// Record a new height for `id`.
    ///
    /// An entry already pending for an output keeps its `init` and `is_output` flags; only
    /// the height is replaced.
    pub fn update_height(&self, id: &str, height: f32, opts: DimensionOptions) {
        let mut pending = lock(&self.pending);
        match pending.iter_mut().find(|u| u.id == id) {
            Some(existing) if existing.is_output => existing.height = height,
            Some(existing) => {
                existing.height = height;
                existing.init = opts.init;
                existing.is_output = opts.is_output;
            }
            None => pending.push(DimensionUpdate {
                id: id.to_string(),
                height,
                init: opts.init,
                is_output: opts.is_output,
            }),
        }
    }

    /// Emit everything pending as one batch.
    pub fn flush_now(&self) {
        let updates = std::mem::take(&mut *lock(&self.pending));
        if updates.is_empty() {
            return;
        }
        log::trace!("Dimension: flushing {} update(s)", updates.len());
        self.bus.publish(RuntimeEvent::Dimension { updates });
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }
}
