use crate::events::{EventBus, OutputPayload, RuntimeEvent};
use crate::lock;
use crate::output::OutputItemFetcher;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Fetches alternate output representations from the host.
///
/// Each fetch emits `get-output-item` and waits for the matching `return-output-item`.
/// Dropping the fetch future forgets the request.
#[derive(Debug)]
pub struct HostFetcher {
    bus: EventBus,
    next_id: AtomicU64,
    pending: Arc<Mutex<PendingMap>>,
}

type PendingMap = HashMap<u64, oneshot::Sender<Option<OutputPayload>>>;

/// Removes a request from the pending map when its requester goes away.
struct PendingGuard {
    pending: Arc<Mutex<PendingMap>>,
    request_id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.request_id);
    }
}

impl HostFetcher {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Deliver the host's answer to request `request_id`.
    pub fn resolve(&self, request_id: u64, output: Option<OutputPayload>) {
        match lock(&self.pending).remove(&request_id) {
            // the requester may have given up; nothing to do then
            Some(tx) => {
                let _ = tx.send(output);
            }
            None => log::warn!("Fetch: answer for unknown request {request_id}"),
        }
    }

    /// Fail every outstanding request.
    pub fn cancel_all(&self) {
        lock(&self.pending).clear();
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl OutputItemFetcher for HostFetcher {
    fn fetch(&self, output_id: &str, mime: &str) -> BoxFuture<'static, Option<OutputPayload>> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(request_id, tx);

        log::debug!("Output[{output_id}]: requesting {mime} from host (request {request_id})");
        self.bus.publish(RuntimeEvent::GetOutputItem {
            request_id,
            output_id: output_id.to_string(),
            mime: mime.to_string(),
        });

        let guard = PendingGuard {
            pending: self.pending.clone(),
            request_id,
        };
        async move {
            let _guard = guard;
            rx.await.ok().flatten()
        }
        .boxed()
    }
}
