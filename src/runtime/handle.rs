use crate::errors::RuntimeError;
use crate::events::{EventBus, HostCommand, RuntimeEvent};
use tokio::sync::{broadcast, mpsc};

/// Host-side handle to a running [`OutputRuntime`](super::OutputRuntime). Cheap to clone.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    /// Commands into the runtime loop, in order.
    cmd_tx: mpsc::Sender<HostCommand>,
    /// Events out of the runtime.
    bus: EventBus,
}

impl RuntimeHandle {
    pub(crate) fn new(cmd_tx: mpsc::Sender<HostCommand>, bus: EventBus) -> Self {
        Self { cmd_tx, bus }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.bus.subscribe()
    }

    pub async fn send(&self, cmd: HostCommand) -> Result<(), RuntimeError> {
        self.cmd_tx.send(cmd).await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Decode a JSON command and send it.
    pub async fn send_json(&self, json: &str) -> Result<(), RuntimeError> {
        self.send(HostCommand::from_json(json)?).await
    }

    /// Ask the runtime to stop. It emits `runtime-shutdown` once everything is released.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.send(HostCommand::Shutdown).await
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}
