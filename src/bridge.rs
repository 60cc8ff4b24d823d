//! Clipboard reader bridge.
//!
//! Runs in the context that is allowed to read the clipboard and answers
//! `read-clipboard` requests from the poller with `clipboard-data` replies.
//! It keeps no state and neither queues nor deduplicates requests.
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::{sync::oneshot, task::JoinHandle};

use crate::{ClipboardSource, Mailbox, Message, MessageBus, Target};

/// Relay between the message bus and a clipboard source
#[derive(Clone)]
pub struct ClipboardBridge {
    bus: MessageBus,
    source: Arc<dyn ClipboardSource>,
}

/// Running bridge task
pub struct BridgeHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ClipboardBridge {
    pub fn new(bus: MessageBus, source: Arc<dyn ClipboardSource>) -> Self {
        Self { bus, source }
    }

    /// Produces the reply to `message`, or `None` if it is not a read request for this bridge.
    pub async fn handle(&self, message: &Message) -> Option<Message> {
        if !message.is_for(Target::Offscreen) {
            return None;
        }
        match message {
            Message::ReadClipboard { .. } => {
                let read = self.source.read_text().await.map_err(|e| {
                    warn!("Bridge: error reading clipboard: {}", e);
                    e.to_string()
                });
                let reply = Message::clipboard_reply(read);
                Some(match message.request_id() {
                    Some(id) => reply.with_request_id(id),
                    None => reply,
                })
            }
            _ => None,
        }
    }

    /// Starts answering requests. The mailbox is opened before this returns,
    /// so requests published afterwards are never missed.
    pub fn spawn(self) -> BridgeHandle {
        let mut mailbox: Mailbox = self.bus.subscribe(Target::Offscreen);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            info!("Clipboard bridge started");
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("Clipboard bridge stopping...");
                        break;
                    }
                    // The bridge keeps a bus handle, so its mailbox never closes.
                    Some(message) = mailbox.recv() => {
                        if let Some(reply) = self.handle(&message).await {
                            debug!("Bridge replying to {:?}", message);
                            self.bus.publish(reply);
                        }
                    }
                }
            }
        });

        BridgeHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

impl BridgeHandle {
    /// Stops the bridge and waits for its task to finish.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = self.task.await {
            error!("Clipboard bridge task failed: {}", e);
        }
    }
}
