//! In-process message bus connecting the contexts.
//!
//! Sending a message delivers it to every current subscriber, like a runtime
//! broadcast between extension pages. Receivers filter by [`Target`].
use log::{debug, trace, warn};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{Message, Target};

const BUS_CAPACITY: usize = 64;

/// Cloneable handle on the shared broadcast channel
#[derive(Debug, Clone)]
pub struct MessageBus {
    sender: broadcast::Sender<Message>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Sends `message` to every subscriber, returning how many there were.
    /// Zero subscribers is not an error.
    pub fn publish(&self, message: Message) -> usize {
        trace!("Publishing {:?}", message);
        match self.sender.send(message) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("No context is listening; message dropped");
                0
            }
        }
    }

    /// Subscribes a context of kind `target`; it only sees messages for it.
    pub fn subscribe(&self, target: Target) -> Mailbox {
        Mailbox {
            target,
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiving end for one context
#[derive(Debug)]
pub struct Mailbox {
    target: Target,
    receiver: broadcast::Receiver<Message>,
}

impl Mailbox {
    /// Waits for the next message addressed to this context.
    /// Returns `None` once every [`MessageBus`] handle has been dropped.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if message.is_for(self.target) => return Some(message),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("{:?} mailbox lagged, {} messages skipped", self.target, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
