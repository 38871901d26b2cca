//! Control channel handle
//!
//! The WebSocket writer task owns the receiving half; everything else
//! holds a `ClientChannel` and sends without awaiting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol::SignalEnvelope;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel full: client too slow to consume messages")]
    Full,
    #[error("Channel closed: client disconnected")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct ClientChannel {
    sender: mpsc::Sender<SignalEnvelope>,
    open: Arc<AtomicBool>,
}

impl ClientChannel {
    /// Create a channel with a bounded outbound queue
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SignalEnvelope>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                open: Arc::new(AtomicBool::new(true)),
            },
            receiver,
        )
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed) && !self.sender.is_closed()
    }

    /// Mark the channel closed; later sends fail with `Closed`
    pub fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
    }

    /// Queue a message without waiting
    ///
    /// A full queue drops the message; the client is too slow to keep up.
    pub fn send(&self, message: SignalEnvelope) -> Result<(), ChannelError> {
        if !self.open.load(Ordering::Relaxed) {
            return Err(ChannelError::Closed);
        }
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::Full,
            mpsc::error::TrySendError::Closed(_) => {
                self.close();
                ChannelError::Closed
            }
        })
    }
}
