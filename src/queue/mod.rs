use crate::vscp::VscpEvent;
use log::{debug, warn};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

#[derive(Error, Debug, PartialEq)]
pub enum EmitError {
    #[error("Queue '{0}' is full, event dropped")]
    QueueFull(&'static str),
    #[error("Queue '{0}' is closed")]
    Closed(&'static str),
}

/// Anything events can be handed to. Pushing must never block the caller.
pub trait EventSink {
    fn push(&self, event: VscpEvent) -> Result<(), EmitError>;
}

/// Creates one direction of event traffic with a bounded capacity.
pub fn channel(name: &'static str, capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { name, tx }, EventReceiver { name, rx })
}

#[derive(Clone)]
pub struct EventSender {
    name: &'static str,
    tx: mpsc::Sender<VscpEvent>,
}

impl EventSender {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl EventSink for EventSender {
    fn push(&self, event: VscpEvent) -> Result<(), EmitError> {
        match self.tx.try_send(event) {
            Ok(_) => Ok(()),
            Err(TrySendError::Full(ev)) => {
                warn!("Queue {} full, dropping event class={} type={}", self.name, ev.vscp_class, ev.vscp_type);
                Err(EmitError::QueueFull(self.name))
            }
            Err(TrySendError::Closed(_)) => Err(EmitError::Closed(self.name)),
        }
    }
}

pub struct EventReceiver {
    name: &'static str,
    rx: mpsc::Receiver<VscpEvent>,
}

impl EventReceiver {
    /// Waits until an event is available. `None` once every sender is gone.
    pub async fn pop(&mut self) -> Option<VscpEvent> {
        self.rx.recv().await
    }

    /// Like `pop` but gives up after `timeout`.
    pub async fn pop_timeout(&mut self, timeout: Duration) -> Option<VscpEvent> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(ev) => ev,
            Err(_) => {
                debug!("No event on queue {} within {:?}", self.name, timeout);
                None
            }
        }
    }

    pub fn try_pop(&mut self) -> Option<VscpEvent> {
        match self.rx.try_recv() {
            Ok(ev) => Some(ev),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
