use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::sync::mpsc;

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// The receiving half of a hook subscription. Owns the channel and the boxed async handler, and
/// drains events until every publisher has been dropped.
pub struct EventListener<E: Send + Sync + 'static> {
    receiver: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventListener<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventPublisher<E> {
        EventPublisher { sender: self.sender.clone() }
    }

    /// Runs the drain loop. Events are handled one at a time, in arrival order; the loop ends
    /// once the last publisher is gone and the queue is empty.
    pub async fn run(mut self) {
        // Drop the internal sender so the loop can end when the last subscriber disappears.
        drop(self.sender);
        debug!("📬️ Listener started");
        while let Some(event) = self.receiver.recv().await {
            trace!("📬️ Delivering event to hook");
            (self.handler)(event).await;
        }
        debug!("📬️ Listener drained; shutting down");
    }
}

/// The sending half of a hook subscription. Cheap to clone; delivery failures are logged and
/// otherwise ignored.
#[derive(Clone)]
pub struct EventPublisher<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventPublisher<E> {
    pub async fn publish(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Subscriber is gone; event dropped: {e}");
        }
    }
}
