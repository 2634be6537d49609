//! Single-item async mailbox shared by the UI and the turn orchestrator.
//!
//! A value handed to [`HandoffQueue::send`] goes straight to the oldest parked receiver when one
//! exists and is otherwise buffered in FIFO order for the next [`HandoffQueue::receive`].

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

#[derive(Default)]
struct Mailbox {
    buffer: VecDeque<String>,
    waiters: VecDeque<oneshot::Sender<String>>,
}

#[derive(Default)]
pub struct HandoffQueue {
    inner: Mutex<Mailbox>,
}

impl HandoffQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self, value: impl Into<String>) {
        let mut value = value.into();
        let mut mailbox = self.lock();
        while let Some(waiter) = mailbox.waiters.pop_front() {
            match waiter.send(value) {
                Ok(()) => return,
                // Receiver future was dropped; try the next one.
                Err(returned) => value = returned,
            }
        }
        mailbox.buffer.push_back(value);
    }

    /// Next buffered value, or park until one is sent.
    ///
    /// Resolves to `None` only when [`HandoffQueue::clear`] drops this receiver.
    pub async fn receive(&self) -> Option<String> {
        let rx = {
            let mut mailbox = self.lock();
            if let Some(value) = mailbox.buffer.pop_front() {
                return Some(value);
            }
            let (tx, rx) = oneshot::channel();
            mailbox.waiters.push_back(tx);
            rx
        };
        rx.await.ok()
    }

    pub fn has_waiting_receiver(&self) -> bool {
        let mut mailbox = self.lock();
        mailbox.waiters.retain(|waiter| !waiter.is_closed());
        !mailbox.waiters.is_empty()
    }

    pub fn buffered_len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn clear(&self) {
        let mut mailbox = self.lock();
        mailbox.buffer.clear();
        mailbox.waiters.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Mailbox> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn buffered_values_are_received_in_send_order() {
        let queue = HandoffQueue::new();
        for value in ["one", "two", "three"] {
            queue.send(value);
        }
        assert_eq!(queue.buffered_len(), 3);

        assert_eq!(queue.receive().await.as_deref(), Some("one"));
        assert_eq!(queue.receive().await.as_deref(), Some("two"));
        assert_eq!(queue.receive().await.as_deref(), Some("three"));
        assert_eq!(queue.buffered_len(), 0);
    }

    #[tokio::test]
    async fn send_goes_directly_to_parked_receiver() {
        let queue = Arc::new(HandoffQueue::new());
        let receiver = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.receive().await })
        };

        tokio::time::timeout(Duration::from_secs(1), async {
            while !queue.has_waiting_receiver() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("receiver should park");

        queue.send("hello");
        let received = receiver.await.expect("join");
        assert_eq!(received.as_deref(), Some("hello"));
        assert_eq!(queue.buffered_len(), 0);
        assert!(!queue.has_waiting_receiver());
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_swallow_values() {
        let queue = HandoffQueue::new();
        {
            let pending = queue.receive();
            let _ = tokio::time::timeout(Duration::from_millis(10), pending).await;
        }
        assert!(!queue.has_waiting_receiver());

        queue.send("kept");
        assert_eq!(queue.receive().await.as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn clear_drops_buffer_and_releases_waiters() {
        let queue = Arc::new(HandoffQueue::new());
        queue.send("stale");
        queue.clear();
        assert_eq!(queue.buffered_len(), 0);

        let receiver = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.receive().await })
        };
        tokio::time::timeout(Duration::from_secs(1), async {
            while !queue.has_waiting_receiver() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("receiver should park");

        queue.clear();
        assert_eq!(receiver.await.expect("join"), None);
    }
}
