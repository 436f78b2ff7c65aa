//! Broadcast notifier for one entity kind.

use tokio::sync::broadcast;
use tracing::trace;

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// A change notification carrying the entity's post-mutation value (for
/// deletes, the last-known value).
#[derive(Debug, Clone, PartialEq)]
pub struct EntityChange<T> {
    pub kind: ChangeKind,
    pub entity: T,
}

/// Broadcast channel for one entity kind.
///
/// Cloning the notifier shares the underlying channel; repositories hold a
/// clone each while the hub owns the canonical set.
pub struct ChangeNotifier<T: Clone> {
    tx: broadcast::Sender<EntityChange<T>>,
}

impl<T: Clone + Send + 'static> ChangeNotifier<T> {
    /// Create a notifier whose subscribers each buffer up to `capacity`
    /// undelivered changes before the oldest are dropped.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Deliver a change to all current subscribers. Fire-and-forget: a
    /// send with no subscribers is not an error.
    pub fn publish(&self, kind: ChangeKind, entity: T) {
        if self.tx.send(EntityChange { kind, entity }).is_err() {
            trace!("no subscribers for change notification");
        }
    }

    pub fn created(&self, entity: T) {
        self.publish(ChangeKind::Created, entity);
    }

    pub fn updated(&self, entity: T) {
        self.publish(ChangeKind::Updated, entity);
    }

    pub fn deleted(&self, entity: T) {
        self.publish(ChangeKind::Deleted, entity);
    }

    /// Subscribe to changes published from now on.
    pub fn subscribe(&self) -> ChangeStream<T> {
        ChangeStream {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone> Clone for ChangeNotifier<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// One subscriber's ordered view of a notifier's changes.
pub struct ChangeStream<T: Clone> {
    rx: broadcast::Receiver<EntityChange<T>>,
}

impl<T: Clone + Send + 'static> ChangeStream<T> {
    /// Wait for the next change. Returns `None` once the notifier is
    /// dropped and the buffer is drained. A lagged subscriber skips the
    /// dropped entries and resumes with the oldest still buffered.
    pub async fn next(&mut self) -> Option<EntityChange<T>> {
        loop {
            match self.rx.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!(skipped, "change subscriber lagged, oldest entries dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll used by tests and draining loops. `None` when no
    /// change is currently buffered.
    pub fn try_next(&mut self) -> Option<EntityChange<T>> {
        loop {
            match self.rx.try_recv() {
                Ok(change) => return Some(change),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    trace!(skipped, "change subscriber lagged, oldest entries dropped");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_to_multiple_subscribers() {
        let notifier = ChangeNotifier::<String>::new(8);
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();

        notifier.created("yellow belt".to_string());

        let a = first.next().await.unwrap();
        let b = second.next().await.unwrap();
        assert_eq!(a.kind, ChangeKind::Created);
        assert_eq!(a.entity, "yellow belt");
        assert_eq!(a, b);
        assert!(first.try_next().is_none());
        assert!(second.try_next().is_none());
    }

    #[tokio::test]
    async fn test_no_replay_for_late_subscribers() {
        let notifier = ChangeNotifier::<u32>::new(8);
        notifier.created(1);

        let mut late = notifier.subscribe();
        notifier.created(2);

        assert_eq!(late.next().await.unwrap().entity, 2);
        assert!(late.try_next().is_none());
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_oldest() {
        let notifier = ChangeNotifier::<u32>::new(2);
        let mut slow = notifier.subscribe();

        for i in 0..5 {
            notifier.updated(i);
        }

        // Oldest entries were dropped; delivery resumes at the tail.
        let first = slow.next().await.unwrap();
        assert_eq!(first.entity, 3);
        assert_eq!(slow.next().await.unwrap().entity, 4);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let notifier = ChangeNotifier::<u32>::new(4);
        notifier.deleted(7);
        assert_eq!(notifier.subscriber_count(), 0);
    }
}
