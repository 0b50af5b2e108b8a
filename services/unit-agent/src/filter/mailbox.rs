//! Single-slot, overwrite-latest event delivery.
//!
//! A [`Mailbox`] is held by the filter loop; any number of
//! [`EventReceiver`]s can take from it. Each topic moves through
//! `Empty -> Pending -> Delivered`, and a delivered value can be re-armed
//! without the loop having to remember it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{watch, Notify};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot<T> {
    /// Nothing to deliver and nothing delivered since the last clear.
    Empty,
    /// Waiting to be taken by a receiver.
    Pending(T),
    /// Taken; kept so that it can be re-armed.
    Delivered(T),
}

#[derive(Debug)]
struct Inner<T> {
    slot: Slot<T>,
    closed: bool,
}

#[derive(Debug)]
struct Shared<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producing side of a topic. Dropping it closes the topic.
#[derive(Debug)]
pub struct Mailbox<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    slot: Slot::Empty,
                    closed: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// A new receiver for this topic.
    pub fn receiver(&self) -> EventReceiver<T> {
        EventReceiver {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Make `value` the pending event, replacing any undelivered one.
    pub fn put(&self, value: T) {
        self.shared.lock().slot = Slot::Pending(value);
        self.shared.notify.notify_waiters();
    }

    /// Fold `value` into the pending event, or make it pending if there is
    /// none.
    pub fn merge(&self, value: T, fold: impl FnOnce(&mut T, T)) {
        {
            let mut inner = self.shared.lock();
            if let Slot::Pending(pending) = &mut inner.slot {
                fold(pending, value);
            } else {
                inner.slot = Slot::Pending(value);
            }
        }
        self.shared.notify.notify_waiters();
    }

    /// Make the last delivered value pending again. Returns false if there
    /// was nothing to re-arm.
    pub fn rearm(&self) -> bool {
        let rearmed = {
            let mut inner = self.shared.lock();
            match std::mem::replace(&mut inner.slot, Slot::Empty) {
                Slot::Delivered(value) => {
                    inner.slot = Slot::Pending(value);
                    true
                }
                other => {
                    inner.slot = other;
                    false
                }
            }
        };
        if rearmed {
            self.shared.notify.notify_waiters();
        }
        rearmed
    }

    /// Drop any pending event and forget the delivered one.
    pub fn clear(&self) {
        self.shared.lock().slot = Slot::Empty;
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.shared.lock().slot, Slot::Pending(_))
    }

    /// Close the topic; receivers see `None` from then on.
    pub fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.notify.notify_waiters();
    }
}

impl<T: Clone> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Mailbox<T> {
    fn drop(&mut self) {
        self.shared.lock().closed = true;
        self.shared.notify.notify_waiters();
    }
}

/// Consuming side of a topic.
#[derive(Debug)]
pub struct EventReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for EventReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> EventReceiver<T> {
    /// Take the pending event without waiting.
    pub fn try_recv(&self) -> Option<T> {
        let mut inner = self.shared.lock();
        if inner.closed {
            return None;
        }
        match std::mem::replace(&mut inner.slot, Slot::Empty) {
            Slot::Pending(value) => {
                inner.slot = Slot::Delivered(value.clone());
                Some(value)
            }
            other => {
                inner.slot = other;
                None
            }
        }
    }

    /// Wait for the next event. Returns `None` once the topic is closed.
    /// Cancel-safe: an event is only taken when it is returned.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.try_recv() {
                return Some(value);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

/// One-shot signal that the unit has started to die. Once raised it stays
/// raised.
#[derive(Debug, Clone)]
pub struct UnitDying {
    rx: watch::Receiver<bool>,
}

impl UnitDying {
    pub(crate) fn channel() -> (watch::Sender<bool>, UnitDying) {
        let (tx, rx) = watch::channel(false);
        (tx, UnitDying { rx })
    }

    pub fn is_dying(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the unit is dying. Never resolves if the filter stops
    /// before that happens.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|dying| *dying).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_latest_value_wins() {
        let mailbox = Mailbox::new();
        let rx = mailbox.receiver();
        for i in 0..5 {
            mailbox.put(i);
        }
        assert_eq!(rx.try_recv(), Some(4));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn test_rearm_redelivers() {
        let mailbox = Mailbox::new();
        let rx = mailbox.receiver();
        assert!(!mailbox.rearm());

        mailbox.put("retry-hooks");
        assert!(!mailbox.rearm());
        assert_eq!(rx.try_recv(), Some("retry-hooks"));
        assert!(mailbox.rearm());
        assert_eq!(rx.try_recv(), Some("retry-hooks"));

        mailbox.clear();
        assert!(!mailbox.rearm());
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn test_merge_folds_into_pending() {
        let mailbox = Mailbox::new();
        let rx = mailbox.receiver();
        let fold = |pending: &mut Vec<i32>, new: Vec<i32>| pending.extend(new);

        mailbox.merge(vec![1], fold);
        mailbox.merge(vec![2, 3], fold);
        assert_eq!(rx.try_recv(), Some(vec![1, 2, 3]));

        mailbox.merge(vec![4], fold);
        assert_eq!(rx.try_recv(), Some(vec![4]));
    }

    #[tokio::test]
    async fn test_recv_wakes_on_put() {
        let mailbox = Mailbox::new();
        let rx = mailbox.receiver();
        let waiter = tokio::spawn(async move { rx.recv().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        mailbox.put(7);
        assert_eq!(waiter.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_drop_closes_receivers() {
        let mailbox = Mailbox::<()>::new();
        let rx = mailbox.receiver();
        mailbox.put(());
        drop(mailbox);
        assert!(rx.is_closed());
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_unit_dying_stays_raised() {
        let (tx, dying) = UnitDying::channel();
        assert!(!dying.is_dying());
        tx.send_replace(true);
        tx.send_replace(true);
        drop(tx);
        dying.wait().await;
        assert!(dying.is_dying());
    }
}
