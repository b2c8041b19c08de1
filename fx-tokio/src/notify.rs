//! # `notify` channel
//!
//! A simple notification channel which wraps [`tokio::sync::mpsc`] to
//! provide the additional property that if multiple notifications are sent
//! before the receiver calls [`Receiver::recv`], the receiver is only
//! notified once, preventing the receiver from doing duplicate work.
//!
//! Used by e.g. the DLQ retry loop to wake up whenever a handler parks an
//! entry, without queueing up one wakeup per parked entry.

use tokio::sync::mpsc;

/// Creates a new `notify` channel, returning a [`Sender`] (cloneable) and a
/// [`Receiver`] (not cloneable).
pub fn channel() -> (Sender, Receiver) {
    let (tx, rx) = mpsc::channel(1);
    (Sender(tx), Receiver(rx))
}

/// `notify` sender, analogous to `mpsc::Sender<()>`.
#[derive(Clone)]
pub struct Sender(mpsc::Sender<()>);

/// `notify` receiver, analogous to `mpsc::Receiver<()>`.
pub struct Receiver(mpsc::Receiver<()>);

impl Sender {
    /// Sends a notification to the [`Receiver`]. Never blocks.
    pub fn send(&self) {
        let _ = self.0.try_send(());
    }
}

impl Receiver {
    /// Waits until a notification is received. Completes immediately if a
    /// notification has already been sent. If all [`Sender`]s have been
    /// dropped, this future never completes.
    pub async fn recv(&mut self) {
        match self.0.recv().await {
            Some(()) => (),
            None => std::future::pending().await,
        }
    }
}
