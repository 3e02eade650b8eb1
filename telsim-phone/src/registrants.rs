//! Listener lists
//!
//! A [`Registrants`] list fans an event out to every subscriber over an
//! unbounded channel. Subscribers that dropped their receiver are pruned on
//! the next notification.

use tokio::sync::mpsc;

/// Subscribers to one kind of event.
#[derive(Debug)]
pub struct Registrants<E> {
    listeners: Vec<mpsc::UnboundedSender<E>>,
}

impl<E> Default for Registrants<E> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<E: Clone> Registrants<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber and returns its receiving end.
    pub fn add(&mut self) -> mpsc::UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.push(tx);
        rx
    }

    /// Adds an existing sender as a subscriber.
    pub fn add_sender(&mut self, tx: mpsc::UnboundedSender<E>) {
        self.listeners.push(tx);
    }

    /// Delivers `event` to every live subscriber.
    pub fn notify(&mut self, event: E) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
