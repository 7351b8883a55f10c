//! Input events consumed by the photobooth and the queue that carries them.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// Window closed, signal received or shutdown requested by a remote.
    Shutdown,
    Keypress(char),
    MouseClick {
        button: MouseButton,
        position: (f64, f64),
    },
    /// Falling edge on a watched GPIO input channel.
    Gpio(u8),
}

/// Thread-safe handle used to inject events from callbacks.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<Event>,
}

impl EventSender {
    pub fn trigger(&self, event: Event) {
        // The queue lives as long as the display; a closed queue means we are
        // tearing down and the event no longer matters.
        if self.tx.send(event).is_err() {
            debug!(?event, "event queue closed; dropping event");
        }
    }
}

/// FIFO of pending events shared between the display and event producers.
#[derive(Debug)]
pub struct EventQueue {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    pub fn push(&self, event: Event) {
        // Both ends are owned by self, so the send cannot fail.
        let _ = self.tx.send(event);
    }

    pub fn try_next(&self) -> Option<Event> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn next_timeout(&self, timeout: Duration) -> Option<Event> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Drop pending input. Shutdown requests survive so they are never lost
    /// while a long action was running.
    pub fn cancel(&self) {
        let mut dropped = 0usize;
        let mut shutdown = false;
        while let Some(event) = self.try_next() {
            match event {
                Event::Shutdown => shutdown = true,
                _ => dropped += 1,
            }
        }
        if shutdown {
            self.push(Event::Shutdown);
        }
        if dropped > 0 {
            debug!(dropped, "cancelled pending events");
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
