//! Event source capabilities
//!
//! A session subscribes to its sources on start and unsubscribes on stop.
//! Sources buffer events between polls; the session drains them into its
//! ingestion functions.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::mpsc::Receiver;

/// A source refused the subscription (API missing, permission denied, insecure context)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnavailable {
    pub reason: String,
}

impl SourceUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SourceUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event source unavailable: {}", self.reason)
    }
}

impl std::error::Error for SourceUnavailable {}

/// Subscribe/unsubscribe capability over a stream of events
pub trait EventSource<E> {
    fn subscribe(&mut self) -> Result<(), SourceUnavailable>;

    fn unsubscribe(&mut self);

    fn is_subscribed(&self) -> bool;

    /// Take every event received since the last drain
    fn drain(&mut self) -> Vec<E>;
}

#[derive(Debug)]
struct QueueState<E> {
    subscribed: bool,
    pending: VecDeque<E>,
}

/// Shared in-memory queue; clones are producer handles onto the same queue.
///
/// Pushes are dropped while no subscription is active.
#[derive(Debug)]
pub struct QueueSource<E> {
    state: Rc<RefCell<QueueState<E>>>,
}

impl<E> Clone for QueueSource<E> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<E> Default for QueueSource<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> QueueSource<E> {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(QueueState {
                subscribed: false,
                pending: VecDeque::new(),
            })),
        }
    }

    /// Queue an event; returns false if it was dropped for lack of a subscriber
    pub fn push(&self, event: E) -> bool {
        let mut state = self.state.borrow_mut();
        if !state.subscribed {
            return false;
        }
        state.pending.push_back(event);
        true
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().pending.len()
    }
}

impl<E> EventSource<E> for QueueSource<E> {
    fn subscribe(&mut self) -> Result<(), SourceUnavailable> {
        self.state.borrow_mut().subscribed = true;
        Ok(())
    }

    fn unsubscribe(&mut self) {
        let mut state = self.state.borrow_mut();
        state.subscribed = false;
        state.pending.clear();
    }

    fn is_subscribed(&self) -> bool {
        self.state.borrow().subscribed
    }

    fn drain(&mut self) -> Vec<E> {
        self.state.borrow_mut().pending.drain(..).collect()
    }
}

/// Receives events produced on another thread.
///
/// Unsubscribing drops the receiver, so the producer's `send` starts failing
/// and nothing accumulates after stop. A released source cannot subscribe
/// again; attach a fresh channel for the next monitoring period.
pub struct ChannelSource<E> {
    receiver: Option<Receiver<E>>,
    subscribed: bool,
}

impl<E> ChannelSource<E> {
    pub fn new(receiver: Receiver<E>) -> Self {
        Self {
            receiver: Some(receiver),
            subscribed: false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.receiver.is_none()
    }
}

impl<E> EventSource<E> for ChannelSource<E> {
    fn subscribe(&mut self) -> Result<(), SourceUnavailable> {
        let receiver = self
            .receiver
            .as_ref()
            .ok_or_else(|| SourceUnavailable::new("channel released by a previous stop"))?;
        // Anything sent before the subscription is stale
        while receiver.try_recv().is_ok() {}
        self.subscribed = true;
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.subscribed = false;
        self.receiver = None;
    }

    fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    fn drain(&mut self) -> Vec<E> {
        match &self.receiver {
            Some(receiver) if self.subscribed => receiver.try_iter().collect(),
            _ => Vec::new(),
        }
    }
}

/// A source whose subscription always fails
#[derive(Debug, Clone)]
pub struct UnavailableSource {
    reason: String,
}

impl UnavailableSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl<E> EventSource<E> for UnavailableSource {
    fn subscribe(&mut self) -> Result<(), SourceUnavailable> {
        Err(SourceUnavailable::new(self.reason.clone()))
    }

    fn unsubscribe(&mut self) {}

    fn is_subscribed(&self) -> bool {
        false
    }

    fn drain(&mut self) -> Vec<E> {
        Vec::new()
    }
}
