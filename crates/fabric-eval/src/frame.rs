//! Frames: attribute maps whose values may be produced later.
//!
//! Readers call [`Frame::get_or_subscribe`]; if the attribute is not yet
//! produced the callback is parked until [`Frame::fulfil`] runs. Every
//! attribute is produced exactly once, after which it is read-only.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::FrameError;
use crate::value::Value;

/// Handle for a parked callback, used to release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// What [`Frame::get_or_subscribe`] did with the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// The frame has no such attribute; the callback was dropped.
    Absent,
    /// The value was ready and the callback already ran.
    Delivered,
    /// The callback is parked until the value is produced.
    Subscribed(SubscriptionId),
}

struct Subscriber {
    id: SubscriptionId,
    callback: Box<dyn FnOnce(Value)>,
}

enum Slot {
    Ready(Value),
    Pending(Vec<Subscriber>),
}

pub struct Frame {
    attributes: IndexMap<String, RefCell<Slot>>,
    next_subscription: Cell<u64>,
}

impl Frame {
    /// Deliver `name` to `callback`, now if it is ready, otherwise once it
    /// is produced.
    ///
    /// No borrow of the frame is held while the callback runs, so callbacks
    /// may read or subscribe to this frame again.
    pub fn get_or_subscribe(
        &self,
        name: &str,
        callback: impl FnOnce(Value) + 'static,
    ) -> Availability {
        let Some(slot) = self.attributes.get(name) else {
            return Availability::Absent;
        };
        let value = match &mut *slot.borrow_mut() {
            Slot::Ready(value) => value.clone(),
            Slot::Pending(subscribers) => {
                let id = SubscriptionId(self.next_subscription.get());
                self.next_subscription.set(id.0 + 1);
                subscribers.push(Subscriber {
                    id,
                    callback: Box::new(callback),
                });
                return Availability::Subscribed(id);
            }
        };
        callback(value);
        Availability::Delivered
    }

    /// Produce a pending attribute and run every parked callback.
    ///
    /// Returns the number of callbacks run.
    pub fn fulfil(&self, name: &str, value: Value) -> Result<usize, FrameError> {
        let slot = self
            .attributes
            .get(name)
            .ok_or_else(|| FrameError::UnknownAttribute(name.to_string()))?;
        let subscribers = {
            let mut slot = slot.borrow_mut();
            if matches!(*slot, Slot::Ready(_)) {
                return Err(FrameError::AlreadyResolved(name.to_string()));
            }
            match std::mem::replace(&mut *slot, Slot::Ready(value.clone())) {
                Slot::Pending(subscribers) => subscribers,
                Slot::Ready(_) => Vec::new(),
            }
        };
        let delivered = subscribers.len();
        tracing::trace!(attribute = name, delivered, "attribute produced");
        for subscriber in subscribers {
            (subscriber.callback)(value.clone());
        }
        Ok(delivered)
    }

    /// Drop a parked callback. Returns false if it already ran or was
    /// released.
    pub fn unsubscribe(&self, name: &str, id: SubscriptionId) -> bool {
        let Some(slot) = self.attributes.get(name) else {
            return false;
        };
        match &mut *slot.borrow_mut() {
            Slot::Pending(subscribers) => {
                let before = subscribers.len();
                subscribers.retain(|s| s.id != id);
                subscribers.len() != before
            }
            Slot::Ready(_) => false,
        }
    }

    /// The attribute's value, if it has been produced.
    pub fn get(&self, name: &str) -> Option<Value> {
        match &*self.attributes.get(name)?.borrow() {
            Slot::Ready(value) => Some(value.clone()),
            Slot::Pending(_) => None,
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Callbacks still parked on `name`.
    pub fn pending_subscriptions(&self, name: &str) -> usize {
        let Some(slot) = self.attributes.get(name) else {
            return 0;
        };
        match &*slot.borrow() {
            Slot::Pending(subscribers) => subscribers.len(),
            Slot::Ready(_) => 0,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("attributes", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

/// Declares a frame's attributes, each either ready or pending.
#[derive(Default)]
pub struct FrameBuilder {
    attributes: IndexMap<String, RefCell<Slot>>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready(mut self, name: &str, value: Value) -> Self {
        self.attributes
            .insert(name.to_string(), RefCell::new(Slot::Ready(value)));
        self
    }

    pub fn pending(mut self, name: &str) -> Self {
        self.attributes
            .insert(name.to_string(), RefCell::new(Slot::Pending(Vec::new())));
        self
    }

    pub fn build(self) -> Rc<Frame> {
        Rc::new(Frame {
            attributes: self.attributes,
            next_subscription: Cell::new(0),
        })
    }
}
