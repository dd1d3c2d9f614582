// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Typed publish/subscribe bus.
//!
//! [EventSource] is the boundary event waits subscribe through; [SharedEventBus] is an in-process implementation of
//! it. Handlers are keyed by event type. Publishing snapshots the handlers of a type and runs them with the bus
//! unlocked, so a handler may subscribe, unsubscribe or publish.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::parking_lot::Mutex;
use ::slab::Slab;
use ::std::{
    any::{
        Any,
        TypeId,
    },
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        Weak,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Event handler as handed to an [EventSource].
pub type EventHandler<T> = Box<dyn FnMut(&T) + Send>;

/// Type-erased `Mutex<EventHandler<T>>`.
type ErasedHandler = Arc<dyn Any + Send + Sync>;

/// Unsubscribes a handler exactly once: on [Subscription::unsubscribe] or on drop, whichever comes first.
pub struct Subscription(Option<Box<dyn FnOnce() + Send>>);

struct EventBus {
    topics: HashMap<TypeId, Slab<ErasedHandler>>,
}

/// Shared in-process event bus.
#[derive(Clone)]
pub struct SharedEventBus(Arc<Mutex<EventBus>>);

//======================================================================================================================
// Traits
//======================================================================================================================

/// Something that delivers events of type `T` to subscribed handlers.
pub trait EventSource<T> {
    fn subscribe(&self, handler: EventHandler<T>) -> Subscription;
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Subscription {
    pub fn new<F: FnOnce() + Send + 'static>(unsubscribe: F) -> Self {
        Self(Some(Box::new(unsubscribe)))
    }

    /// A subscription with nothing to undo.
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn is_subscribed(&self) -> bool {
        self.0.is_some()
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.0.take() {
            unsubscribe();
        }
    }
}

impl SharedEventBus {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(EventBus {
            topics: HashMap::new(),
        })))
    }

    /// Subscribes a closure to events of type `T`.
    pub fn listen<T, F>(&self, handler: F) -> Subscription
    where
        T: 'static,
        F: FnMut(&T) + Send + 'static,
    {
        EventSource::<T>::subscribe(self, Box::new(handler))
    }

    /// Delivers `event` to every handler subscribed to `T` at the time of the call. Returns how many ran.
    pub fn publish<T: 'static>(&self, event: &T) -> usize {
        let handlers: Vec<ErasedHandler> = match self.0.lock().topics.get(&TypeId::of::<T>()) {
            Some(handlers) => handlers.iter().map(|(_, handler)| handler.clone()).collect(),
            None => return 0,
        };
        let mut delivered: usize = 0;
        for handler in handlers {
            let handler: &Mutex<EventHandler<T>> = match (*handler).downcast_ref::<Mutex<EventHandler<T>>>() {
                Some(handler) => handler,
                None => {
                    error!("publish(): handler registered under the wrong type");
                    continue;
                },
            };
            // A handler that publishes the event it is handling does not see it again.
            match handler.try_lock() {
                Some(mut handler) => {
                    (*handler)(event);
                    delivered += 1;
                },
                None => trace!("publish(): handler is already running, skipping"),
            }
        }
        delivered
    }

    /// Number of live subscriptions to `T`.
    pub fn num_subscribers<T: 'static>(&self) -> usize {
        self.0
            .lock()
            .topics
            .get(&TypeId::of::<T>())
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }

    fn unsubscribe(bus: &Weak<Mutex<EventBus>>, topic: TypeId, key: usize) {
        let bus: Arc<Mutex<EventBus>> = match bus.upgrade() {
            Some(bus) => bus,
            None => return,
        };
        let mut bus = bus.lock();
        if let Some(handlers) = bus.topics.get_mut(&topic) {
            if handlers.try_remove(key).is_none() {
                warn!("unsubscribe(): no such handler (key={:?})", key);
            }
            if handlers.is_empty() {
                bus.topics.remove(&topic);
            }
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<T: 'static> EventSource<T> for SharedEventBus {
    fn subscribe(&self, handler: EventHandler<T>) -> Subscription {
        let topic: TypeId = TypeId::of::<T>();
        let erased: ErasedHandler = Arc::new(Mutex::new(handler));
        let key: usize = self.0.lock().topics.entry(topic).or_default().insert(erased);
        trace!("subscribe(): key={:?}", key);
        let bus: Weak<Mutex<EventBus>> = Arc::downgrade(&self.0);
        Subscription::new(move || Self::unsubscribe(&bus, topic, key))
    }
}

impl Default for SharedEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subscription(subscribed={:?})", self.is_subscribed())
    }
}

impl fmt::Debug for SharedEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedEventBus(topics={:?})", self.0.lock().topics.len())
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        SharedEventBus,
        Subscription,
    };
    use ::anyhow::Result;
    use ::parking_lot::Mutex;
    use ::std::sync::Arc;

    #[derive(Clone, Debug, PartialEq)]
    struct Ping(u32);

    #[derive(Clone, Debug, PartialEq)]
    struct Pong;

    #[test]
    fn delivers_by_type() -> Result<()> {
        let bus: SharedEventBus = SharedEventBus::new();
        let seen: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_: Arc<Mutex<Vec<u32>>> = seen.clone();
        let _subscription: Subscription = bus.listen(move |ping: &Ping| seen_.lock().push(ping.0));

        crate::ensure_eq!(bus.publish(&Ping(1)), 1);
        crate::ensure_eq!(bus.publish(&Pong), 0);
        crate::ensure_eq!(bus.publish(&Ping(2)), 1);
        crate::ensure_eq!(*seen.lock(), vec![1, 2]);
        Ok(())
    }

    #[test]
    fn unsubscribes_exactly_once() -> Result<()> {
        let bus: SharedEventBus = SharedEventBus::new();
        let first: Subscription = bus.listen(|_: &Ping| ());
        let second: Subscription = bus.listen(|_: &Ping| ());
        crate::ensure_eq!(bus.num_subscribers::<Ping>(), 2);
        first.unsubscribe();
        crate::ensure_eq!(bus.num_subscribers::<Ping>(), 1);
        drop(second);
        crate::ensure_eq!(bus.num_subscribers::<Ping>(), 0);
        crate::ensure_eq!(bus.publish(&Ping(0)), 0);
        Ok(())
    }

    #[test]
    fn handlers_may_unsubscribe_while_published() -> Result<()> {
        let bus: SharedEventBus = SharedEventBus::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let hits: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));
        let slot_: Arc<Mutex<Option<Subscription>>> = slot.clone();
        let hits_: Arc<Mutex<usize>> = hits.clone();
        let subscription: Subscription = bus.listen(move |_: &Ping| {
            *hits_.lock() += 1;
            // Take the token out first so it is dropped without the slot locked.
            let subscription: Option<Subscription> = slot_.lock().take();
            drop(subscription);
        });
        *slot.lock() = Some(subscription);

        bus.publish(&Ping(1));
        bus.publish(&Ping(2));
        crate::ensure_eq!(*hits.lock(), 1);
        crate::ensure_eq!(bus.num_subscribers::<Ping>(), 0);
        Ok(())
    }

    #[test]
    fn subscriptions_outlive_the_bus() -> Result<()> {
        let bus: SharedEventBus = SharedEventBus::new();
        let subscription: Subscription = bus.listen(|_: &Pong| ());
        drop(bus);
        subscription.unsubscribe();
        Ok(())
    }
}
