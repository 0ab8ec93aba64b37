//! In-page broadcast of bridge-driven events.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalSignal {
    AuthTokenUpdated,
    LogoutRequested,
    RefreshRequested,
}

impl LocalSignal {
    /// DOM event name used when the signal is re-dispatched on `window`.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::AuthTokenUpdated => "sv:auth-token-updated",
            Self::LogoutRequested => "sv:logout-requested",
            Self::RefreshRequested => "sv:refresh-requested",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Rc<dyn Fn(LocalSignal)>;

#[derive(Default)]
pub struct SignalBus {
    next_id: Cell<u64>,
    subscribers: RefCell<Vec<(SubscriptionId, Subscriber)>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: impl Fn(LocalSignal) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.subscribers.borrow_mut().push((id, Rc::new(subscriber)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    pub fn emit(&self, signal: LocalSignal) {
        // Snapshot so subscribers may (un)subscribe while being notified.
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, s)| s.clone())
            .collect();
        for subscriber in subscribers {
            subscriber(signal);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}
