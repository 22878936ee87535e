//! Connection-scoped event bus for statement lifecycle observation

use std::ops::BitOr;
use std::rc::Rc;
use std::time::Duration;

/// Bitmask of observable statement lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event(u32);

impl Event {
    pub const SELECT: Event = Event(1);
    pub const INSERT: Event = Event(2);
    pub const UPDATE: Event = Event(4);
    pub const DELETE: Event = Event(8);
    /// Fires alongside any successful statement execution
    pub const QUERY: Event = Event(16);
    pub const EXCEPTION: Event = Event(32);
    pub const ALL: Event = Event(63);

    pub fn contains(&self, other: Event) -> bool {
        self.0 & other.0 != 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl BitOr for Event {
    type Output = Event;

    fn bitor(self, rhs: Event) -> Event {
        Event(self.0 | rhs.0)
    }
}

/// Context passed to observers when an event fires
#[derive(Debug, Clone, Copy, Default)]
pub struct EventSubject<'a> {
    /// SQL text of the statement, when one was rendered
    pub sql: Option<&'a str>,
    /// Wall-clock execution time, when the statement ran
    pub elapsed: Option<Duration>,
}

/// Receiver for statement lifecycle notifications
pub trait Observer {
    fn notify(&self, subject: &EventSubject<'_>, event: Event);
}

/// Handle returned by `attach`, used to detach later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

/// Insertion-ordered observer registry
#[derive(Default)]
pub struct EventBus {
    entries: Vec<(ObserverToken, Event, Rc<dyn Observer>)>,
    next: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, observer: Rc<dyn Observer>, interest: Event) -> ObserverToken {
        let token = ObserverToken(self.next);
        self.next += 1;
        self.entries.push((token, interest, observer));
        token
    }

    /// Remove an observer. Unknown tokens are a no-op.
    pub fn detach(&mut self, token: ObserverToken) {
        self.entries.retain(|(t, _, _)| *t != token);
    }

    /// Notify, in attachment order, every observer whose interest mask
    /// overlaps the fired event
    pub fn notify(&self, subject: &EventSubject<'_>, event: Event) {
        for (_, interest, observer) in &self.entries {
            if interest.contains(event) {
                observer.notify(subject, event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.entries.len())
            .finish()
    }
}
