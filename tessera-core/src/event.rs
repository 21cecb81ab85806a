//! # Event Model
//!
//! Events are plain values owned by the emitter. The framework only looks at
//! their *type tags*: the event's own name, the chain of ancestor events it
//! extends, and the interface tags it declares.
//!
//! # Type-Tag Graph
//!
//! Rust has no class inheritance, so "`B extends A`" is expressed by
//! composition: `B` embeds an `A` value and exposes it through
//! [`Event::parent`]. Interfaces are plain string tags. Listener resolution
//! walks this graph ([`Event::ancestors`], [`Event::interfaces`]) instead of
//! reflecting over types at dispatch time.
//!
//! ```rust,ignore
//! struct Placed { base: OrderEvent, stop: Propagation }
//!
//! impl Event for Placed {
//!     fn event_name(&self) -> &'static str { "order.placed" }
//!     fn declared_interfaces(&self) -> &'static [&'static str] { &["Auditable"] }
//!     fn parent(&self) -> Option<&dyn Event> { Some(&self.base) }
//!     fn parent_mut(&mut self) -> Option<&mut dyn Event> { Some(&mut self.base) }
//!     fn propagation(&self) -> Option<&Propagation> { Some(&self.stop) }
//!     fn propagation_mut(&mut self) -> Option<&mut Propagation> { Some(&mut self.stop) }
//! }
//! ```

use std::any::Any;

/// The stop flag carried by stoppable events.
///
/// Once stopped, no further listener is invoked within the current dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Propagation {
    stopped: bool,
}

impl Propagation {
    /// A fresh, running flag.
    pub const fn new() -> Self {
        Self { stopped: false }
    }

    /// Halt propagation.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Whether propagation was halted.
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// Access to the concrete value behind a `dyn Event`.
///
/// Implemented for every `'static` type; event authors never implement it.
pub trait AsAny: Any {
    /// View as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
    /// View as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A value that can be dispatched through an event manager.
///
/// Only [`Event::event_name`] is required. The remaining methods describe
/// the event's position in the type-tag graph and whether it is stoppable.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not an `Event`",
    label = "missing `Event` implementation",
    note = "Implement `Event` by hand or use `#[derive(Event)]`."
)]
pub trait Event: AsAny + Send + Sync + 'static {
    /// Runtime type identity (the exact-type tag).
    fn event_name(&self) -> &'static str;

    /// Interface tags declared directly on this event type.
    fn declared_interfaces(&self) -> &'static [&'static str] {
        &[]
    }

    /// The embedded ancestor event, if this event extends another.
    fn parent(&self) -> Option<&dyn Event> {
        None
    }

    /// Mutable access to the embedded ancestor event.
    fn parent_mut(&mut self) -> Option<&mut dyn Event> {
        None
    }

    /// The stop flag, if this event is stoppable.
    ///
    /// Defaults to the parent's flag so that extending a stoppable event
    /// yields a stoppable event.
    fn propagation(&self) -> Option<&Propagation> {
        self.parent().and_then(|parent| parent.propagation())
    }

    /// Mutable access to the stop flag.
    fn propagation_mut(&mut self) -> Option<&mut Propagation> {
        self.parent_mut().and_then(|parent| parent.propagation_mut())
    }

    /// Whether listeners may halt propagation of this event.
    fn is_stoppable(&self) -> bool {
        self.propagation().is_some()
    }

    /// Whether a listener already halted propagation.
    fn is_propagation_stopped(&self) -> bool {
        self.propagation().is_some_and(Propagation::is_stopped)
    }

    /// Halt propagation. Returns `false` for events that are not stoppable.
    fn stop_propagation(&mut self) -> bool {
        match self.propagation_mut() {
            Some(flag) => {
                flag.stop();
                true
            }
            None => false,
        }
    }

    /// Ancestor tags, nearest first.
    fn ancestors(&self) -> Vec<&'static str> {
        let mut tags = Vec::new();
        let mut current = self.parent();
        while let Some(ancestor) = current {
            tags.push(ancestor.event_name());
            current = ancestor.parent();
        }
        tags
    }

    /// Every interface tag this event implements, its own declarations
    /// first, then those inherited from ancestors. Duplicates are dropped.
    fn interfaces(&self) -> Vec<&'static str> {
        let mut tags: Vec<&'static str> = Vec::new();
        let mut push_all = |declared: &'static [&'static str]| {
            for tag in declared {
                if !tags.contains(tag) {
                    tags.push(tag);
                }
            }
        };
        push_all(self.declared_interfaces());
        let mut current = self.parent();
        while let Some(ancestor) = current {
            push_all(ancestor.declared_interfaces());
            current = ancestor.parent();
        }
        tags
    }

    /// The value registered under `tag` in this event's ancestry: the event
    /// itself when `tag` is its own name, otherwise the matching ancestor.
    fn upcast(&self, tag: &str) -> Option<&dyn Any> {
        if self.event_name() == tag {
            return Some(self.as_any());
        }
        self.parent().and_then(|parent| parent.upcast(tag))
    }

    /// Mutable counterpart of [`Event::upcast`].
    fn upcast_mut(&mut self, tag: &str) -> Option<&mut dyn Any> {
        if self.event_name() == tag {
            return Some(self.as_any_mut());
        }
        self.parent_mut().and_then(|parent| parent.upcast_mut(tag))
    }
}

/// An event type with a compile-time name, usable for typed registration.
pub trait NamedEvent: Event + Sized {
    /// The exact-type tag. Must equal [`Event::event_name`].
    const NAME: &'static str;
}

impl dyn Event {
    /// Whether the concrete type behind this event is `T`.
    pub fn is<T: Event>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Downcast to the concrete type.
    pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Downcast to the concrete type, mutably.
    pub fn downcast_mut<T: Event>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// View this event as `T`, which may be the event itself or one of its
    /// ancestors.
    pub fn view<T: NamedEvent>(&self) -> Option<&T> {
        self.upcast(T::NAME)?.downcast_ref::<T>()
    }

    /// Mutable counterpart of [`view`](Self::view).
    pub fn view_mut<T: NamedEvent>(&mut self) -> Option<&mut T> {
        self.upcast_mut(T::NAME)?.downcast_mut::<T>()
    }
}

impl std::fmt::Debug for dyn Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.event_name())
            .field("stopped", &self.is_propagation_stopped())
            .finish()
    }
}
