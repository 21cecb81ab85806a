//! Listener registry keyed by event tag and priority.
//!
//! Buckets are `(tag, priority)`; within a bucket insertion order is kept.
//! Resolution for a concrete event concatenates three tiers, each sorted by
//! priority (highest first) and never interleaved:
//!
//! 1. the event's exact tag,
//! 2. each ancestor tag, nearest first,
//! 3. each interface tag.

use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashMap},
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tessera_core::{Event, ListenerProvider, ListenerRef};

type Buckets = BTreeMap<Reverse<i32>, Vec<ListenerRef>>;

/// Mutable store of listener registrations.
///
/// Registration goes through `&self` so a registry can be shared behind an
/// `Arc` for the lifetime of the process. The lock is only held while
/// copying or editing entries, never while a listener runs.
#[derive(Default)]
pub struct ListenerRegistry {
    tags: RwLock<HashMap<String, Buckets>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Buckets>> {
        self.tags.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Buckets>> {
        self.tags.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `listener` to the `(event_type, priority)` bucket.
    ///
    /// No deduplication: a listener added twice runs twice.
    pub fn add_listener(&self, event_type: &str, listener: ListenerRef, priority: i32) {
        self.write()
            .entry(event_type.to_string())
            .or_default()
            .entry(Reverse(priority))
            .or_default()
            .push(listener);
    }

    /// Remove the first occurrence of `listener` registered for exactly
    /// `event_type`, scanning buckets from highest to lowest priority.
    ///
    /// Returns `false` when nothing matched. Call repeatedly to remove
    /// duplicate registrations.
    pub fn remove_listener(&self, event_type: &str, listener: &ListenerRef) -> bool {
        let mut tags = self.write();
        let Some(buckets) = tags.get_mut(event_type) else {
            return false;
        };

        let mut hit = None;
        for (priority, bucket) in buckets.iter_mut() {
            if let Some(position) = bucket.iter().position(|entry| entry == listener) {
                bucket.remove(position);
                hit = Some((*priority, bucket.is_empty()));
                break;
            }
        }

        let Some((priority, emptied)) = hit else {
            return false;
        };
        if emptied {
            buckets.remove(&priority);
        }
        if buckets.is_empty() {
            tags.remove(event_type);
        }
        true
    }

    /// Whether any listener is registered for exactly `event_type`.
    ///
    /// Ancestors and interfaces are not consulted.
    pub fn has_listeners(&self, event_type: &str) -> bool {
        self.read()
            .get(event_type)
            .is_some_and(|buckets| buckets.values().any(|bucket| !bucket.is_empty()))
    }

    /// Listeners registered for exactly `event_type`, in invocation order.
    pub fn listeners_for(&self, event_type: &str) -> Vec<ListenerRef> {
        let tags = self.read();
        let mut out = Vec::new();
        extend_tier(&tags, event_type, &mut out);
        out
    }

    /// Number of registrations for exactly `event_type`.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.read()
            .get(event_type)
            .map_or(0, |buckets| buckets.values().map(Vec::len).sum())
    }

    /// Tags with at least one registration, sorted.
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Drop every registration for `event_type`.
    pub fn clear(&self, event_type: &str) {
        self.write().remove(event_type);
    }
}

fn extend_tier(tags: &HashMap<String, Buckets>, tag: &str, out: &mut Vec<ListenerRef>) {
    if let Some(buckets) = tags.get(tag) {
        for bucket in buckets.values() {
            out.extend(bucket.iter().cloned());
        }
    }
}

impl ListenerProvider for ListenerRegistry {
    fn listeners_for_event(&self, event: &dyn Event) -> Vec<ListenerRef> {
        let tags = self.read();
        let mut resolved = Vec::new();

        extend_tier(&tags, event.event_name(), &mut resolved);
        for ancestor in event.ancestors() {
            extend_tier(&tags, ancestor, &mut resolved);
        }
        for interface in event.interfaces() {
            extend_tier(&tags, interface, &mut resolved);
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(label: &str) -> ListenerRef {
        ListenerRef::erased(|_| Ok(())).with_label(label)
    }

    fn labels(listeners: &[ListenerRef]) -> Vec<&str> {
        listeners.iter().map(ListenerRef::label).collect()
    }

    struct Base;

    impl Event for Base {
        fn event_name(&self) -> &'static str {
            "A"
        }
        fn declared_interfaces(&self) -> &'static [&'static str] {
            &["I"]
        }
    }

    struct Derived {
        base: Base,
    }

    impl Event for Derived {
        fn event_name(&self) -> &'static str {
            "B"
        }
        fn parent(&self) -> Option<&dyn Event> {
            Some(&self.base)
        }
        fn parent_mut(&mut self) -> Option<&mut dyn Event> {
            Some(&mut self.base)
        }
    }

    #[test]
    fn priority_descending_and_stable() {
        let registry = ListenerRegistry::new();
        registry.add_listener("order", noop("first-5"), 5);
        registry.add_listener("order", noop("minus-1"), -1);
        registry.add_listener("order", noop("second-5"), 5);
        registry.add_listener("order", noop("zero"), 0);

        assert_eq!(
            labels(&registry.listeners_for("order")),
            vec!["first-5", "second-5", "zero", "minus-1"]
        );
    }

    #[test]
    fn tiers_are_exact_then_ancestors_then_interfaces() {
        let registry = ListenerRegistry::new();
        registry.add_listener("I", noop("iface"), 100);
        registry.add_listener("A", noop("ancestor"), 50);
        registry.add_listener("B", noop("exact-low"), -10);
        registry.add_listener("B", noop("exact-high"), 10);

        let event = Derived { base: Base };
        let resolved = registry.listeners_for_event(&event);
        assert_eq!(
            labels(&resolved),
            vec!["exact-high", "exact-low", "ancestor", "iface"]
        );
    }

    #[test]
    fn no_listeners_resolves_to_empty() {
        let registry = ListenerRegistry::new();
        assert!(registry.listeners_for_event(&Base).is_empty());
    }

    #[test]
    fn removal_takes_one_occurrence_per_call() {
        let registry = ListenerRegistry::new();
        let listener = noop("dup");
        registry.add_listener("order", listener.clone(), 0);
        registry.add_listener("order", listener.clone(), 0);

        assert!(registry.remove_listener("order", &listener));
        assert_eq!(registry.listener_count("order"), 1);
        assert!(registry.remove_listener("order", &listener));
        assert!(!registry.has_listeners("order"));
        assert!(!registry.remove_listener("order", &listener));
    }

    #[test]
    fn removal_scans_highest_priority_first() {
        let registry = ListenerRegistry::new();
        let listener = noop("multi");
        registry.add_listener("order", listener.clone(), -5);
        registry.add_listener("order", listener.clone(), 20);
        registry.add_listener("order", noop("other"), 20);

        registry.remove_listener("order", &listener);
        assert_eq!(labels(&registry.listeners_for("order")), vec!["other", "multi"]);
    }

    #[test]
    fn removal_of_unknown_listener_is_noop() {
        let registry = ListenerRegistry::new();
        registry.add_listener("order", noop("kept"), 0);
        assert!(!registry.remove_listener("order", &noop("stranger")));
        assert!(!registry.remove_listener("missing", &noop("stranger")));
        assert_eq!(registry.listener_count("order"), 1);
    }

    #[test]
    fn has_listeners_checks_exact_tag_only() {
        let registry = ListenerRegistry::new();
        registry.add_listener("A", noop("ancestor"), 0);
        assert!(registry.has_listeners("A"));
        assert!(!registry.has_listeners("B"));
        assert_eq!(registry.event_types(), vec!["A".to_string()]);

        registry.clear("A");
        assert!(!registry.has_listeners("A"));
    }
}
