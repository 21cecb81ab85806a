//! Derive macros for Tessera events.

use proc_macro::TokenStream;

mod event;

/// Derive `Event` and `NamedEvent` from static type-tag metadata.
///
/// ```rust,ignore
/// #[derive(Event)]
/// #[event(name = "order.placed", interfaces("Auditable"))]
/// struct OrderPlaced {
///     #[event(parent)]
///     base: OrderEvent,
///     #[event(propagation)]
///     stop: Propagation,
///     id: u64,
/// }
/// ```
///
/// - `name` defaults to the type identifier.
/// - `interfaces(..)` lists interface tags declared directly on the type.
/// - `#[event(parent)]` marks the embedded ancestor event.
/// - `#[event(propagation)]` marks the `Propagation` flag that makes the
///   event stoppable. Without it, stoppability is inherited from the parent.
#[proc_macro_derive(Event, attributes(event))]
pub fn derive_event(input: TokenStream) -> TokenStream {
    event::derive_event_impl(input)
}
