//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Events are immutable facts named in past tense. Replaying an
/// aggregate's events reconstructs its current state.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name used for storage and filtering.
    fn event_type(&self) -> &'static str;
}

/// Trait for event-sourced aggregates.
///
/// Aggregates generate events from commands and apply events to update
/// state. `apply` must be pure and infallible: events are facts that have
/// already happened.
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The error type its commands can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's identifier, or None before creation.
    fn id(&self) -> Option<AggregateId>;

    /// Returns the current stream version.
    fn version(&self) -> Version;

    /// Sets the stream version. Called by the command handler after load.
    fn set_version(&mut self, version: Version);

    /// Applies an event, updating state. Pure, deterministic, no side
    /// effects.
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}
