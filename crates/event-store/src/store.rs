use async_trait::async_trait;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Version};

/// Concurrency expectation for an append.
///
/// Every mutation of an order or payment appends with `Exact(version read
/// at load time)`; a concurrent writer makes the append fail with
/// [`EventStoreError::ConcurrencyConflict`] instead of silently clobbering
/// the other write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpectedVersion {
    /// No version check. Use only for test fixtures.
    #[default]
    Any,

    /// The stream must not exist yet (new aggregate).
    NoStream,

    /// The stream must be at exactly this version.
    Exact(Version),
}

impl ExpectedVersion {
    /// Checks the expectation against the stream's current version.
    pub fn check(&self, aggregate_id: AggregateId, actual: Version) -> Result<()> {
        let expected = match self {
            ExpectedVersion::Any => return Ok(()),
            ExpectedVersion::NoStream => Version::initial(),
            ExpectedVersion::Exact(v) => *v,
        };

        if actual == expected {
            Ok(())
        } else {
            Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            })
        }
    }
}

/// Core trait for event ledger implementations.
///
/// Implementations must be thread-safe; appends of a batch are atomic —
/// either every event commits or none do.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to an aggregate's stream.
    ///
    /// Returns the stream version after the append.
    async fn append(&self, events: Vec<EventEnvelope>, expected: ExpectedVersion)
    -> Result<Version>;

    /// Returns all events for an aggregate in version order.
    async fn events_for_aggregate(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>>;

    /// Returns all events of a given type across aggregates, oldest first.
    ///
    /// Used by the reservation-expiry sweep to scan for open checkouts.
    async fn events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>>;

    /// Returns the current version of an aggregate's stream, or None if the
    /// stream does not exist.
    async fn aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;
}

/// Validates a batch before it is appended.
///
/// The batch must be non-empty, single-aggregate, and carry sequential
/// versions.
pub fn validate_for_append(events: &[EventEnvelope]) -> Result<()> {
    let first = events
        .first()
        .ok_or_else(|| EventStoreError::InvalidAppend("empty event batch".to_string()))?;

    let mut expected_version = first.version;
    for event in events.iter().skip(1) {
        if event.aggregate_id != first.aggregate_id {
            return Err(EventStoreError::InvalidAppend(
                "all events in a batch must target the same aggregate".to_string(),
            ));
        }
        if event.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::InvalidAppend(
                "all events in a batch must share the aggregate type".to_string(),
            ));
        }
        expected_version = expected_version.next();
        if event.version != expected_version {
            return Err(EventStoreError::InvalidAppend(format!(
                "event versions must be sequential: expected {}, got {}",
                expected_version, event.version
            )));
        }
    }

    Ok(())
}
