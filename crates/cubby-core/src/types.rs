use crate::{
    Result,
    constants::{MAX_CARD_ID_LENGTH, MIN_CARD_ID_LENGTH},
    error::Error,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Logical operation names the kiosk client can request.
///
/// The set is closed and known at startup; every variant resolves to
/// exactly one policy in the relay gateway's policy table. Callers that
/// receive operation names as strings go through [`Operation::from_name`],
/// which returns `None` for anything outside this set so that unknown
/// names are rejected locally and never dispatched.
///
/// # Examples
///
/// ```
/// use cubby_core::Operation;
///
/// assert_eq!(Operation::from_name("read-card"), Some(Operation::ReadCard));
/// assert_eq!(Operation::ReadCard.name(), "read-card");
/// assert_eq!(Operation::from_name("format-disk"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Backend system status summary.
    Status,
    /// Available wash-type catalog.
    WashTypes,
    /// Consume the most recent card tap from the backend's event queue.
    ReadCard,
    /// Acknowledge a consumed card tap by clearing the event queue.
    ClearEventQueue,
    /// Assign a card to a locker and actuate the door for drop-off.
    DropOff,
    /// Complete a transaction and actuate the door for pick-up.
    PickUp,
    /// Backend liveness/health report.
    Health,
    /// Reinitialise the RFID reader hardware.
    ResetReader,
    /// Device identification metadata.
    DeviceInfo,
}

impl Operation {
    /// All operations, in policy-table order.
    pub const ALL: [Operation; 9] = [
        Operation::Status,
        Operation::WashTypes,
        Operation::ReadCard,
        Operation::ClearEventQueue,
        Operation::DropOff,
        Operation::PickUp,
        Operation::Health,
        Operation::ResetReader,
        Operation::DeviceInfo,
    ];

    /// Resolve a kebab-case wire name to an operation.
    ///
    /// Returns `None` for unknown names; the caller is expected to turn
    /// that into a local `unknown-operation` rejection without contacting
    /// the backend.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "status" => Some(Operation::Status),
            "wash-types" => Some(Operation::WashTypes),
            "read-card" => Some(Operation::ReadCard),
            "clear-event-queue" => Some(Operation::ClearEventQueue),
            "drop-off" => Some(Operation::DropOff),
            "pick-up" => Some(Operation::PickUp),
            "health" => Some(Operation::Health),
            "reset-reader" => Some(Operation::ResetReader),
            "device-info" => Some(Operation::DeviceInfo),
            _ => None,
        }
    }

    /// The kebab-case wire name of this operation.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Status => "status",
            Operation::WashTypes => "wash-types",
            Operation::ReadCard => "read-card",
            Operation::ClearEventQueue => "clear-event-queue",
            Operation::DropOff => "drop-off",
            Operation::PickUp => "pick-up",
            Operation::Health => "health",
            Operation::ResetReader => "reset-reader",
            Operation::DeviceInfo => "device-info",
        }
    }

    /// Returns `true` for operations that physically actuate hardware.
    ///
    /// Actuating operations must never be attempted in parallel; the
    /// relay gateway's strictly sequential retry loop exists for them.
    #[must_use]
    pub fn is_actuating(&self) -> bool {
        matches!(
            self,
            Operation::DropOff | Operation::PickUp | Operation::ResetReader
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Operation::from_name(s).ok_or_else(|| Error::InvalidOperation(s.to_string()))
    }
}

/// Correlation id attached to each relay invocation.
///
/// Generated per request, logged with every dispatch attempt, and echoed
/// into augmented status/health payloads so a kiosk-side trace can be
/// matched against backend logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(uuid::Uuid);

impl CorrelationId {
    /// Generate a fresh correlation id.
    #[must_use]
    pub fn new() -> Self {
        CorrelationId(uuid::Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Card identifier as reported by the backend's reader.
///
/// The id is normalized (trimmed) and validated before use. Cubby treats
/// the id as an opaque handle: it is consumed from the event queue and
/// handed straight back to the backend in drop-off/pick-up payloads,
/// never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardId(String);

impl CardId {
    /// Create a new card id with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardId` if the trimmed id is empty, longer
    /// than [`MAX_CARD_ID_LENGTH`](crate::constants::MAX_CARD_ID_LENGTH)
    /// characters, or contains non-ASCII characters.
    pub fn new(id: &str) -> Result<Self> {
        let id = id.trim();

        let len = id.len();
        if !(MIN_CARD_ID_LENGTH..=MAX_CARD_ID_LENGTH).contains(&len) {
            return Err(Error::InvalidCardId(format!(
                "Card id must be {MIN_CARD_ID_LENGTH}-{MAX_CARD_ID_LENGTH} chars, got {len}"
            )));
        }

        if !id.is_ascii() {
            return Err(Error::InvalidCardId("Card id must be ASCII".to_string()));
        }

        Ok(CardId(id.to_string()))
    }

    /// Get the card id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CardId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CardId::new(s)
    }
}

/// A card tap reported by the backend's event queue.
///
/// Events are ephemeral: the backend owns the queue, the kiosk consumes
/// one event, acknowledges it, and forgets it. Nothing here is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardEvent {
    /// The identifier read from the card.
    pub card_id: CardId,

    /// When the backend observed the tap, if it reported a parseable
    /// timestamp.
    pub observed_at: Option<DateTime<Utc>>,
}

impl CardEvent {
    /// Parse a card event from the backend's `card` object.
    ///
    /// The backend reports `card_id` as a string, but older firmware
    /// emits the raw numeric serial; both are accepted. The timestamp is
    /// an ISO-8601 string that may or may not carry an offset. Returns
    /// `None` when no usable card id is present.
    pub fn from_backend_value(value: &Value) -> Option<Self> {
        let raw_id = match value.get("card_id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return None,
        };
        let card_id = CardId::new(&raw_id).ok()?;

        let observed_at = value
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_backend_timestamp);

        Some(CardEvent {
            card_id,
            observed_at,
        })
    }
}

/// Parse the backend's ISO-8601 timestamps.
///
/// The backend emits naive local timestamps (`2026-08-06T12:34:56.789`);
/// offsets are accepted when present, naive values are taken as UTC.
fn parse_backend_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("status", Operation::Status)]
    #[case("wash-types", Operation::WashTypes)]
    #[case("read-card", Operation::ReadCard)]
    #[case("clear-event-queue", Operation::ClearEventQueue)]
    #[case("drop-off", Operation::DropOff)]
    #[case("pick-up", Operation::PickUp)]
    #[case("health", Operation::Health)]
    #[case("reset-reader", Operation::ResetReader)]
    #[case("device-info", Operation::DeviceInfo)]
    fn test_operation_round_trip(#[case] name: &str, #[case] op: Operation) {
        assert_eq!(Operation::from_name(name), Some(op));
        assert_eq!(op.name(), name);
    }

    #[rstest]
    #[case("unlock-everything")]
    #[case("")]
    #[case("READ-CARD")] // wire names are lowercase only
    fn test_operation_unknown(#[case] name: &str) {
        assert_eq!(Operation::from_name(name), None);
        assert!(name.parse::<Operation>().is_err());
    }

    #[test]
    fn test_every_operation_has_unique_name() {
        let mut names: Vec<&str> = Operation::ALL.iter().map(|op| op.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Operation::ALL.len());
    }

    #[test]
    fn test_actuating_operations() {
        assert!(Operation::DropOff.is_actuating());
        assert!(Operation::PickUp.is_actuating());
        assert!(Operation::ResetReader.is_actuating());
        assert!(!Operation::ReadCard.is_actuating());
        assert!(!Operation::Status.is_actuating());
    }

    #[rstest]
    #[case("16909060", "16909060")]
    #[case("  16909060  ", "16909060")]
    #[case("04ABCDEF", "04ABCDEF")]
    fn test_card_id_valid(#[case] input: &str, #[case] expected: &str) {
        let card = CardId::new(input).unwrap();
        assert_eq!(card.as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("crème-brûlée")]
    fn test_card_id_invalid(#[case] input: &str) {
        assert!(CardId::new(input).is_err());
    }

    #[test]
    fn test_card_id_too_long() {
        let long = "9".repeat(65);
        assert!(CardId::new(&long).is_err());
    }

    #[test]
    fn test_card_event_from_string_id() {
        let value = json!({
            "card_id": "16909060",
            "timestamp": "2026-08-06T10:15:30.250",
            "read_count": 2
        });
        let event = CardEvent::from_backend_value(&value).unwrap();
        assert_eq!(event.card_id.as_str(), "16909060");
        assert!(event.observed_at.is_some());
    }

    #[test]
    fn test_card_event_from_numeric_id() {
        let value = json!({ "card_id": 16909060u64 });
        let event = CardEvent::from_backend_value(&value).unwrap();
        assert_eq!(event.card_id.as_str(), "16909060");
        assert_eq!(event.observed_at, None);
    }

    #[test]
    fn test_card_event_missing_id() {
        let value = json!({ "timestamp": "2026-08-06T10:15:30" });
        assert!(CardEvent::from_backend_value(&value).is_none());
    }

    #[test]
    fn test_card_event_rfc3339_timestamp() {
        let value = json!({
            "card_id": "1",
            "timestamp": "2026-08-06T10:15:30+02:00"
        });
        let event = CardEvent::from_backend_value(&value).unwrap();
        let observed = event.observed_at.unwrap();
        assert_eq!(observed.to_rfc3339(), "2026-08-06T08:15:30+00:00");
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }
}
