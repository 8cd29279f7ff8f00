//! GTFS-Realtime JSON DTOs.
//!
//! These types follow the JSON rendering of the GTFS-Realtime protobuf
//! schema as served by the feed provider. Most fields are optional because
//! producers omit them rather than sending nulls. 64-bit integers may arrive
//! as decimal strings (protobuf JSON mapping), so numeric fields accept both.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use super::error::RealtimeError;

/// A complete realtime feed snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeFeed {
    pub header: FeedHeader,

    /// Feed entities in provider order.
    pub entity: Vec<FeedEntity>,
}

impl RealtimeFeed {
    /// Validate an untyped payload and convert it into a feed.
    ///
    /// The payload must be an object holding a `header` object and an
    /// `entity` array; anything else is a format error. Entities that do not
    /// parse are logged and left out of the feed.
    pub fn from_json(value: Value) -> Result<Self, RealtimeError> {
        let invalid = |message: &str| RealtimeError::Format {
            message: message.to_string(),
        };

        let Value::Object(mut object) = value else {
            return Err(invalid("feed is not a JSON object"));
        };
        let header = match object.remove("header") {
            Some(header @ Value::Object(_)) => header,
            _ => return Err(invalid("missing header object")),
        };
        let Some(Value::Array(entities)) = object.remove("entity") else {
            return Err(invalid("missing entity array"));
        };

        let header = serde_json::from_value(header).map_err(|e| RealtimeError::Format {
            message: format!("invalid header: {e}"),
        })?;

        let total = entities.len();
        let entity: Vec<FeedEntity> = entities
            .into_iter()
            .enumerate()
            .filter_map(|(index, raw)| match serde_json::from_value(raw) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    warn!(index, error = %e, "skipping malformed feed entity");
                    None
                }
            })
            .collect();
        if entity.len() < total {
            warn!(kept = entity.len(), total, "feed had malformed entities");
        }

        Ok(Self { header, entity })
    }

    /// Iterate over the trip updates carried by this feed, in feed order.
    pub fn trip_updates(&self) -> impl Iterator<Item = &TripUpdate> {
        self.entity.iter().filter_map(|e| e.trip_update.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedHeader {
    #[serde(default)]
    pub gtfs_realtime_version: String,

    /// POSIX seconds at which the provider generated the feed.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_update: Option<TripUpdate>,
}

/// Deviations for one scheduled trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripUpdate {
    pub trip: TripDescriptor,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_time_update: Option<Vec<StopTimeUpdate>>,
}

impl TripUpdate {
    pub fn stop_time_updates(&self) -> &[StopTimeUpdate] {
        self.stop_time_update.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripDescriptor {
    #[serde(default)]
    pub trip_id: String,

    #[serde(default)]
    pub route_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_relationship: Option<String>,
}

/// Realtime information about one stop of a trip.
///
/// `stop_id` and `stop_sequence` are independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopTimeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_u32")]
    pub stop_sequence: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_relationship: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival: Option<StopTimeEvent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure: Option<StopTimeEvent>,
}

impl StopTimeUpdate {
    /// Departure delay in seconds, if the update carries one.
    pub fn departure_delay(&self) -> Option<i64> {
        self.departure.as_ref().and_then(|d| d.delay)
    }

    /// Arrival delay in seconds, if the update carries one.
    pub fn arrival_delay(&self) -> Option<i64> {
        self.arrival.as_ref().and_then(|a| a.delay)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopTimeEvent {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_i64")]
    pub delay: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_i64")]
    pub time: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_i64")]
    pub uncertainty: Option<i64>,
}

/// A JSON integer that may also be encoded as a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    String(String),
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<NumberOrString> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid integer string: {s:?}"))),
    }
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_i64(deserializer)?
        .map(|n| u64::try_from(n).map_err(serde::de::Error::custom))
        .transpose()
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_i64(deserializer)?
        .map(|n| u32::try_from(n).map_err(serde::de::Error::custom))
        .transpose()
}
