//! Wire shape of a persisted progress document.
//!
//! Decoding is lenient: a field whose JSON has an unexpected shape is dropped
//! (and logged) instead of failing the whole document, so the merge can
//! backfill it from the default template.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use learn_core::model::{ActivityId, ModuleId, Progress};
use learn_core::{PartialActivityProgress, PartialActivityResult, PartialProgress};

use crate::repository::StorageError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Persisted form of one activity result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub score: Option<u32>,
}

pub type ActivityRecordMap = BTreeMap<ModuleId, BTreeMap<ActivityId, ActivityRecord>>;

/// Persisted progress document, mirroring the in-memory snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub points: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_activities"
    )]
    pub activity_progress: Option<ActivityRecordMap>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub module_progress: Option<BTreeMap<ModuleId, u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub current_streak: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub best_streak: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub last_activity_date: Option<String>,
}

impl ProgressRecord {
    /// Full record for a snapshot; every field is present.
    #[must_use]
    pub fn from_progress(progress: &Progress) -> Self {
        let activity_progress = progress
            .activity_progress
            .iter()
            .map(|(module, activities)| {
                let activities = activities
                    .iter()
                    .map(|(activity, result)| {
                        (
                            activity.clone(),
                            ActivityRecord {
                                completed: Some(result.is_completed()),
                                score: Some(u32::from(result.score())),
                            },
                        )
                    })
                    .collect();
                (module.clone(), activities)
            })
            .collect();
        let module_progress = progress
            .module_progress
            .iter()
            .map(|(module, pct)| (module.clone(), u32::from(*pct)))
            .collect();

        Self {
            points: Some(progress.points),
            activity_progress: Some(activity_progress),
            module_progress: Some(module_progress),
            current_streak: Some(progress.current_streak),
            best_streak: Some(progress.best_streak),
            last_activity_date: progress
                .last_activity_date
                .map(|date| date.format(DATE_FORMAT).to_string()),
        }
    }

    /// Convert into the typed partial shape consumed by the merge.
    ///
    /// Unparseable dates and out-of-range scores become absent.
    #[must_use]
    pub fn into_partial(self) -> PartialProgress {
        let activity_progress = self.activity_progress.map(|modules| {
            modules
                .into_iter()
                .map(|(module, activities)| {
                    let activities = activities
                        .into_iter()
                        .map(|(activity, record)| {
                            let partial = PartialActivityResult {
                                completed: record.completed,
                                score: record
                                    .score
                                    .and_then(|s| u8::try_from(s).ok())
                                    .filter(|s| *s <= 100),
                            };
                            (activity, partial)
                        })
                        .collect();
                    (module, activities)
                })
                .collect::<PartialActivityProgress>()
        });

        PartialProgress {
            points: self.points,
            activity_progress,
            current_streak: self.current_streak,
            best_streak: self.best_streak,
            last_activity_date: self.last_activity_date.as_deref().and_then(parse_date),
        }
    }

    /// Decode a stored JSON document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the document is not a JSON object.
    pub fn from_json(raw: &str) -> Result<Self, StorageError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|err| StorageError::Serialization(err.to_string()))?;
        Self::from_value(value)
    }

    /// Decode an already-parsed JSON document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the value is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self, StorageError> {
        // serde would otherwise fill the fields positionally from an array
        if !value.is_object() {
            return Err(StorageError::Serialization(format!(
                "expected a JSON object, found {}",
                json_kind(&value)
            )));
        }
        serde_json::from_value(value).map_err(|err| StorageError::Serialization(err.to_string()))
    }

    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|err| StorageError::Serialization(err.to_string()))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp (reduced to its UTC date).
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        return Some(date);
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc).date_naive()),
        Err(err) => {
            warn!(value = raw, %err, "ignoring unparseable lastActivityDate");
            None
        }
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(decode_or_warn))
}

fn decode_or_warn<T: DeserializeOwned>(raw: Value) -> Option<T> {
    if raw.is_null() {
        return None;
    }
    match serde_json::from_value(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(%err, "dropping malformed progress field");
            None
        }
    }
}

fn lenient_activities<'de, D>(deserializer: D) -> Result<Option<ActivityRecordMap>, D::Error>
where
    D: Deserializer<'de>,
{
    let modules = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(modules)) => modules,
        Some(other) => {
            warn!(found = json_kind(&other), "dropping malformed activityProgress field");
            return Ok(None);
        }
    };

    let mut out = ActivityRecordMap::new();
    for (module, activities) in modules {
        let Value::Object(activities) = activities else {
            warn!(module = %module, "dropping malformed module entry");
            continue;
        };
        let slot = out.entry(ModuleId::new(module.as_str())).or_default();
        for (activity, raw) in activities {
            if let Some(record) = decode_or_warn::<ActivityRecord>(raw) {
                slot.insert(ActivityId::new(activity), record);
            }
        }
    }
    Ok(Some(out))
}
