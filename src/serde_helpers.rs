use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serializer};

use crate::reschedule::{parse_date_time, DATE_TIME_FORMAT};

pub fn serialize_date_time<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&value.format(DATE_TIME_FORMAT))
}

pub fn serialize_opt_date_time<S>(
    value: &Option<NaiveDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(value) => serializer.collect_str(&value.format(DATE_TIME_FORMAT)),
        None => serializer.serialize_none(),
    }
}

/// Accepts `YYYY-MM-DDTHH:MM` as well as the full-seconds form.
pub fn deserialize_date_time<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date_time(&raw).map_err(serde::de::Error::custom)
}
