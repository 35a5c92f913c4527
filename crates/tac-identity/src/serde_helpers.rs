// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lenient timestamp parsing for option structs that arrive as data.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
	Millis(i64),
	Text(String),
}

/// Accepts an RFC 3339 string or integer Unix milliseconds.
pub fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
	D: Deserializer<'de>,
{
	match Option::<RawTimestamp>::deserialize(deserializer)? {
		None => Ok(None),
		Some(RawTimestamp::Millis(ms)) => Utc
			.timestamp_millis_opt(ms)
			.single()
			.map(Some)
			.ok_or_else(|| D::Error::custom(format!("timestamp {ms} is out of range"))),
		Some(RawTimestamp::Text(text)) => DateTime::parse_from_rfc3339(&text)
			.map(|dt| Some(dt.with_timezone(&Utc)))
			.map_err(|e| D::Error::custom(format!("malformed timestamp '{text}': {e}"))),
	}
}
