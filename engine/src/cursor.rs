//! Opaque pagination tokens.
//!
//! A token is the URL-safe, unpadded base64 encoding of the cursor's JSON
//! form. The encoding is an implementation detail: callers must treat tokens
//! as opaque strings and only hand back what a previous page returned.
//!
//! Every decode failure (bad base64, bad JSON, or a cursor that fails
//! [`Cursor::validate`]) is reported as [`Error::InvalidCursorFormat`].

use crate::error::{Error, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A pagination cursor that can be carried in a page token.
pub trait Cursor: Serialize + DeserializeOwned {
    /// Reject semantically invalid cursors.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Encode a cursor into a page token.
pub fn encode_cursor<C: Cursor>(cursor: &C) -> Result<String> {
    let json = serde_json::to_vec(cursor).map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decode and validate a page token.
pub fn decode_cursor<C: Cursor>(token: &str) -> Result<C> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| Error::InvalidCursorFormat(format!("invalid base64: {e}")))?;
    let cursor: C = serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidCursorFormat(format!("invalid json: {e}")))?;
    cursor.validate().map_err(|e| match e {
        Error::InvalidCursorFormat(msg) => Error::InvalidCursorFormat(msg),
        other => Error::InvalidCursorFormat(other.to_string()),
    })?;
    Ok(cursor)
}

/// Decode an optional page token; an empty token means "first page".
pub fn decode_optional_cursor<C: Cursor>(token: Option<&str>) -> Result<Option<C>> {
    match token {
        Some(t) if !t.is_empty() => decode_cursor(t).map(Some),
        _ => Ok(None),
    }
}

/// Numeric offset into a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCursor {
    pub offset: i64,
}

impl Cursor for OffsetCursor {
    fn validate(&self) -> Result<()> {
        if self.offset < 0 {
            return Err(Error::InvalidCursorFormat(format!(
                "negative offset {}",
                self.offset
            )));
        }
        Ok(())
    }
}

/// Last seen (timestamp, id) pair for keyset pagination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampKeyCursor {
    pub last_timestamp: DateTime<Utc>,
    pub last_key: String,
}

impl Cursor for TimestampKeyCursor {
    fn validate(&self) -> Result<()> {
        if self.last_key.is_empty() {
            return Err(Error::InvalidCursorFormat("empty last_key".into()));
        }
        Ok(())
    }
}

/// Last seen release with the running feature count at its date.
///
/// The version breaks ties between releases sharing a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseCountCursor {
    pub last_release_date: DateTime<Utc>,
    pub last_browser_version: String,
    pub last_cumulative_count: i64,
}

impl Cursor for ReleaseCountCursor {
    fn validate(&self) -> Result<()> {
        if self.last_cumulative_count < 0 {
            return Err(Error::InvalidCursorFormat(format!(
                "negative cumulative count {}",
                self.last_cumulative_count
            )));
        }
        Ok(())
    }
}

/// Last seen release in (date, browser, version) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseKeyCursor {
    pub last_release_date: DateTime<Utc>,
    pub last_browser_name: String,
    pub last_browser_version: String,
}

impl Cursor for ReleaseKeyCursor {
    fn validate(&self) -> Result<()> {
        if self.last_browser_name.is_empty() || self.last_browser_version.is_empty() {
            return Err(Error::InvalidCursorFormat("empty release key".into()));
        }
        Ok(())
    }
}

/// Last seen release date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDateCursor {
    pub last_release_date: DateTime<Utc>,
}

impl Cursor for ReleaseDateCursor {}

/// Last seen calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCursor {
    pub last_day: NaiveDate,
}

impl Cursor for DayCursor {}
