//! Cursor-based pagination for store listings.
//!
//! Keyset pagination keeps performance constant regardless of page depth
//! and stays stable while records are created or deleted underneath it.

use base64::prelude::*;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of items per page.
pub const MAX_LIMIT: i64 = 100;

/// A position in a paginated result set.
///
/// Encodes the last seen record's creation timestamp and id; the id breaks
/// ties between records created in the same instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Cursor {
    /// Creation timestamp of the last seen record.
    pub timestamp: Timestamp,
    /// Id of the last seen record (tiebreaker).
    pub id: Uuid,
}

impl Cursor {
    /// Creates a cursor from a timestamp and id.
    pub fn new(timestamp: Timestamp, id: Uuid) -> Self {
        Self { timestamp, id }
    }

    /// Encodes the cursor as a URL-safe base64 string.
    pub fn encode(&self) -> String {
        let data = format!("{}|{}", self.timestamp, self.id);
        BASE64_URL_SAFE_NO_PAD.encode(data.as_bytes())
    }

    /// Decodes a cursor from a URL-safe base64 string.
    ///
    /// Returns `None` if the string is malformed.
    pub fn decode(encoded: &str) -> Option<Self> {
        let bytes = BASE64_URL_SAFE_NO_PAD.decode(encoded).ok()?;
        let data = String::from_utf8(bytes).ok()?;
        let (timestamp, id) = data.split_once('|')?;

        Some(Self {
            timestamp: timestamp.parse().ok()?,
            id: id.parse().ok()?,
        })
    }

    /// Returns whether `timestamp`/`id` sorts strictly after this cursor in
    /// newest-first order.
    pub fn admits(&self, timestamp: Timestamp, id: Uuid) -> bool {
        (timestamp, id) < (self.timestamp, self.id)
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl From<Cursor> for String {
    fn from(cursor: Cursor) -> Self {
        cursor.encode()
    }
}

impl TryFrom<String> for Cursor {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Cursor::decode(&value).ok_or("invalid cursor format")
    }
}

/// Cursor pagination parameters for store listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CursorPagination {
    /// Maximum number of records to return.
    pub limit: i64,
    /// Cursor pointing at the last item of the previous page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Cursor>,
}

impl CursorPagination {
    /// Creates pagination with the given limit, clamped to [`MAX_LIMIT`].
    pub fn new(limit: i64) -> Self {
        Self {
            limit: limit.clamp(1, MAX_LIMIT),
            after: None,
        }
    }

    /// Creates pagination resuming after the given cursor.
    pub fn after(limit: i64, cursor: Cursor) -> Self {
        Self {
            after: Some(cursor),
            ..Self::new(limit)
        }
    }

    /// Creates pagination from an optional encoded cursor string.
    ///
    /// An invalid cursor restarts from the beginning.
    pub fn from_cursor_string(limit: i64, cursor: Option<&str>) -> Self {
        Self {
            after: cursor.and_then(Cursor::decode),
            ..Self::new(limit)
        }
    }

    /// Limit plus one; fetching an extra row detects whether more pages
    /// exist without a count query.
    pub fn fetch_limit(&self) -> i64 {
        self.limit + 1
    }
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorPage<T> {
    /// The items on this page, newest first.
    pub items: Vec<T>,
    /// Cursor for the next page; present only when more items exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl<T> CursorPage<T> {
    /// Builds a page from rows fetched with [`CursorPagination::fetch_limit`].
    ///
    /// `cursor_fn` extracts `(created_at, id)` from a row.
    pub fn from_rows<F>(mut items: Vec<T>, limit: i64, cursor_fn: F) -> Self
    where
        F: Fn(&T) -> (Timestamp, Uuid),
    {
        let has_more = items.len() as i64 > limit;
        if has_more {
            items.pop();
        }

        let next_cursor = has_more
            .then(|| {
                items.last().map(|item| {
                    let (timestamp, id) = cursor_fn(item);
                    Cursor::new(timestamp, id).encode()
                })
            })
            .flatten();

        Self { items, next_cursor }
    }

    /// Creates an empty page.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }

    /// Returns whether more items remain beyond this page.
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }

    /// Maps the items to a different type.
    pub fn map<U, F>(self, f: F) -> CursorPage<U>
    where
        F: FnMut(T) -> U,
    {
        CursorPage {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}
