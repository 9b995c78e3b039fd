//! The synchronized item ("thing").

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest accepted name, counted in characters before escaping.
pub const MAX_NAME_LENGTH: usize = 256;

/// An item as stored and broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Caller-supplied partial item carried by inbound `create`/`update`/`delete`.
///
/// `create` reads only `name`; `delete` reads only `id`; `update` needs both.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCandidate {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ItemCandidate {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    pub fn with_id(id: i64) -> Self {
        Self {
            id: Some(id),
            name: None,
        }
    }

    pub fn rename(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: Some(name.into()),
        }
    }
}

/// Why a name was rejected.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("names cannot be blank")]
    Blank,
    #[error("names cannot be longer than {max} characters")]
    TooLong { max: usize },
}

/// Validate a raw name and return its HTML-escaped storage form.
pub fn sanitize_name(raw: &str) -> Result<String, NameError> {
    if raw.is_empty() {
        return Err(NameError::Blank);
    }
    if raw.chars().count() > MAX_NAME_LENGTH {
        return Err(NameError::TooLong {
            max: MAX_NAME_LENGTH,
        });
    }
    Ok(escape_html(raw))
}

/// Escape the five markup-significant characters.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&#34;"),
            other => out.push(other),
        }
    }
    out
}
