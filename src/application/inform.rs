//! Change notifications posted by the database to `/inform`.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

use crate::cache::{KeySpace, SourceChange};

#[derive(Debug, Clone, Deserialize)]
pub struct InformPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub record: Option<RecordRef>,
    #[serde(default)]
    pub old_record: Option<RecordRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordRef {
    #[serde(default)]
    pub id: Option<RecordId>,
}

/// Row identifier as sent by the notifier; either form names the same key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InformError {
    #[error("unsupported change type `{0}`")]
    UnknownType(String),
    #[error("notification for table `{0}` is not handled here")]
    UnknownTable(String),
    #[error("`{field}.id` is required for `{kind}` notifications")]
    MissingId {
        kind: &'static str,
        field: &'static str,
    },
}

impl InformPayload {
    /// Resolve the payload against the key space it is expected to target.
    pub fn to_change(&self, keys: &KeySpace) -> Result<SourceChange, InformError> {
        if let Some(table) = self.table.as_deref()
            && !keys.matches_table(table)
        {
            return Err(InformError::UnknownTable(table.to_string()));
        }

        match self.kind.to_ascii_lowercase().as_str() {
            "insert" => Ok(SourceChange::Inserted),
            "update" => Ok(SourceChange::Updated {
                id: required_id(self.record.as_ref(), "update", "record")?,
            }),
            "delete" => Ok(SourceChange::Deleted {
                id: required_id(self.old_record.as_ref(), "delete", "old_record")?,
            }),
            _ => Err(InformError::UnknownType(self.kind.clone())),
        }
    }
}

fn required_id(
    record: Option<&RecordRef>,
    kind: &'static str,
    field: &'static str,
) -> Result<String, InformError> {
    record
        .and_then(|record| record.id.as_ref())
        .map(RecordId::to_string)
        .ok_or(InformError::MissingId { kind, field })
}
