//! Naming of trashed backing objects and the items derived from them.

use chrono::{DateTime, SecondsFormat, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};
use crate::types::ResourceType;

/// Separates the node id from the deletion timestamp in trashed object names.
pub const TRASH_ID_DELIMITER: &str = ".T.";

/// Format a deletion time the way it is embedded in trashed object names.
pub fn format_deletion_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Name of the backing object of a node trashed at `time`.
pub fn trashed_object_name(node_id: &str, time: DateTime<Utc>) -> String {
    format!("{node_id}{TRASH_ID_DELIMITER}{}", format_deletion_time(time))
}

/// A decoded `<node id>.T.<timestamp>` object name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashedName {
    /// Id the node had before it was trashed.
    pub node_id: CompactString,
    /// Timestamp text as found in the name.
    pub raw_time: String,
}

impl TrashedName {
    /// Decode a trashed object name.
    pub fn parse(name: &str) -> Result<Self> {
        match name.split_once(TRASH_ID_DELIMITER) {
            Some((node_id, raw_time)) if !node_id.is_empty() => Ok(Self {
                node_id: node_id.into(),
                raw_time: raw_time.to_string(),
            }),
            _ => Err(StorageError::internal(format!(
                "malformed trash link {name:?}"
            ))),
        }
    }

    /// Parse the deletion time. `None` if the timestamp is not RFC 3339.
    pub fn deletion_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.raw_time)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// A trashed node as presented to callers. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecycleItem {
    /// Key addressing the item for restore and purge.
    pub key: String,
    pub resource_type: ResourceType,
    pub size: u64,
    /// When the item was trashed, if the link carried a valid timestamp.
    pub deletion_time: Option<DateTime<Utc>>,
    /// Logical path the item had before deletion.
    pub origin_path: String,
}

impl RecycleItem {
    /// Deletion time with second resolution.
    pub fn deletion_seconds(&self) -> Option<i64> {
        self.deletion_time.map(|t| t.timestamp())
    }
}
