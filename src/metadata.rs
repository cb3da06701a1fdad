//! Descriptive metadata for a loaded dataset.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::binary::DatasetReader;
use crate::error::Result;

/// Descriptive record of a loaded dataset.
///
/// Derived from the file header and copyright section; useful for
/// diagnostics and for surfacing dataset provenance to operators.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatasetMetadata {
    pub format_version: u32,
    #[serde(with = "system_time_serde")]
    pub published: Option<SystemTime>,
    pub copyright: String,
    pub property_count: u32,
    pub profile_count: u32,
    pub node_count: u32,
    pub data_size: u64,
}

mod system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(t) => {
                let duration = t.duration_since(UNIX_EPOCH).unwrap_or_default();
                Some(duration.as_secs()).serialize(serializer)
            }
            None => None::<u64>.serialize(serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SystemTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<u64> = Option::deserialize(deserializer)?;
        Ok(secs.map(|s| UNIX_EPOCH + Duration::from_secs(s)))
    }
}

impl DatasetMetadata {
    /// Capture metadata from a loaded dataset.
    pub fn from_reader(reader: &DatasetReader) -> Self {
        let header = reader.header();
        let published = if header.published > 0 {
            Some(UNIX_EPOCH + Duration::from_secs(header.published as u64))
        } else {
            None
        };

        Self {
            format_version: header.version,
            published,
            copyright: reader.copyright().to_string(),
            property_count: header.property_count,
            profile_count: header.profile_count,
            node_count: header.node_count,
            data_size: reader.data_size(),
        }
    }

    /// Serialize this metadata to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| crate::Error::Metadata(e.to_string()))
    }
}
