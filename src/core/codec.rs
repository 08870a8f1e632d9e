//! Store formats and the default payload codec of each.
//!
//! Payloads are an opaque byte contract at the store level. Typed writer and
//! reader helpers go through [`encode`] / [`decode`], which pick `bincode` for
//! binary stores and `serde_json` for JSON stores.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// On-disk store format. Persisted as the partition reader type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFormat {
    /// Multiplexed binary segments with crc-checked records.
    #[default]
    Binary,
    /// One JSON object per line.
    Json,
}

impl StoreFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreFormat::Binary => "binary",
            StoreFormat::Json => "json",
        }
    }
}

impl fmt::Display for StoreFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "binary" => Ok(StoreFormat::Binary),
            "json" => Ok(StoreFormat::Json),
            _ => Err(Error::Unsupported("unknown store format")),
        }
    }
}

pub fn encode<T: Serialize + ?Sized>(format: StoreFormat, value: &T) -> Result<Vec<u8>> {
    match format {
        StoreFormat::Binary => Ok(bincode::serialize(value)?),
        StoreFormat::Json => Ok(serde_json::to_vec(value)?),
    }
}

pub fn decode<T: DeserializeOwned>(format: StoreFormat, bytes: &[u8]) -> Result<T> {
    match format {
        StoreFormat::Binary => Ok(bincode::deserialize(bytes)?),
        StoreFormat::Json => Ok(serde_json::from_slice(bytes)?),
    }
}
