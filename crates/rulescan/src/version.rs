use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("version {0:?} is not a dotted sequence of integers")]
pub struct VersionError(pub String);

/// A template release version such as `6.10`.
///
/// Versions order by their numeric tuple, so `1.10` sorts after `1.9`. The raw text is kept for
/// display and only breaks ties between spellings of the same tuple (`1.01` vs `1.1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    raw: String,
    key: Vec<u64>,
}

impl Version {
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let key = raw
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                part.parse::<u64>().ok()
            })
            .collect::<Option<Vec<u64>>>()
            .ok_or_else(|| VersionError(raw.to_string()))?;
        Ok(Self {
            raw: raw.to_string(),
            key,
        })
    }

    /// Version suffix of a file stem, e.g. `RMI_CMRT_6.5` → `6.5`.
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        static VERSION_RE: OnceLock<Regex> = OnceLock::new();
        let re = VERSION_RE
            .get_or_init(|| Regex::new(r"_(\d+(?:\.\d+)*)$").expect("valid regex"));
        let raw = re.captures(stem)?.get(1)?.as_str();
        Self::parse(raw).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn key(&self) -> &[u64] {
        &self.key
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Version::parse(&raw).map_err(serde::de::Error::custom)
    }
}
