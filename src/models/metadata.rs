use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// Keys owned by [`LocalMetadata`]; never carried as free-form fields
const RESERVED_KEYS: &[&str] = &["base_url", "tos_accepted", "acceptance_timestamp"];

/// ToS version marker: a sequence number or a publication timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Version {
    Sequence(u64),
    Timestamp(DateTime<Utc>),
}

impl Version {
    fn sort_key(&self) -> (i128, u8, u32) {
        match self {
            Version::Sequence(n) => (i128::from(*n), 0, 0),
            Version::Timestamp(ts) => (
                i128::from(ts.timestamp()),
                1,
                ts.timestamp_subsec_nanos(),
            ),
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// File stem used on disk: the sequence number, or unix seconds with a
/// nanosecond suffix (`{secs}.{nanos:09}`) when the timestamp has one
impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Sequence(n) => write!(f, "{n}"),
            Version::Timestamp(ts) => match ts.timestamp_subsec_nanos() {
                0 => write!(f, "{}", ts.timestamp()),
                nanos => write!(f, "{}.{nanos:09}", ts.timestamp()),
            },
        }
    }
}

impl From<u64> for Version {
    fn from(n: u64) -> Self {
        Version::Sequence(n)
    }
}

impl From<DateTime<Utc>> for Version {
    fn from(ts: DateTime<Utc>) -> Self {
        Version::Timestamp(ts)
    }
}

/// ToS document as published by a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMetadata {
    #[serde(alias = "tos_version", alias = "timestamp")]
    pub version: Version,
    pub text: String,
    /// Unknown fields (support contact, ...) passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RemoteMetadata {
    pub fn new(version: impl Into<Version>, text: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            text: text.into(),
            extra: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Support contact, when the channel publishes one
    pub fn support(&self) -> Option<&str> {
        self.extra.get("support").and_then(Value::as_str)
    }
}

impl AsRef<RemoteMetadata> for RemoteMetadata {
    fn as_ref(&self) -> &RemoteMetadata {
        self
    }
}

/// An accept/reject decision and when it was made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub accepted: bool,
    pub timestamp: DateTime<Utc>,
}

/// ToS metadata as persisted locally, one file per channel and version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLocalMetadata", into = "RawLocalMetadata")]
pub struct LocalMetadata {
    pub remote: RemoteMetadata,
    pub base_url: String,
    pub decision: Option<Decision>,
}

impl LocalMetadata {
    /// Stamp a decision onto a base document
    pub fn decide(
        base: &RemoteMetadata,
        base_url: impl Into<String>,
        accepted: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut remote = base.clone();
        remote
            .extra
            .retain(|key, _| !RESERVED_KEYS.contains(&key.as_str()));
        Self {
            remote,
            base_url: base_url.into(),
            decision: Some(Decision {
                accepted,
                timestamp,
            }),
        }
    }

    pub fn version(&self) -> Version {
        self.remote.version
    }

    pub fn tos_accepted(&self) -> Option<bool> {
        self.decision.map(|d| d.accepted)
    }

    pub fn acceptance_timestamp(&self) -> Option<DateTime<Utc>> {
        self.decision.map(|d| d.timestamp)
    }
}

impl AsRef<RemoteMetadata> for LocalMetadata {
    fn as_ref(&self) -> &RemoteMetadata {
        &self.remote
    }
}

/// On-disk shape of [`LocalMetadata`]
#[derive(Serialize, Deserialize)]
struct RawLocalMetadata {
    #[serde(flatten)]
    remote: RemoteMetadata,
    base_url: String,
    #[serde(default)]
    tos_accepted: Option<bool>,
    #[serde(default)]
    acceptance_timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<RawLocalMetadata> for LocalMetadata {
    type Error = String;

    fn try_from(raw: RawLocalMetadata) -> Result<Self, Self::Error> {
        let decision = match (raw.tos_accepted, raw.acceptance_timestamp) {
            (Some(accepted), Some(timestamp)) => Some(Decision {
                accepted,
                timestamp,
            }),
            (None, None) => None,
            _ => {
                return Err(
                    "`tos_accepted` and `acceptance_timestamp` must be provided together"
                        .to_string(),
                );
            }
        };
        Ok(Self {
            remote: raw.remote,
            base_url: raw.base_url,
            decision,
        })
    }
}

impl From<LocalMetadata> for RawLocalMetadata {
    fn from(local: LocalMetadata) -> Self {
        Self {
            remote: local.remote,
            base_url: local.base_url,
            tos_accepted: local.decision.map(|d| d.accepted),
            acceptance_timestamp: local.decision.map(|d| d.timestamp),
        }
    }
}
