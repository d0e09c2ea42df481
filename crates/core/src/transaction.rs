//! Transactions and postings.
//!
//! A transaction is immutable once persisted. The ledger never re-derives or
//! "fixes" posting amounts on read; whatever was stored is what is returned.

use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// Open key/value metadata attached to a transaction.
pub type Metadata = BTreeMap<String, JsonValue>;

/// One leg of a transaction: `amount` of `asset` moves from `source` to `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Posting {
    pub source: String,
    pub destination: String,
    pub asset: String,
    /// Quantity in the asset's smallest unit.
    pub amount: u64,
}

impl Posting {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        asset: impl Into<String>,
        amount: u64,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            asset: asset.into(),
            amount,
        }
    }

    /// Whether `address` is either side of this posting.
    pub fn touches(&self, address: &str) -> bool {
        self.source == address || self.destination == address
    }
}

/// A persisted, immutable transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "txid")]
    pub id: u64,
    #[serde(with = "canonical_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Empty when the caller never set one.
    #[serde(default)]
    pub reference: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub metadata: Metadata,
    pub postings: Vec<Posting>,
}

/// A transaction about to be appended.
///
/// `id` is normally left to the store; callers replaying an existing history
/// may pin it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub id: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub reference: String,
    pub metadata: Metadata,
    pub postings: Vec<Posting>,
}

impl NewTransaction {
    pub fn new(postings: Vec<Posting>) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            reference: String::new(),
            metadata: Metadata::new(),
            postings,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The transaction as it reads back once stored under `id`.
    pub fn into_transaction(self, id: u64) -> Transaction {
        Transaction {
            id,
            timestamp: self.timestamp.trunc_subsecs(0),
            reference: self.reference,
            metadata: self.metadata,
            postings: self.postings,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Metadata, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Metadata>::deserialize(deserializer)?.unwrap_or_default())
}

/// Canonical textual timestamps: UTC, second precision, `Z` suffix.
pub mod canonical_timestamp {
    use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.trunc_subsecs(0).to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Parse any RFC 3339 value (offsets, fractional seconds) into the canonical form.
    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        let parsed = DateTime::parse_from_rfc3339(raw.trim())?;
        Ok(parsed.with_timezone(&Utc).trunc_subsecs(0))
    }

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}
