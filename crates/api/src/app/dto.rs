use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledger_core::{Metadata, NewTransaction, QueryParams};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AppendTransactionRequest {
    pub postings: Vec<ledger_core::Posting>,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    /// Defaults to the time of the request.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<AppendTransactionRequest> for NewTransaction {
    fn from(req: AppendTransactionRequest) -> Self {
        let tx = NewTransaction::new(req.postings)
            .with_reference(req.reference)
            .with_metadata(req.metadata.unwrap_or_default());
        match req.timestamp {
            Some(ts) => tx.with_timestamp(ts),
            None => tx,
        }
    }
}

/// Raw query pairs as received, repeated keys preserved.
pub fn query_params(pairs: Vec<(String, String)>) -> QueryParams {
    pairs.into_iter().collect()
}

// -------------------------
// Response DTOs
// -------------------------

/// `{ "data": ... }` envelope for single resources.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}
