//! Ledger-scoped chart-of-accounts configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A rule attached to an account pattern. `expr` is opaque to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub account: String,
    pub expr: JsonValue,
}

/// Singleton mapping; the latest saved value wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    #[serde(default)]
    pub contracts: Vec<Contract>,
}
