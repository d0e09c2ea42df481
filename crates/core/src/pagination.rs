//! Continuation tokens and request-parameter normalization.
//!
//! A continuation token is the whole canonical query descriptor, serialized
//! as compact JSON and encoded base64 URL-safe without padding. Two query keys
//! carry tokens: `cursor` (current) and `pagination_token` (deprecated). Both
//! decode to the same shape; only `cursor` tokens are ever minted.
//!
//! ## Normalization
//!
//! ```text
//! raw query pairs
//!   ↓  alias step: pagination_token → cursor, pageSize → page_size
//!   ↓  exclusivity: a token excludes every other filtering parameter
//!   ↓  decode token  |  parse fresh filters
//! TransactionsQuery / BalancesQuery
//! ```
//!
//! A token and fresh filters are never merged: either the token alone
//! determines the query or the request is rejected.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::query::{BalancesQuery, DEFAULT_PAGE_SIZE, TransactionsQuery, clamp_page_size};

pub const QUERY_KEY_CURSOR: &str = "cursor";
pub const QUERY_KEY_CURSOR_DEPRECATED: &str = "pagination_token";
pub const QUERY_KEY_PAGE_SIZE: &str = "page_size";
pub const QUERY_KEY_PAGE_SIZE_DEPRECATED: &str = "pageSize";
pub const QUERY_KEY_AFTER: &str = "after";
pub const QUERY_KEY_ADDRESS: &str = "address";
pub const QUERY_KEY_ACCOUNT: &str = "account";
pub const QUERY_KEY_SOURCE: &str = "source";
pub const QUERY_KEY_DESTINATION: &str = "destination";
pub const QUERY_KEY_REFERENCE: &str = "reference";

const TRANSACTION_FILTER_KEYS: &[&str] = &[
    QUERY_KEY_ACCOUNT,
    QUERY_KEY_SOURCE,
    QUERY_KEY_DESTINATION,
    QUERY_KEY_REFERENCE,
    QUERY_KEY_ADDRESS,
];
const BALANCE_FILTER_KEYS: &[&str] = &[QUERY_KEY_ADDRESS];

/// Serialize a token into its opaque wire form.
pub fn encode_token<T: Serialize>(token: &T) -> Result<String, serde_json::Error> {
    let raw = serde_json::to_vec(token)?;
    Ok(URL_SAFE_NO_PAD.encode(raw))
}

/// Decode a token received under query key `param`.
pub fn decode_token<T: DeserializeOwned>(param: &str, raw: &str) -> LedgerResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(raw.as_bytes())
        .map_err(|_| LedgerError::invalid_param(param))?;
    serde_json::from_slice(&bytes).map_err(|_| LedgerError::invalid_param(param))
}

/// Token resuming a transaction listing after the last id of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionsPaginationToken {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub page_size: u32,
}

impl TransactionsPaginationToken {
    /// Token for the page following one that ended at `last_id`.
    pub fn next_page(query: &TransactionsQuery, last_id: Option<u64>) -> Self {
        Self {
            after: last_id.or(query.after),
            account: query.filter.account.clone(),
            source: query.filter.source.clone(),
            destination: query.filter.destination.clone(),
            reference: query.filter.reference.clone(),
            page_size: query.page_size,
        }
    }

    pub fn into_query(self) -> TransactionsQuery {
        TransactionsQuery::new()
            .with_account(self.account.unwrap_or_default())
            .with_source(self.source.unwrap_or_default())
            .with_destination(self.destination.unwrap_or_default())
            .with_reference(self.reference.unwrap_or_default())
            .with_after(self.after)
            .with_page_size(u64::from(self.page_size))
    }
}

/// Token resuming a balance listing at an offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BalancesPaginationToken {
    pub offset: u64,
    #[serde(default)]
    pub after_address: String,
    #[serde(default)]
    pub address_regexp_filters: Vec<String>,
    pub page_size: u32,
}

impl BalancesPaginationToken {
    pub fn at_offset(query: &BalancesQuery, offset: u64) -> Self {
        Self {
            offset,
            after_address: query.after_address.clone().unwrap_or_default(),
            address_regexp_filters: query.address_filters.clone(),
            page_size: query.page_size,
        }
    }

    pub fn into_query(self) -> BalancesQuery {
        BalancesQuery::new()
            .with_offset(self.offset)
            .with_after_address(self.after_address)
            .with_address_filter(self.address_regexp_filters)
            .with_page_size(u64::from(self.page_size))
    }
}

/// Raw query-string pairs, in request order. Repeated keys are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// First value for `key`; an empty value counts as absent.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Every value for `key`, comma-split, empties dropped.
    pub fn split_all(&self, key: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .flat_map(|(_, v)| v.split(','))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn has(&self, key: &str) -> bool {
        self.first(key).is_some()
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Parameters after legacy aliases have been folded into canonical keys.
struct Canonical<'a> {
    params: &'a QueryParams,
    /// `(key the token arrived under, raw token)`.
    cursor: Option<(&'static str, &'a str)>,
    page_size: Option<&'a str>,
}

impl<'a> Canonical<'a> {
    fn from_params(params: &'a QueryParams) -> LedgerResult<Self> {
        let cursor = match (
            params.first(QUERY_KEY_CURSOR),
            params.first(QUERY_KEY_CURSOR_DEPRECATED),
        ) {
            (Some(_), Some(_)) => return Err(conflict(QUERY_KEY_CURSOR)),
            (Some(raw), None) => Some((QUERY_KEY_CURSOR, raw)),
            (None, Some(raw)) => Some((QUERY_KEY_CURSOR_DEPRECATED, raw)),
            (None, None) => None,
        };

        let page_size = params
            .first(QUERY_KEY_PAGE_SIZE)
            .or_else(|| params.first(QUERY_KEY_PAGE_SIZE_DEPRECATED));

        Ok(Self {
            params,
            cursor,
            page_size,
        })
    }

    /// Reject the request if a token travels with any other filtering key.
    fn ensure_token_alone(&self, cursor_key: &str, filter_keys: &[&str]) -> LedgerResult<()> {
        let crowded = self.page_size.is_some()
            || self.params.has(QUERY_KEY_AFTER)
            || filter_keys.iter().any(|k| self.params.has(k));
        if crowded {
            return Err(conflict(cursor_key));
        }
        Ok(())
    }

    fn page_size(&self) -> LedgerResult<u32> {
        match self.page_size {
            None => Ok(DEFAULT_PAGE_SIZE),
            Some(raw) => raw.parse::<u64>().map(clamp_page_size).map_err(|_| {
                LedgerError::validation(
                    QUERY_KEY_PAGE_SIZE,
                    format!("invalid query value '{QUERY_KEY_PAGE_SIZE}'"),
                )
            }),
        }
    }
}

fn conflict(cursor_key: &str) -> LedgerError {
    LedgerError::validation(
        cursor_key,
        format!("no other query params can be set with '{cursor_key}'"),
    )
}

/// Normalize a transaction-listing request.
pub fn transactions_query(params: &QueryParams) -> LedgerResult<TransactionsQuery> {
    let canonical = Canonical::from_params(params)?;

    if let Some((key, raw)) = canonical.cursor {
        canonical.ensure_token_alone(key, TRANSACTION_FILTER_KEYS)?;
        let token: TransactionsPaginationToken = decode_token(key, raw)?;
        return Ok(token.into_query());
    }

    let after = params
        .first(QUERY_KEY_AFTER)
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|_| LedgerError::invalid_param(QUERY_KEY_AFTER))
        })
        .transpose()?;

    let page_size = canonical.page_size()?;
    Ok(TransactionsQuery::new()
        .with_account(params.first(QUERY_KEY_ACCOUNT).unwrap_or_default())
        .with_source(params.first(QUERY_KEY_SOURCE).unwrap_or_default())
        .with_destination(params.first(QUERY_KEY_DESTINATION).unwrap_or_default())
        .with_reference(params.first(QUERY_KEY_REFERENCE).unwrap_or_default())
        .with_after(after)
        .with_page_size(u64::from(page_size)))
}

/// Normalize a balance-listing request.
pub fn balances_query(params: &QueryParams) -> LedgerResult<BalancesQuery> {
    let canonical = Canonical::from_params(params)?;

    if let Some((key, raw)) = canonical.cursor {
        canonical.ensure_token_alone(key, BALANCE_FILTER_KEYS)?;
        let token: BalancesPaginationToken = decode_token(key, raw)?;
        return Ok(token.into_query());
    }

    let page_size = canonical.page_size()?;
    Ok(BalancesQuery::new()
        .with_after_address(params.first(QUERY_KEY_AFTER).unwrap_or_default())
        .with_address_filter(params.split_all(QUERY_KEY_ADDRESS))
        .with_page_size(u64::from(page_size)))
}

/// Address filter for the aggregated-balance endpoint (single pattern, optional).
pub fn aggregated_balances_filter(params: &QueryParams) -> Vec<String> {
    params
        .first(QUERY_KEY_ADDRESS)
        .map(|f| vec![f.to_string()])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::MAX_PAGE_SIZE;
    use proptest::prelude::*;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs.iter().copied().collect()
    }

    fn balances_token(offset: u64) -> String {
        encode_token(&BalancesPaginationToken {
            offset,
            after_address: "users:9".into(),
            address_regexp_filters: vec!["users:.*".into()],
            page_size: 10,
        })
        .unwrap()
    }

    #[test]
    fn fresh_balance_params_split_addresses() {
        let q = balances_query(&params(&[
            ("address", "users:1,users:2"),
            ("address", "bank"),
            ("after", "users:5"),
            ("pageSize", "20"),
        ]))
        .unwrap();

        assert_eq!(q.address_filters, vec!["users:1", "users:2", "bank"]);
        assert_eq!(q.after_address.as_deref(), Some("users:5"));
        assert_eq!(q.page_size, 20);
        assert_eq!(q.offset, 0);
    }

    #[test]
    fn current_and_deprecated_tokens_decode_identically() {
        let token = balances_token(30);
        let current = balances_query(&params(&[("cursor", token.as_str())])).unwrap();
        let legacy = balances_query(&params(&[("pagination_token", token.as_str())])).unwrap();

        assert_eq!(current, legacy);
        assert_eq!(current.offset, 30);
        assert_eq!(current.address_filters, vec!["users:.*"]);
    }

    #[test]
    fn cursor_with_address_is_rejected_naming_cursor() {
        let token = balances_token(0);
        let err = balances_query(&params(&[
            ("cursor", token.as_str()),
            ("address", "users:1"),
            ("page_size", "5"),
        ]))
        .unwrap_err();
        assert_eq!(err.param(), Some("cursor"));
        assert_eq!(err.to_string(), "no other query params can be set with 'cursor'");
    }

    #[test]
    fn transaction_cursor_with_address_is_rejected() {
        let token = encode_token(&TransactionsPaginationToken::next_page(&TransactionsQuery::new(), Some(4)))
            .unwrap();
        let err = transactions_query(&params(&[("cursor", token.as_str()), ("address", "users:1")]))
            .unwrap_err();
        assert_eq!(err.param(), Some("cursor"));
        assert_eq!(err.to_string(), "no other query params can be set with 'cursor'");
    }

    #[test]
    fn both_cursor_generations_conflict() {
        let token = balances_token(0);
        let err =
            balances_query(&params(&[("cursor", token.as_str()), ("pagination_token", token.as_str())])).unwrap_err();
        assert_eq!(err.param(), Some("cursor"));
    }

    #[test]
    fn deprecated_cursor_conflict_names_its_key() {
        let token = balances_token(0);
        let err = transactions_query(&params(&[("pagination_token", token.as_str()), ("after", "3")]))
            .unwrap_err();
        assert_eq!(err.param(), Some("pagination_token"));
    }

    #[test]
    fn undecodable_tokens_are_validation_errors() {
        let err = balances_query(&params(&[("cursor", "!!not-base64!!")])).unwrap_err();
        assert_eq!(err, LedgerError::invalid_param("cursor"));

        let not_json = URL_SAFE_NO_PAD.encode(b"plain text");
        let err = balances_query(&params(&[("pagination_token", not_json.as_str())])).unwrap_err();
        assert_eq!(err, LedgerError::invalid_param("pagination_token"));

        // Padded encodings are not the wire format.
        let padded = base64::engine::general_purpose::URL_SAFE.encode(br#"{"offset":0,"page_size":1}"#);
        assert!(padded.ends_with('='));
        assert!(balances_query(&params(&[("cursor", padded.as_str())])).is_err());
    }

    #[test]
    fn tokens_are_not_interchangeable_between_listings() {
        let err = transactions_query(&params(&[("cursor", balances_token(0).as_str())])).unwrap_err();
        assert_eq!(err.param(), Some("cursor"));
    }

    #[test]
    fn page_size_must_be_numeric_and_is_capped() {
        let err = transactions_query(&params(&[("page_size", "ten")])).unwrap_err();
        assert_eq!(err.param(), Some("page_size"));

        let q = transactions_query(&params(&[("page_size", "5000")])).unwrap();
        assert_eq!(q.page_size, MAX_PAGE_SIZE);

        let q = transactions_query(&params(&[])).unwrap();
        assert_eq!(q.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn transaction_after_must_be_an_id() {
        let err = transactions_query(&params(&[("after", "abc")])).unwrap_err();
        assert_eq!(err.param(), Some("after"));
    }

    #[test]
    fn token_page_size_is_clamped_on_read() {
        let raw = URL_SAFE_NO_PAD.encode(br#"{"page_size":4000}"#);
        let q = transactions_query(&params(&[("cursor", raw.as_str())])).unwrap();
        assert_eq!(q.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn wire_format_keys() {
        let token = BalancesPaginationToken::at_offset(&BalancesQuery::new(), 15);
        let json: serde_json::Value = serde_json::to_value(&token).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["address_regexp_filters", "after_address", "offset", "page_size"]
        );
    }

    proptest! {
        #[test]
        fn fresh_transaction_query_survives_token(
            account in "[a-z]{0,6}(:[a-z0-9]{1,4}){0,2}",
            reference in "[A-Za-z0-9_-]{0,8}",
            after in proptest::option::of(0u64..10_000),
            page_size in 0u64..500,
        ) {
            let fresh = TransactionsQuery::new()
                .with_account(account)
                .with_reference(reference)
                .with_after(after)
                .with_page_size(page_size);

            let token = encode_token(&TransactionsPaginationToken::next_page(&fresh, None)).unwrap();
            let resumed = transactions_query(&params(&[("cursor", token.as_str())])).unwrap();
            prop_assert_eq!(resumed, fresh);
        }
    }
}
