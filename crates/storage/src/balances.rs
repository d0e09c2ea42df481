//! Balance aggregation over the posting history.
//!
//! Balances are derived by streaming every stored posting through a
//! [`BalanceAccumulator`]. Address filters are regular expressions evaluated
//! here rather than in SQL, so both dialects answer identically.

use std::collections::BTreeMap;

use regex::RegexSet;
use sqlx::{AnyConnection, Row};
use tracing::{debug, instrument};

use ledger_core::{
    AccountsBalances, AssetsBalances, BalanceAccumulator, BalancesPaginationToken, BalancesQuery,
    Cursor, LedgerError, LedgerResult, Posting, StorageError, clamp_page_size, encode_token,
};

use crate::cancel::CancelSignal;
use crate::exec;
use crate::store::Store;

/// Decides which addresses take part in a balance query.
#[derive(Debug)]
pub struct AddressMatcher {
    patterns: Option<RegexSet>,
    /// Exclusive upper bound; addresses are listed descending.
    before: Option<String>,
}

impl AddressMatcher {
    /// Patterns are OR-ed and unanchored; an empty list matches everything.
    pub fn new(patterns: &[String], after_address: Option<&str>) -> LedgerResult<Self> {
        let patterns = if patterns.is_empty() {
            None
        } else {
            Some(RegexSet::new(patterns).map_err(|_| LedgerError::invalid_param("address"))?)
        };
        Ok(Self {
            patterns,
            before: after_address.map(str::to_string),
        })
    }

    pub fn matches(&self, address: &str) -> bool {
        if self.before.as_deref().is_some_and(|bound| address >= bound) {
            return false;
        }
        self.patterns
            .as_ref()
            .is_none_or(|set| set.is_match(address))
    }
}

impl Store {
    async fn accumulate(
        &self,
        conn: &mut AnyConnection,
        matcher: &AddressMatcher,
        signal: &CancelSignal,
        operation: &str,
    ) -> LedgerResult<BalanceAccumulator> {
        let mut balances = BalanceAccumulator::new();
        let scanned = exec::for_each_row(
            conn,
            &self.builder().postings_scan(),
            signal,
            operation,
            |row| {
                let raw: String = row
                    .try_get("postings")
                    .map_err(|e| crate::error::map_sqlx_error(operation, e))?;
                let postings: Vec<Posting> = serde_json::from_str(&raw)
                    .map_err(|e| StorageError::corrupt(operation, format!("postings: {e}")))?;
                for posting in &postings {
                    balances.apply(posting, |address| matcher.matches(address));
                }
                Ok(())
            },
        )
        .await?;

        debug!(scanned, addresses = balances.len(), "accumulated balances");
        Ok(balances)
    }

    /// Per-address balances, addresses descending, offset-paginated.
    #[instrument(
        skip(self, conn, query, signal),
        fields(dialect = %self.dialect(), offset = query.offset, page_size = query.page_size),
        err
    )]
    pub async fn get_balances(
        &self,
        conn: &mut AnyConnection,
        query: &BalancesQuery,
        signal: &CancelSignal,
    ) -> LedgerResult<Cursor<AccountsBalances>> {
        const OPERATION: &str = "get_balances";

        let query = &BalancesQuery {
            page_size: clamp_page_size(u64::from(query.page_size)),
            ..query.clone()
        };

        let matcher = AddressMatcher::new(&query.address_filters, query.after_address.as_deref())?;
        let balances = self.accumulate(conn, &matcher, signal, OPERATION).await?;

        let page_size = query.page_size as usize;
        let skip = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let rows: Vec<AccountsBalances> = balances
            .into_descending()
            .into_iter()
            .skip(skip)
            .take(page_size + 1)
            .map(|(address, assets)| BTreeMap::from([(address, assets)]))
            .collect();

        let mut page = Cursor::from_overfetch(rows, query.page_size);
        let step = u64::from(query.page_size);
        let mint = |offset: u64| {
            encode_token(&BalancesPaginationToken::at_offset(query, offset))
                .map_err(|e| StorageError::corrupt(OPERATION, format!("encoding cursor: {e}")))
        };

        if page.has_more {
            page.next = Some(mint(query.offset.saturating_add(step))?);
        }
        if query.offset > 0 {
            page.previous = Some(mint(query.offset.saturating_sub(step))?);
        }
        Ok(page)
    }

    /// Sum of every matching address's balances, per asset.
    #[instrument(skip(self, conn, signal), fields(dialect = %self.dialect()), err)]
    pub async fn get_balances_aggregated(
        &self,
        conn: &mut AnyConnection,
        address_filters: &[String],
        signal: &CancelSignal,
    ) -> LedgerResult<AssetsBalances> {
        const OPERATION: &str = "get_balances_aggregated";

        let matcher = AddressMatcher::new(address_filters, None)?;
        let balances = self.accumulate(conn, &matcher, signal, OPERATION).await?;
        Ok(balances.aggregate())
    }
}
