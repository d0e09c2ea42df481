//! Canonical query descriptors.
//!
//! Every request shape (fresh parameters, current cursor, deprecated cursor)
//! is normalized into one of these before any storage code runs.

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 15;

/// Upper bound on any page; larger requests are capped silently.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Clamp a requested page size into `[0, MAX_PAGE_SIZE]`.
pub fn clamp_page_size(requested: u64) -> u32 {
    requested.min(u64::from(MAX_PAGE_SIZE)) as u32
}

fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    if value.is_empty() { None } else { Some(value) }
}

/// Equality filters over transactions. All present filters are AND-ed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    /// Matches postings where the address is the source *or* the destination.
    pub account: Option<String>,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub reference: Option<String>,
}

impl TransactionFilter {
    /// Whether any filter targets posting fields (and so needs row expansion).
    pub fn touches_postings(&self) -> bool {
        self.account.is_some() || self.source.is_some() || self.destination.is_some()
    }
}

/// Keyset-paginated transaction listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionsQuery {
    pub filter: TransactionFilter,
    /// Exclusive upper bound on transaction id.
    pub after: Option<u64>,
    pub page_size: u32,
}

impl Default for TransactionsQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionsQuery {
    pub fn new() -> Self {
        Self {
            filter: TransactionFilter::default(),
            after: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.filter.account = non_empty(account);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.filter.source = non_empty(source);
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.filter.destination = non_empty(destination);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.filter.reference = non_empty(reference);
        self
    }

    pub fn with_after(mut self, after: Option<u64>) -> Self {
        self.after = after;
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = clamp_page_size(page_size);
        self
    }
}

/// Offset-paginated balance listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalancesQuery {
    /// Regular expressions over addresses, OR-ed. Empty matches everything.
    pub address_filters: Vec<String>,
    /// Exclusive upper bound on address (addresses are listed descending).
    pub after_address: Option<String>,
    pub offset: u64,
    pub page_size: u32,
}

impl Default for BalancesQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl BalancesQuery {
    pub fn new() -> Self {
        Self {
            address_filters: Vec::new(),
            after_address: None,
            offset: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_address_filter<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.address_filters = filters
            .into_iter()
            .map(Into::into)
            .filter(|f| !f.is_empty())
            .collect();
        self
    }

    pub fn with_after_address(mut self, after: impl Into<String>) -> Self {
        self.after_address = non_empty(after);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = clamp_page_size(page_size);
        self
    }
}
