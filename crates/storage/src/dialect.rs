//! Dialect-aware SQL construction.
//!
//! Statements are built as plain SQL text plus ordered bind arguments. The
//! same logical query compiles differently per backend:
//!
//! | concern | Postgres | SQLite |
//! |---|---|---|
//! | placeholders | `$1, $2` | `?1, ?2` |
//! | postings expansion | `jsonb_to_recordset` with typed columns | `json_each` rows |
//! | posting field access | `p.source` | `json_extract(p.value, '$.source')` |
//! | JSON read-back | `col::text` | `col` |
//!
//! Each backend is one [`QueryBuilder`] implementation supplying those hooks;
//! every statement shape lives once in the trait's provided methods. Adding a
//! backend means adding a [`Dialect`] variant and one builder.
//!
//! Ordering is always `t.id DESC`, so page stability rests on id uniqueness.

use core::fmt;

use ledger_core::TransactionFilter;

/// Identifier of the single mapping row.
pub const MAPPING_ROW_ID: &str = "0";

/// Supported SQL backends.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Resolve from a sqlx `Any` backend name (`AnyConnection::backend_name`).
    pub fn from_backend_name(name: &str) -> Option<Self> {
        match name {
            "PostgreSQL" => Some(Self::Postgres),
            "SQLite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    pub fn builder(self) -> &'static dyn QueryBuilder {
        match self {
            Self::Postgres => &PostgresBuilder,
            Self::Sqlite => &SqliteBuilder,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => f.write_str("postgres"),
            Self::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// A bind argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Int(i64),
    Text(String),
    Null,
}

/// Parameterized SQL for exactly one dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Arg>,
}

/// Fields of an expanded posting row.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PostingField {
    Source,
    Destination,
    Asset,
}

impl PostingField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
            Self::Asset => "asset",
        }
    }
}

/// Column values for a transaction insert, already encoded for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInsert {
    pub id: i64,
    pub timestamp: String,
    /// `None` stores SQL NULL (no reference).
    pub reference: Option<String>,
    pub postings: String,
    pub metadata: String,
}

const TRANSACTION_GROUP_BY: &str = "t.id, t.postings, t.metadata, t.timestamp, t.reference";

/// WHERE-clause accumulator that numbers placeholders as arguments are pushed.
struct Conditions<'b, B: ?Sized> {
    builder: &'b B,
    clauses: Vec<String>,
    args: Vec<Arg>,
}

impl<'b, B: QueryBuilder + ?Sized> Conditions<'b, B> {
    fn new(builder: &'b B) -> Self {
        Self {
            builder,
            clauses: Vec::new(),
            args: Vec::new(),
        }
    }

    fn bind(&mut self, arg: Arg) -> String {
        self.args.push(arg);
        self.builder.placeholder(self.args.len())
    }

    fn equal(&mut self, expr: &str, value: &str) {
        let p = self.bind(Arg::Text(value.to_string()));
        self.clauses.push(format!("{expr} = {p}"));
    }

    fn either_equal(&mut self, left: &str, right: &str, value: &str) {
        let l = self.bind(Arg::Text(value.to_string()));
        let r = self.bind(Arg::Text(value.to_string()));
        self.clauses.push(format!("({left} = {l} OR {right} = {r})"));
    }

    fn less_than(&mut self, expr: &str, value: i64) {
        let p = self.bind(Arg::Int(value));
        self.clauses.push(format!("{expr} < {p}"));
    }

    fn apply_filter(&mut self, filter: &TransactionFilter) {
        let source = self.builder.posting_field(PostingField::Source);
        let destination = self.builder.posting_field(PostingField::Destination);
        if let Some(account) = &filter.account {
            self.either_equal(&source, &destination, account);
        }
        if let Some(s) = &filter.source {
            self.equal(&source, s);
        }
        if let Some(d) = &filter.destination {
            self.equal(&destination, d);
        }
        if let Some(reference) = &filter.reference {
            self.equal("t.reference", reference);
        }
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Saturate a client-supplied id into the storage integer range.
fn id_arg(id: u64) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

/// Per-backend SQL construction.
pub trait QueryBuilder: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Placeholder for the 1-based argument `index`.
    fn placeholder(&self, index: usize) -> String;

    /// FROM fragment turning each element of `t.postings` into a row aliased `p`.
    fn postings_expansion(&self) -> &'static str;

    /// Expression for one field of an expanded posting row.
    fn posting_field(&self, field: PostingField) -> String;

    /// Select-list expression reading JSON column `t.<column>` back as text.
    fn json_read(&self, column: &str) -> String;

    /// Value expression storing a text placeholder into a JSON column.
    fn json_write(&self, placeholder: &str) -> String;

    /// Idempotent DDL for the ledger tables.
    fn create_tables(&self) -> &'static [&'static str];

    /// FROM clause for a transaction query, expanding postings only when needed.
    fn transactions_from(&self, filter: &TransactionFilter) -> String {
        if filter.touches_postings() {
            format!("FROM transactions t, {}", self.postings_expansion())
        } else {
            "FROM transactions t".to_string()
        }
    }

    fn transaction_columns(&self) -> String {
        format!(
            "t.id, t.timestamp, t.reference, {} AS metadata, {} AS postings",
            self.json_read("metadata"),
            self.json_read("postings")
        )
    }

    /// Filtered, keyset-bounded page of transactions, newest first.
    fn filtered_select(
        &self,
        filter: &TransactionFilter,
        after: Option<u64>,
        limit: usize,
    ) -> Statement {
        let mut conditions = Conditions::new(self);
        conditions.apply_filter(filter);
        if let Some(after) = after {
            conditions.less_than("t.id", id_arg(after));
        }

        let group_by = if filter.touches_postings() {
            format!(" GROUP BY {TRANSACTION_GROUP_BY}")
        } else {
            String::new()
        };

        let sql = format!(
            "SELECT {} {}{}{} ORDER BY t.id DESC LIMIT {limit}",
            self.transaction_columns(),
            self.transactions_from(filter),
            conditions.where_sql(),
            group_by,
        );
        Statement {
            sql,
            args: conditions.args,
        }
    }

    /// Number of distinct transactions matching `filter`, ignoring pagination.
    fn count_query(&self, filter: &TransactionFilter) -> Statement {
        let mut conditions = Conditions::new(self);
        conditions.apply_filter(filter);

        let sql = if filter.touches_postings() {
            format!(
                "SELECT COUNT(*) AS total FROM (SELECT t.id {}{} GROUP BY t.id) AS filtered",
                self.transactions_from(filter),
                conditions.where_sql(),
            )
        } else {
            format!(
                "SELECT COUNT(*) AS total {}{}",
                self.transactions_from(filter),
                conditions.where_sql(),
            )
        };
        Statement {
            sql,
            args: conditions.args,
        }
    }

    /// Point lookup; at most one logical transaction.
    fn lookup(&self, id: i64) -> Statement {
        let mut conditions = Conditions::new(self);
        let p = conditions.bind(Arg::Int(id));
        conditions.clauses.push(format!("t.id = {p}"));
        let sql = format!(
            "SELECT {} FROM transactions t{} ORDER BY t.id DESC LIMIT 1",
            self.transaction_columns(),
            conditions.where_sql(),
        );
        Statement {
            sql,
            args: conditions.args,
        }
    }

    /// Every transaction's postings, oldest first.
    fn postings_scan(&self) -> Statement {
        Statement {
            sql: format!(
                "SELECT {} AS postings FROM transactions t ORDER BY t.id ASC",
                self.json_read("postings")
            ),
            args: Vec::new(),
        }
    }

    fn next_id(&self) -> Statement {
        Statement {
            sql: "SELECT COALESCE(MAX(id) + 1, 0) AS next_id FROM transactions".to_string(),
            args: Vec::new(),
        }
    }

    fn insert_transaction(&self, row: &TransactionInsert) -> Statement {
        let args = vec![
            Arg::Int(row.id),
            Arg::Text(row.timestamp.clone()),
            row.reference.clone().map_or(Arg::Null, Arg::Text),
            Arg::Text(row.postings.clone()),
            Arg::Text(row.metadata.clone()),
        ];
        let sql = format!(
            "INSERT INTO transactions (id, timestamp, reference, postings, metadata) VALUES ({}, {}, {}, {}, {})",
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3),
            self.json_write(&self.placeholder(4)),
            self.json_write(&self.placeholder(5)),
        );
        Statement { sql, args }
    }

    fn load_mapping(&self) -> Statement {
        Statement {
            sql: format!(
                "SELECT mapping FROM mapping WHERE mapping_id = {}",
                self.placeholder(1)
            ),
            args: vec![Arg::Text(MAPPING_ROW_ID.to_string())],
        }
    }

    /// Upsert: the latest saved mapping wins.
    fn save_mapping(&self, mapping_json: &str) -> Statement {
        Statement {
            sql: format!(
                "INSERT INTO mapping (mapping_id, mapping) VALUES ({}, {}) \
                 ON CONFLICT (mapping_id) DO UPDATE SET mapping = excluded.mapping",
                self.placeholder(1),
                self.placeholder(2),
            ),
            args: vec![
                Arg::Text(MAPPING_ROW_ID.to_string()),
                Arg::Text(mapping_json.to_string()),
            ],
        }
    }
}

/// Postgres: native recordset expansion of `jsonb` postings.
#[derive(Debug, Default, Copy, Clone)]
pub struct PostgresBuilder;

impl QueryBuilder for PostgresBuilder {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn postings_expansion(&self) -> &'static str {
        "jsonb_to_recordset(t.postings) AS p(source varchar, destination varchar, asset varchar)"
    }

    fn posting_field(&self, field: PostingField) -> String {
        format!("p.{}", field.as_str())
    }

    fn json_read(&self, column: &str) -> String {
        format!("t.{column}::text")
    }

    fn json_write(&self, placeholder: &str) -> String {
        format!("{placeholder}::jsonb")
    }

    fn create_tables(&self) -> &'static [&'static str] {
        &[
            "CREATE TABLE IF NOT EXISTS transactions (\
                id bigint PRIMARY KEY, \
                timestamp varchar NOT NULL, \
                reference varchar UNIQUE, \
                postings jsonb NOT NULL, \
                metadata jsonb NOT NULL DEFAULT '{}'::jsonb)",
            "CREATE TABLE IF NOT EXISTS mapping (\
                mapping_id varchar PRIMARY KEY, \
                mapping text NOT NULL)",
        ]
    }
}

/// SQLite: per-element JSON extraction through `json_each`.
#[derive(Debug, Default, Copy, Clone)]
pub struct SqliteBuilder;

impl QueryBuilder for SqliteBuilder {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{index}")
    }

    fn postings_expansion(&self) -> &'static str {
        "json_each(t.postings) AS p"
    }

    fn posting_field(&self, field: PostingField) -> String {
        format!("json_extract(p.value, '$.{}')", field.as_str())
    }

    fn json_read(&self, column: &str) -> String {
        format!("t.{column}")
    }

    fn json_write(&self, placeholder: &str) -> String {
        placeholder.to_string()
    }

    fn create_tables(&self) -> &'static [&'static str] {
        &[
            "CREATE TABLE IF NOT EXISTS transactions (\
                id integer PRIMARY KEY, \
                timestamp text NOT NULL, \
                reference text UNIQUE, \
                postings text NOT NULL, \
                metadata text NOT NULL DEFAULT '{}')",
            "CREATE TABLE IF NOT EXISTS mapping (\
                mapping_id text PRIMARY KEY, \
                mapping text NOT NULL)",
        ]
    }
}
