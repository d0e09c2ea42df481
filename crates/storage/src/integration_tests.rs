//! End-to-end store tests against in-memory SQLite through the `Any` driver.
//!
//! Each test opens its own connection, so each gets a private database.
//! The Postgres variant runs only when `LEDGER_TEST_POSTGRES_URL` is set.

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use sqlx::{AnyConnection, Connection};
    use tokio::sync::watch;

    use ledger_core::pagination::{balances_query, transactions_query};
    use ledger_core::{
        BalancesQuery, LedgerError, Mapping, NewTransaction, Posting, QueryParams, StorageError,
        TransactionsQuery,
    };

    use crate::cancel::CancelSignal;
    use crate::dialect::Dialect;
    use crate::schema::migrate;
    use crate::store::Store;

    async fn setup() -> (AnyConnection, Store) {
        sqlx::any::install_default_drivers();
        let mut conn = AnyConnection::connect("sqlite::memory:").await.unwrap();
        let store = Store::for_connection(&conn).unwrap();
        assert_eq!(store.dialect(), Dialect::Sqlite);
        migrate(&mut conn, store.dialect()).await.unwrap();
        (conn, store)
    }

    fn transfer(source: &str, destination: &str, amount: u64) -> NewTransaction {
        NewTransaction::new(vec![Posting::new(source, destination, "USD", amount)])
            .with_timestamp(Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap())
    }

    fn cursor_params(token: &str) -> QueryParams {
        [("cursor", token)].into_iter().collect()
    }

    #[tokio::test]
    async fn ids_are_assigned_from_zero() {
        let (mut conn, store) = setup().await;
        let none = CancelSignal::none();

        let first = store.append(&mut conn, transfer("world", "a", 1), &none).await.unwrap();
        let second = store.append(&mut conn, transfer("world", "b", 1), &none).await.unwrap();

        assert_eq!(first.id, 0);
        assert_eq!(second.id, 1);
    }

    #[tokio::test]
    async fn keyset_pages_walk_ids_newest_first() {
        let (mut conn, store) = setup().await;
        let none = CancelSignal::none();
        for id in 1..=5 {
            store
                .append(&mut conn, transfer("world", "users:1", 10).with_id(id), &none)
                .await
                .unwrap();
        }

        let query = TransactionsQuery::new().with_page_size(2);
        let page = store.find_transactions(&mut conn, &query, &none).await.unwrap();
        assert_eq!(page.data.iter().map(|t| t.id).collect::<Vec<_>>(), vec![5, 4]);
        assert!(page.has_more);
        assert_eq!(page.total, Some(5));

        let query = transactions_query(&cursor_params(page.next.as_deref().unwrap())).unwrap();
        let page = store.find_transactions(&mut conn, &query, &none).await.unwrap();
        assert_eq!(page.data.iter().map(|t| t.id).collect::<Vec<_>>(), vec![3, 2]);
        assert!(page.has_more);

        let query = transactions_query(&cursor_params(page.next.as_deref().unwrap())).unwrap();
        let page = store.find_transactions(&mut conn, &query, &none).await.unwrap();
        assert_eq!(page.data.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1]);
        assert!(!page.has_more);
        assert!(page.next.is_none());
        assert_eq!(page.total, Some(5));
    }

    #[tokio::test]
    async fn account_filter_only_returns_touching_transactions() {
        let (mut conn, store) = setup().await;
        let none = CancelSignal::none();
        store.append(&mut conn, transfer("world", "users:1", 100), &none).await.unwrap();
        store.append(&mut conn, transfer("world", "users:2", 50), &none).await.unwrap();
        store.append(&mut conn, transfer("users:1", "users:2", 30), &none).await.unwrap();

        let query = TransactionsQuery::new().with_account("users:1");
        let page = store.find_transactions(&mut conn, &query, &none).await.unwrap();
        assert_eq!(page.data.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 0]);
        assert!(page
            .data
            .iter()
            .all(|tx| tx.postings.iter().any(|p| p.touches("users:1"))));
        assert_eq!(page.total, Some(2));

        let query = TransactionsQuery::new().with_source("users:1").with_destination("users:2");
        let page = store.find_transactions(&mut conn, &query, &none).await.unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, 2);

        let query = TransactionsQuery::new().with_destination("nobody");
        let page = store.find_transactions(&mut conn, &query, &none).await.unwrap();
        assert!(page.data.is_empty());
        assert!(!page.has_more);
        assert_eq!(page.total, Some(0));
    }

    #[tokio::test]
    async fn multi_posting_matches_collapse_to_one_row() {
        let (mut conn, store) = setup().await;
        let none = CancelSignal::none();
        let tx = NewTransaction::new(vec![
            Posting::new("world", "users:1", "USD", 10),
            Posting::new("users:1", "fees", "USD", 1),
            Posting::new("world", "users:1", "EUR", 5),
        ]);
        store.append(&mut conn, tx, &none).await.unwrap();

        let query = TransactionsQuery::new().with_account("users:1");
        let page = store.find_transactions(&mut conn, &query, &none).await.unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].postings.len(), 3);
        assert_eq!(page.total, Some(1));
    }

    #[tokio::test]
    async fn reference_lookup_and_uniqueness() {
        let (mut conn, store) = setup().await;
        let none = CancelSignal::none();
        store
            .append(&mut conn, transfer("world", "a", 1).with_reference("order-1"), &none)
            .await
            .unwrap();
        store.append(&mut conn, transfer("world", "b", 1), &none).await.unwrap();
        store.append(&mut conn, transfer("world", "c", 1), &none).await.unwrap();

        let query = TransactionsQuery::new().with_reference("order-1");
        let page = store.find_transactions(&mut conn, &query, &none).await.unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].reference, "order-1");

        let err = store
            .append(&mut conn, transfer("world", "d", 1).with_reference("order-1"), &none)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Storage(StorageError::Constraint { .. })
        ));
    }

    #[tokio::test]
    async fn point_lookup_round_trips_and_reports_absence() {
        let (mut conn, store) = setup().await;
        let none = CancelSignal::none();
        let mut metadata = ledger_core::Metadata::new();
        metadata.insert("order".into(), serde_json::json!({"id": 7}));
        let stored = store
            .append(
                &mut conn,
                transfer("world", "users:1", 100).with_metadata(metadata),
                &none,
            )
            .await
            .unwrap();

        let found = store.get_transaction(&mut conn, stored.id, &none).await.unwrap();
        assert_eq!(found, Some(stored));

        assert_eq!(store.get_transaction(&mut conn, 42, &none).await.unwrap(), None);
        assert_eq!(store.get_transaction(&mut conn, u64::MAX, &none).await.unwrap(), None);
    }

    #[tokio::test]
    async fn zero_page_size_still_reports_more() {
        let (mut conn, store) = setup().await;
        let none = CancelSignal::none();
        store.append(&mut conn, transfer("world", "a", 1), &none).await.unwrap();

        let query = TransactionsQuery::new().with_page_size(0);
        let page = store.find_transactions(&mut conn, &query, &none).await.unwrap();
        assert!(page.data.is_empty());
        assert!(page.has_more);
        assert_eq!(page.page_size, 0);
    }

    #[tokio::test]
    async fn oversized_page_size_is_capped_by_the_store() {
        let (mut conn, store) = setup().await;
        let none = CancelSignal::none();
        for _ in 0..150 {
            store.append(&mut conn, transfer("world", "a", 1), &none).await.unwrap();
        }

        let mut query = TransactionsQuery::new();
        query.page_size = 500;
        let page = store.find_transactions(&mut conn, &query, &none).await.unwrap();
        assert_eq!(page.data.len(), 100);
        assert_eq!(page.page_size, 100);
        assert!(page.has_more);
        assert_eq!(page.total, Some(150));

        let next = transactions_query(&cursor_params(page.next.as_deref().unwrap())).unwrap();
        assert_eq!(next.page_size, 100);
        let rest = store.find_transactions(&mut conn, &next, &none).await.unwrap();
        assert_eq!(rest.data.len(), 50);
        assert!(!rest.has_more);
    }

    #[tokio::test]
    async fn oversized_balance_page_is_capped_by_the_store() {
        let (mut conn, store) = setup().await;
        let none = CancelSignal::none();
        let postings = (0..120)
            .map(|user| Posting::new("world", format!("users:{user:03}"), "USD", 1))
            .collect();
        store
            .append(&mut conn, NewTransaction::new(postings), &none)
            .await
            .unwrap();

        let mut query = BalancesQuery::new();
        query.page_size = 500;
        let page = store.get_balances(&mut conn, &query, &none).await.unwrap();
        assert_eq!(page.data.len(), 100);
        assert_eq!(page.page_size, 100);
        assert!(page.has_more);

        let next = balances_query(&cursor_params(page.next.as_deref().unwrap())).unwrap();
        assert_eq!(next.offset, 100);
        assert_eq!(next.page_size, 100);
    }

    #[tokio::test]
    async fn repeated_listing_is_stable() {
        let (mut conn, store) = setup().await;
        let none = CancelSignal::none();
        for _ in 0..4 {
            store.append(&mut conn, transfer("world", "a", 1), &none).await.unwrap();
        }
        let query = TransactionsQuery::new().with_account("a").with_page_size(3);
        let first = store.find_transactions(&mut conn, &query, &none).await.unwrap();
        let second = store.find_transactions(&mut conn, &query, &none).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn balances_follow_postings() {
        let (mut conn, store) = setup().await;
        let none = CancelSignal::none();
        store.append(&mut conn, transfer("world", "users:1", 100), &none).await.unwrap();
        store.append(&mut conn, transfer("users:1", "users:2", 30), &none).await.unwrap();

        let page = store
            .get_balances(&mut conn, &BalancesQuery::new(), &none)
            .await
            .unwrap();
        let addresses: Vec<_> = page
            .data
            .iter()
            .flat_map(|entry| entry.keys().cloned())
            .collect();
        assert_eq!(addresses, vec!["world", "users:2", "users:1"]);
        assert_eq!(page.data[0]["world"]["USD"], -100);
        assert_eq!(page.data[1]["users:2"]["USD"], 30);
        assert_eq!(page.data[2]["users:1"]["USD"], 70);
        assert!(page.total.is_none());

        let users = store
            .get_balances_aggregated(&mut conn, &["^users:".to_string()], &none)
            .await
            .unwrap();
        assert_eq!(users.get("USD"), Some(&100));

        let everything = store
            .get_balances_aggregated(&mut conn, &[], &none)
            .await
            .unwrap();
        assert_eq!(everything.get("USD"), Some(&0));
    }

    #[tokio::test]
    async fn balance_pages_use_offsets_in_both_directions() {
        let (mut conn, store) = setup().await;
        let none = CancelSignal::none();
        for user in 1..=5 {
            store
                .append(&mut conn, transfer("world", &format!("users:{user}"), 10), &none)
                .await
                .unwrap();
        }

        let params: QueryParams = [("address", "users:"), ("page_size", "2")].into_iter().collect();
        let query = balances_query(&params).unwrap();
        let first = store.get_balances(&mut conn, &query, &none).await.unwrap();
        assert!(first.data[0].contains_key("users:5"));
        assert!(first.previous.is_none());

        let query = balances_query(&cursor_params(first.next.as_deref().unwrap())).unwrap();
        assert_eq!(query.offset, 2);
        let second = store.get_balances(&mut conn, &query, &none).await.unwrap();
        assert!(second.data[0].contains_key("users:3"));
        assert!(second.has_more);

        let back = balances_query(&cursor_params(second.previous.as_deref().unwrap())).unwrap();
        let again = store.get_balances(&mut conn, &back, &none).await.unwrap();
        assert_eq!(again.data, first.data);

        let after: QueryParams = [("after", "users:2")].into_iter().collect();
        let tail = store
            .get_balances(&mut conn, &balances_query(&after).unwrap(), &none)
            .await
            .unwrap();
        assert_eq!(tail.data.len(), 1);
        assert!(tail.data[0].contains_key("users:1"));
    }

    #[tokio::test]
    async fn mapping_latest_save_wins() {
        let (mut conn, store) = setup().await;
        let none = CancelSignal::none();

        let err = store.load_mapping(&mut conn, &none).await.unwrap_err();
        assert_eq!(err, LedgerError::not_found("mapping"));

        let first: Mapping = serde_json::from_value(serde_json::json!({
            "contracts": [{"account": "users:*", "expr": {"gte": ["$balance", 0]}}]
        }))
        .unwrap();
        store.save_mapping(&mut conn, &first, &none).await.unwrap();
        assert_eq!(store.load_mapping(&mut conn, &none).await.unwrap(), first);

        let second = Mapping::default();
        store.save_mapping(&mut conn, &second, &none).await.unwrap();
        assert_eq!(store.load_mapping(&mut conn, &none).await.unwrap(), second);
    }

    #[tokio::test]
    async fn caller_owned_transaction_scopes_appends() {
        let (mut conn, store) = setup().await;
        let none = CancelSignal::none();

        {
            let mut tx = conn.begin().await.unwrap();
            store.append(&mut tx, transfer("world", "a", 1), &none).await.unwrap();
            tx.rollback().await.unwrap();
        }
        let total = store
            .count_transactions(&mut conn, &Default::default(), &none)
            .await
            .unwrap();
        assert_eq!(total, 0);

        {
            let mut tx = conn.begin().await.unwrap();
            store.append(&mut tx, transfer("world", "a", 1), &none).await.unwrap();
            tx.commit().await.unwrap();
        }
        let total = store
            .count_transactions(&mut conn, &Default::default(), &none)
            .await
            .unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn canceled_calls_surface_distinctly() {
        let (mut conn, store) = setup().await;
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let signal = CancelSignal::none().with_cancel(rx);

        let err = store
            .find_transactions(&mut conn, &TransactionsQuery::new(), &signal)
            .await
            .unwrap_err();
        match err {
            LedgerError::Storage(inner) => {
                assert_eq!(inner, StorageError::Canceled("find_transactions".into()));
                assert!(inner.is_cancellation());
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let expired = CancelSignal::none().with_deadline(tokio::time::Instant::now());
        let err = store
            .get_balances(&mut conn, &BalancesQuery::new(), &expired)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Storage(StorageError::DeadlineExceeded(_))
        ));
    }

    #[tokio::test]
    async fn postgres_filters_match_sqlite() {
        let Ok(url) = std::env::var("LEDGER_TEST_POSTGRES_URL") else {
            return;
        };
        sqlx::any::install_default_drivers();
        let mut conn = AnyConnection::connect(&url).await.unwrap();
        let store = Store::for_connection(&conn).unwrap();
        assert_eq!(store.dialect(), Dialect::Postgres);
        migrate(&mut conn, store.dialect()).await.unwrap();

        let none = CancelSignal::none();
        let suffix = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let alice = format!("it:{suffix}:alice");
        let bob = format!("it:{suffix}:bob");

        let mut tx = conn.begin().await.unwrap();
        store.append(&mut tx, transfer("world", &alice, 100), &none).await.unwrap();
        store.append(&mut tx, transfer(&alice, &bob, 30), &none).await.unwrap();
        store.append(&mut tx, transfer("world", "elsewhere", 1), &none).await.unwrap();

        let page = store
            .find_transactions(&mut tx, &TransactionsQuery::new().with_account(alice.as_str()), &none)
            .await
            .unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.total, Some(2));
        assert!(page.data[0].id > page.data[1].id);

        let balances = store
            .get_balances_aggregated(&mut tx, &[format!("^{alice}$")], &none)
            .await
            .unwrap();
        assert_eq!(balances.get("USD"), Some(&70));

        let carol = format!("it:{suffix}:carol");
        store.append(&mut tx, transfer("world", &carol, u64::MAX), &none).await.unwrap();
        let page = store
            .find_transactions(&mut tx, &TransactionsQuery::new().with_destination(carol.as_str()), &none)
            .await
            .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].postings[0].amount, u64::MAX);

        tx.rollback().await.unwrap();
    }
}
