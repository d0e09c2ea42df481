use axum::{
    Router,
    routing::get,
};

pub mod balances;
pub mod mapping;
pub mod system;
pub mod transactions;

/// Router for every ledger endpoint.
pub fn router() -> Router {
    Router::new()
        .route(
            "/transactions",
            get(transactions::list_transactions).post(transactions::append_transaction),
        )
        .route("/transactions/:id", get(transactions::get_transaction))
        .route("/balances", get(balances::list_balances))
        .route("/aggregate/balances", get(balances::aggregate_balances))
        .route("/mapping", get(mapping::load_mapping).put(mapping::save_mapping))
}
