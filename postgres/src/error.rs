//! Mapping from sqlx errors to [`OrderStoreError`].

use billing_queue_core::order_store::OrderStoreError;

const NOT_NULL_VIOLATION: &str = "23502";
const CHECK_VIOLATION: &str = "23514";
const DATA_EXCEPTION_CLASS: &str = "22";

/// Classify a sqlx error by whether retrying the same order could succeed.
///
/// Constraint and data errors on the row itself are [`OrderStoreError::Rejected`].
/// Everything else (connection loss, pool timeout, serialization failures,
/// and unique violations, since a retry gets a fresh id) is
/// [`OrderStoreError::Unavailable`].
#[must_use]
#[allow(clippy::needless_pass_by_value)]
pub fn classify(error: sqlx::Error) -> OrderStoreError {
    let code = match &error {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    };

    match code.as_deref() {
        Some(code) if is_permanent(code) => OrderStoreError::Rejected(error.to_string()),
        _ => OrderStoreError::Unavailable(error.to_string()),
    }
}

fn is_permanent(sqlstate: &str) -> bool {
    sqlstate == NOT_NULL_VIOLATION
        || sqlstate == CHECK_VIOLATION
        || sqlstate.starts_with(DATA_EXCEPTION_CLASS)
}
