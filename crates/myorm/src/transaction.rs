//! Transaction helper macro.
//!
//! A transaction lives on one [`Connection`]: statements run through builders
//! bound to that connection take part in it. For ergonomic commit/rollback
//! handling, use the [`transaction!`] macro.
//!
//! # Example
//!
//! ```ignore
//! let conn = db.get_connection(None)?;
//! myorm::transaction!(&conn, {
//!     let mut q = db.table("accounts")?;
//!     q.update(params! { "balance" => 0 }, None).where_(params! { "id" => 1 });
//!     q.exec().await?;
//!     Ok::<(), myorm::DbError>(())
//! })?;
//! ```

use crate::connection::Connection;
use crate::driver::Driver;
use crate::error::DbResult;

/// Runs the given block inside a transaction on a [`Connection`].
///
/// - Begins with `Connection::begin_transaction`; a failure there skips the block.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)` and returns the block's error.
///
/// The block must evaluate to `myorm::DbResult<T>`, and so does the macro.
#[macro_export]
macro_rules! transaction {
    ($conn:expr, $body:block) => {{
        let __myorm_conn = $conn;
        match __myorm_conn.begin_transaction().await {
            Ok(()) => {
                let __myorm_tx_body_result = async { $body }.await;
                $crate::transaction::finish(__myorm_conn, __myorm_tx_body_result).await
            }
            Err(error) => Err(error),
        }
    }};
}

/// Commit after `Ok`, roll back after `Err`.
///
/// A failed rollback is logged and the original error is returned.
#[doc(hidden)]
pub async fn finish<D: Driver, T>(conn: &Connection<D>, result: DbResult<T>) -> DbResult<T> {
    match result {
        Ok(value) => {
            conn.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_err) = conn.rollback().await {
                tracing::warn!(
                    alias = %conn.alias(),
                    error = %error,
                    rollback_error = %rollback_err,
                    "rollback failed"
                );
            }
            Err(error)
        }
    }
}
