//! Bounded retry of transient connection failures.

use tracing::warn;

use super::backend::SqlConnection;
use super::DbError;

/// Default number of retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Run `op`, retrying up to `max_retries` times when it fails with a transient
/// error and reconnecting between attempts.
///
/// Non-transient errors and the final transient error are returned unchanged.
pub fn with_retry<T>(
    conn: &dyn SqlConnection,
    max_retries: u32,
    mut op: impl FnMut(&dyn SqlConnection) -> Result<T, DbError>,
) -> Result<T, DbError> {
    let mut attempt = 0;
    loop {
        match op(conn) {
            Err(e) if e.is_transient() && attempt < max_retries => {
                attempt += 1;
                warn!(attempt, max_retries, error = %e, "Transient database error, retrying");
                conn.reconnect()?;
            }
            other => return other,
        }
    }
}
