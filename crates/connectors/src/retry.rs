use crate::error::{ConnectorError, DbError};
use mysql_async::Error as MySqlError;
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::Error as PgError;

/// Indicates whether an error should be retried or treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Backoff schedule for a connection manager: up to `max_attempts` per
/// query, sleeping `base_delay * 2^(attempt-1)` between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_queries()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: if max_delay.is_zero() {
                base_delay
            } else {
                max_delay
            },
        }
    }

    /// The schedule every connection manager runs with: three attempts,
    /// one second of backoff doubling per retry.
    pub fn for_queries() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Delay before retry number `attempt + 1` (zero-based).
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::from_millis(0);
        }

        let factor = 1u128 << attempt.min(6);
        let base_ms = self.base_delay.as_millis();
        let delay_ms = base_ms.saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}

pub fn classify_db_error(err: &DbError) -> RetryDisposition {
    match err {
        DbError::Io(_) => RetryDisposition::Retry,
        DbError::MySql(mysql_err) => classify_mysql_error(mysql_err),
        DbError::Pg(pg_err) => classify_pg_error(pg_err),
        DbError::Connection(conn_err) => classify_connector_error(conn_err),
        DbError::RetriesExhausted { .. } => RetryDisposition::Stop,
        DbError::Decode(_) => RetryDisposition::Stop,
        DbError::Write(_) => RetryDisposition::Stop,
    }
}

fn classify_connector_error(err: &ConnectorError) -> RetryDisposition {
    match err {
        ConnectorError::MySql(mysql_err) => classify_mysql_error(mysql_err),
        ConnectorError::Pg(pg_err) => classify_pg_error(pg_err),
        ConnectorError::TlsConfig(_) => RetryDisposition::Retry,
        ConnectorError::InvalidParameter(_) => RetryDisposition::Stop,
        ConnectorError::Config(_) => RetryDisposition::Stop,
    }
}

pub fn classify_pg_error(err: &PgError) -> RetryDisposition {
    if err.is_closed() {
        return RetryDisposition::Retry;
    }

    if let Some(code) = err.code()
        && is_retryable_pg_code(code)
    {
        return RetryDisposition::Retry;
    }

    RetryDisposition::Stop
}

fn is_retryable_pg_code(code: &SqlState) -> bool {
    matches!(
        *code,
        SqlState::T_R_SERIALIZATION_FAILURE
            | SqlState::T_R_DEADLOCK_DETECTED
            | SqlState::LOCK_NOT_AVAILABLE
            | SqlState::TOO_MANY_CONNECTIONS
            | SqlState::ADMIN_SHUTDOWN
            | SqlState::CRASH_SHUTDOWN
            | SqlState::CANNOT_CONNECT_NOW
            | SqlState::CONNECTION_FAILURE
            | SqlState::CONNECTION_DOES_NOT_EXIST
            | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
            | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION
            | SqlState::CONNECTION_EXCEPTION
            | SqlState::QUERY_CANCELED
            | SqlState::OPERATOR_INTERVENTION
    )
}

pub fn classify_mysql_error(err: &MySqlError) -> RetryDisposition {
    match err {
        MySqlError::Io(_) | MySqlError::Other(_) => RetryDisposition::Retry,
        MySqlError::Driver(_) => RetryDisposition::Retry,
        MySqlError::Server(server_err) => {
            if is_retryable_mysql_server_error(server_err.code, server_err.state.as_str()) {
                RetryDisposition::Retry
            } else {
                RetryDisposition::Stop
            }
        }
        _ => RetryDisposition::Stop,
    }
}

/// Transient MySQL/MariaDB server errors: lock wait timeout (1205),
/// deadlock (1213), connection refused/lost (2002, 2003, 2006, 2013),
/// too many connections (1040, 1042).
/// See: https://dev.mysql.com/doc/mysql-errors/8.0/en/server-error-reference.html
fn is_retryable_mysql_server_error(code: u16, state: &str) -> bool {
    const RETRYABLE_CODES: [u16; 8] = [1205, 1213, 2002, 2003, 2006, 2013, 1040, 1042];
    if RETRYABLE_CODES.contains(&code) {
        return true;
    }

    matches!(state, "40001" | "HYT00" | "08S01")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_one_second() {
        let policy = RetryPolicy::for_queries();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(policy.backoff_delay(9), Duration::from_secs(5));
    }

    #[test]
    fn deadlock_and_lock_wait_are_retryable() {
        assert!(is_retryable_mysql_server_error(1213, "40001"));
        assert!(is_retryable_mysql_server_error(1205, "HY000"));
        assert!(is_retryable_mysql_server_error(2013, "HY000"));
        assert!(!is_retryable_mysql_server_error(1064, "42000"));
    }

    #[test]
    fn terminal_errors_stop() {
        let err = DbError::Decode("bad row".to_string());
        assert_eq!(classify_db_error(&err), RetryDisposition::Stop);
        let err = DbError::Write("constraint".to_string());
        assert_eq!(classify_db_error(&err), RetryDisposition::Stop);
    }

    #[test]
    fn io_errors_retry() {
        let err = DbError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert_eq!(classify_db_error(&err), RetryDisposition::Retry);
    }
}
