use sea_orm::{DatabaseConnection, DbErr};

use crate::{EngineError, ResultEngine};

mod access;
mod balances;
mod users;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// Re-run a mutating operation while the store reports transient contention
/// (deadlock, busy writer, stale read snapshot). The whole transaction is
/// retried, so each attempt re-reads fresh state under its own locks. After
/// [`MAX_TX_ATTEMPTS`] the failure surfaces as [`EngineError::Conflict`].
macro_rules! retry_contention {
    ($body:expr) => {{
        let mut attempts = 0u32;
        loop {
            match $body {
                Err($crate::EngineError::Database(err))
                    if $crate::ops::is_contention(&err) =>
                {
                    attempts += 1;
                    if attempts >= $crate::ops::MAX_TX_ATTEMPTS {
                        break Err($crate::EngineError::Conflict(
                            "store contention, retry the operation".to_string(),
                        ));
                    }
                }
                other => break other,
            }
        }
    }};
}

pub(crate) use retry_contention;

/// Upper bound on transparent in-engine retries of a contended transaction.
pub(crate) const MAX_TX_ATTEMPTS: u32 = 8;

/// Store-level failures that are safe to retry with a fresh transaction.
///
/// Deterministic lock ordering removes the two-account transfer deadlock,
/// but the store can still abort a transaction under internal contention
/// (sqlite busy/snapshot errors, backend deadlock detection).
pub(crate) fn is_contention(err: &DbErr) -> bool {
    let text = err.to_string().to_ascii_lowercase();
    text.contains("database is locked")
        || text.contains("database is busy")
        || text.contains("deadlock")
        || text.contains("snapshot")
}

pub(crate) fn validate_amount(amount_minor: i64) -> ResultEngine<()> {
    if amount_minor <= 0 {
        return Err(EngineError::InvalidAmount(
            "amount must be > 0 minor units".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidAmount(format!(
            "{label} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
        })
    }
}
