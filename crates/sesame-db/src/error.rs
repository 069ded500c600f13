use thiserror::Error;

/// A write hit a uniqueness constraint. Carried inside `anyhow::Error` so
/// callers can recover it with `downcast_ref`.
#[derive(Debug, Error)]
#[error("duplicate key violates unique constraint {constraint}")]
pub struct DuplicateKey {
    pub constraint: String,
}

/// Map a unique violation to [`DuplicateKey`], pass anything else through.
pub(crate) fn classify(err: sqlx::Error, context: &'static str) -> anyhow::Error {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return DuplicateKey {
                constraint: db_err.constraint().unwrap_or("unknown").to_string(),
            }
            .into();
        }
    }
    anyhow::Error::new(err).context(context)
}
