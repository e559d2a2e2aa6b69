//! Postgres-backed code store.
//!
//! One row per identity in `otp_codes`. `update` runs inside a transaction
//! and locks the row with `SELECT ... FOR UPDATE`, which serializes concurrent
//! verifications of the same identity across processes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{postgres::PgRow, FromRow, PgPool, Row};
use tracing::{info_span, instrument, Instrument};

use super::store::{CodeStore, Decide, StoreError, Write};
use super::{PendingCode, Verification};

#[derive(Clone, Debug)]
pub struct PgCodeStore {
    pool: PgPool,
}

impl PgCodeStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct CodeRow {
    identity: String,
    code: String,
    issued_at: DateTime<Utc>,
    consumed: bool,
    attempt_count: i32,
}

impl<'r> FromRow<'r, PgRow> for CodeRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            identity: row.try_get("identity")?,
            code: row.try_get("code")?,
            issued_at: row.try_get("issued_at")?,
            consumed: row.try_get("consumed")?,
            attempt_count: row.try_get("attempt_count")?,
        })
    }
}

impl TryFrom<CodeRow> for PendingCode {
    type Error = StoreError;

    fn try_from(row: CodeRow) -> Result<Self, Self::Error> {
        let attempt_count = u32::try_from(row.attempt_count).map_err(|_| {
            StoreError::Corrupt(format!(
                "negative attempt_count {} for {}",
                row.attempt_count, row.identity
            ))
        })?;
        Ok(Self {
            identity: row.identity,
            code: SecretString::from(row.code),
            issued_at: row.issued_at,
            consumed: row.consumed,
            attempt_count,
        })
    }
}

const DELETE_BY_IDENTITY: &str = "DELETE FROM otp_codes WHERE identity = $1";

fn delete_span() -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = DELETE_BY_IDENTITY
    )
}

fn attempts_to_db(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

async fn upsert<'e, E>(executor: E, entry: &PendingCode) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let query = r"
        INSERT INTO otp_codes (identity, code, issued_at, consumed, attempt_count)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (identity) DO UPDATE
        SET code = EXCLUDED.code,
            issued_at = EXCLUDED.issued_at,
            consumed = EXCLUDED.consumed,
            attempt_count = EXCLUDED.attempt_count
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(&entry.identity)
        .bind(entry.code.expose_secret())
        .bind(entry.issued_at)
        .bind(entry.consumed)
        .bind(attempts_to_db(entry.attempt_count))
        .execute(executor)
        .instrument(span)
        .await?;
    Ok(())
}

#[async_trait]
impl CodeStore for PgCodeStore {
    #[instrument(skip(self, entry), fields(identity = %entry.identity))]
    async fn put(&self, entry: PendingCode) -> Result<(), StoreError> {
        upsert(&self.pool, &entry).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, identity: &str) -> Result<Option<PendingCode>, StoreError> {
        let query =
            "SELECT identity, code, issued_at, consumed, attempt_count FROM otp_codes WHERE identity = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query_as::<_, CodeRow>(query)
            .bind(identity)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        row.map(PendingCode::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn delete(&self, identity: &str) -> Result<bool, StoreError> {
        let span = delete_span();
        let result = sqlx::query(DELETE_BY_IDENTITY)
            .bind(identity)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, decide))]
    async fn update(
        &self,
        identity: &str,
        decide: &Decide<'_>,
    ) -> Result<Option<Verification>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let query = r"
            SELECT identity, code, issued_at, consumed, attempt_count
            FROM otp_codes
            WHERE identity = $1
            FOR UPDATE
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query_as::<_, CodeRow>(query)
            .bind(identity)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await?;

        let Some(row) = row else {
            // Nothing locked; release the transaction.
            tx.rollback().await?;
            return Ok(None);
        };

        let entry = PendingCode::try_from(row)?;
        let decision = decide(&entry);
        match &decision.write {
            Write::Keep => {}
            Write::Replace(updated) => upsert(&mut *tx, updated).await?,
            Write::Remove => {
                let span = delete_span();
                sqlx::query(DELETE_BY_IDENTITY)
                    .bind(identity)
                    .execute(&mut *tx)
                    .instrument(span)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(Some(decision.outcome))
    }

    #[instrument(skip(self))]
    async fn purge(
        &self,
        expired_before: DateTime<Utc>,
        consumed_before: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let query = r"
            DELETE FROM otp_codes
            WHERE (consumed = FALSE AND issued_at < $1)
               OR (consumed = TRUE AND issued_at < $2)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(expired_before)
            .bind(consumed_before)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_conversion_rejects_negative_attempts() {
        let row = CodeRow {
            identity: "heidi@example.com".to_string(),
            code: "123456".to_string(),
            issued_at: Utc::now(),
            consumed: false,
            attempt_count: -1,
        };
        assert!(matches!(
            PendingCode::try_from(row),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn row_conversion_keeps_state() {
        let issued_at = Utc::now();
        let row = CodeRow {
            identity: "ivan@example.com".to_string(),
            code: "123456".to_string(),
            issued_at,
            consumed: true,
            attempt_count: 2,
        };
        let entry = PendingCode::try_from(row);
        assert!(entry.is_ok());
        if let Ok(entry) = entry {
            assert_eq!(entry.identity, "ivan@example.com");
            assert_eq!(entry.code.expose_secret(), "123456");
            assert_eq!(entry.issued_at, issued_at);
            assert!(entry.consumed);
            assert_eq!(entry.attempt_count, 2);
        }
    }

    #[test]
    fn delete_runs_in_a_query_span() {
        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            let span = delete_span();
            let metadata = span.metadata();
            assert_eq!(metadata.map(tracing::Metadata::name), Some("db.query"));
            assert!(metadata.is_some_and(|m| m.fields().field("db.statement").is_some()));
        });
    }

    #[test]
    fn attempts_saturate_on_overflow() {
        assert_eq!(attempts_to_db(3), 3);
        assert_eq!(attempts_to_db(u32::MAX), i32::MAX);
    }
}
