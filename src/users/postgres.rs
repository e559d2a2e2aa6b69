use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use tracing::{info_span, instrument, Instrument};

use super::{NewUser, UserStore, UserStoreError};

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    #[instrument(skip(self))]
    async fn exists(&self, id: &str, email: &str) -> Result<bool, UserStoreError> {
        let found: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1 OR email = $2)")
                .bind(id)
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(found)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn insert(&self, user: &NewUser) -> Result<(), UserStoreError> {
        let query = r"
            INSERT INTO users (id, email, name, role, credential)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(user.role.as_str())
            .bind(user.credential.expose_secret())
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                if let sqlx::Error::Database(db) = &err {
                    if db.is_unique_violation() {
                        return UserStoreError::Conflict;
                    }
                }
                UserStoreError::Database(err)
            })?;
        Ok(())
    }
}
