use async_trait::async_trait;
use sqlx::PgPool;

/// Collaborator turning a bearer session token into the current user.
/// Core services never touch session storage directly.
#[async_trait]
pub trait CurrentUserResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Option<String>, anyhow::Error>;
}

#[derive(Clone)]
pub struct PgSessionResolver {
    conn: PgPool,
}

impl PgSessionResolver {
    pub fn new(conn: PgPool) -> Self {
        PgSessionResolver { conn }
    }
}

#[async_trait]
impl CurrentUserResolver for PgSessionResolver {
    async fn resolve(&self, token: &str) -> Result<Option<String>, anyhow::Error> {
        let user_id: Option<String> = sqlx::query_scalar(
            r#"SELECT user_id FROM sessions
            WHERE token = $1
            AND (expires_at IS NULL OR expires_at > CURRENT_TIMESTAMP)"#,
        )
        .bind(token)
        .fetch_optional(&self.conn)
        .await?;

        Ok(user_id)
    }
}
