use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{CreateSessionParams, RepoError, SessionsRepo};
use crate::domain::entities::SessionRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: i64,
    user_id: i64,
    username: String,
    prefix: String,
    hashed_secret: Vec<u8>,
    created_at: OffsetDateTime,
    revoked_at: Option<OffsetDateTime>,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            username: row.username,
            prefix: row.prefix,
            hashed_secret: row.hashed_secret,
            created_at: row.created_at,
            revoked_at: row.revoked_at,
        }
    }
}

#[async_trait]
impl SessionsRepo for PostgresRepositories {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, RepoError> {
        sqlx::query_as::<_, SessionRow>(
            r#"
            WITH inserted AS (
                INSERT INTO user_sessions (user_id, prefix, hashed_secret)
                VALUES ($1, $2, $3)
                RETURNING id, user_id, prefix, hashed_secret, created_at, revoked_at
            )
            SELECT i.id, i.user_id, u.username, i.prefix, i.hashed_secret, i.created_at, i.revoked_at
            FROM inserted i
            INNER JOIN users u ON u.id = i.user_id
            "#,
        )
        .bind(params.user_id)
        .bind(&params.prefix)
        .bind(&params.hashed_secret)
        .fetch_one(self.pool())
        .await
        .map(SessionRecord::from)
        .map_err(map_sqlx_error)
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<SessionRecord>, RepoError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT s.id, s.user_id, u.username, s.prefix, s.hashed_secret, s.created_at, s.revoked_at
            FROM user_sessions s
            INNER JOIN users u ON u.id = s.user_id
            WHERE s.prefix = $1
            "#,
        )
        .bind(prefix)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SessionRecord::from))
    }
}
