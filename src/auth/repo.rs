use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: NewUser) -> AppResult<User>;
    async fn find_by_email(&self, email: &str) -> AppResult<User>;
    async fn find_by_id(&self, id: i64) -> AppResult<User>;
    async fn find_by_uuid(&self, uuid: &str) -> AppResult<User>;
    /// Persists email and full name; everything else on `user` is ignored.
    async fn update(&self, user: &User) -> AppResult<User>;
}

const USER_COLUMNS: &str = "id, uuid, email, password_hash, full_name, created_at, updated_at, \
                            created_at_unix, updated_at_unix";

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_one<T>(&self, column: &str, value: T) -> AppResult<User>
    where
        T: Send + for<'q> sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| AppError::store("find user", e))?
            .ok_or(AppError::NotFound("user"))
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn create(&self, user: NewUser) -> AppResult<User> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let sql = format!(
            r#"
            INSERT INTO users (email, password_hash, full_name, created_at_unix, updated_at_unix)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.full_name)
            .bind(now)
            .fetch_one(&self.db)
            .await
            .map_err(|e| AppError::store_unique("create user", e, "email already registered"))
    }

    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> AppResult<User> {
        self.find_one("email", email).await
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<User> {
        self.find_one("id", id).await
    }

    #[instrument(skip(self))]
    async fn find_by_uuid(&self, uuid: &str) -> AppResult<User> {
        let uuid = Uuid::parse_str(uuid)
            .map_err(|e| AppError::validation(format!("invalid uuid: {}", e)))?;
        self.find_one("uuid", uuid).await
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    async fn update(&self, user: &User) -> AppResult<User> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let sql = format!(
            r#"
            UPDATE users
               SET email = $1, full_name = $2, updated_at = NOW(), updated_at_unix = $3
             WHERE id = $4
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.email)
            .bind(&user.full_name)
            .bind(now)
            .bind(user.id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| AppError::store_unique("update user", e, "email already registered"))?
            .ok_or(AppError::NotFound("user"))
    }
}
