use sqlx::SqlitePool;
use time::OffsetDateTime;

pub use crate::auth::repo_types::{User, UserProfile, UserUpdate};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

fn unique_violation_as_duplicate(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateEmail,
        _ => StoreError::Database(err),
    }
}

impl User {
    /// Find a user by email, including the password hash. Emails compare literally.
    pub async fn find_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, is_admin, created_at
            FROM users
            WHERE email = ?1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &SqlitePool, id: i64) -> Result<Option<UserProfile>, StoreError> {
        let user = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, email, is_admin, created_at
            FROM users
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new user. The email uniqueness constraint is enforced by the database.
    pub async fn insert(
        db: &SqlitePool,
        email: &str,
        password_hash: &str,
        is_admin: bool,
    ) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, is_admin, created_at)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id, email, password_hash, is_admin, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(is_admin)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(db)
        .await
        .map_err(unique_violation_as_duplicate)
    }

    /// Write only the columns present in `changes`.
    pub async fn update(
        db: &SqlitePool,
        id: i64,
        changes: &UserUpdate,
    ) -> Result<UserProfile, StoreError> {
        sqlx::query_as::<_, UserProfile>(
            r#"
            UPDATE users
            SET email = COALESCE(?1, email),
                password_hash = COALESCE(?2, password_hash)
            WHERE id = ?3
            RETURNING id, email, is_admin, created_at
            "#,
        )
        .bind(changes.email.as_deref())
        .bind(changes.password_hash.as_deref())
        .bind(id)
        .fetch_optional(db)
        .await
        .map_err(unique_violation_as_duplicate)?
        .ok_or(StoreError::NotFound)
    }

    pub async fn list_all(db: &SqlitePool) -> Result<Vec<UserProfile>, StoreError> {
        let rows = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, email, is_admin, created_at
            FROM users
            ORDER BY id ASC
            "#,
        )
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn admin_exists(db: &SqlitePool) -> Result<bool, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE is_admin = 1 LIMIT 1")
            .fetch_optional(db)
            .await?;
        Ok(row.is_some())
    }
}
