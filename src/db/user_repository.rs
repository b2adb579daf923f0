//! User repository

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{parse_db_timestamp, parse_db_uuid, RoleRepository};
use crate::models::{ResolvedUser, User};

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    organization_id: String,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

fn row_to_user(row: UserRow) -> Result<User> {
    Ok(User {
        id: parse_db_uuid(&row.id)?,
        organization_id: parse_db_uuid(&row.organization_id)?,
        username: row.username,
        email: row.email,
        password_hash: row.password_hash,
        role: row.role,
        is_active: row.is_active,
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    })
}

const USER_COLUMNS: &str =
    "id, organization_id, username, email, password_hash, role, is_active, created_at, updated_at";

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(self.pool)
            .await
            .context("Failed to fetch user by id")?;

        row.map(row_to_user).transpose()
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(self.pool)
            .await
            .context("Failed to fetch user by username")?;

        row.map(row_to_user).transpose()
    }

    pub async fn create(&self, user: &User) -> Result<User> {
        sqlx::query(
            r#"
            INSERT INTO users (id, organization_id, username, email, password_hash, role,
                is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(user.organization_id.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(user.is_active)
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(self.pool)
        .await
        .context("Failed to insert user")?;

        Ok(user.clone())
    }

    /// Load a user with their role's permission matrix resolved
    pub async fn resolve(&self, id: Uuid) -> Result<Option<ResolvedUser>> {
        let Some(user) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let roles = RoleRepository::new(self.pool);
        let (permissions, role_display_name) = roles
            .permissions_for(user.organization_id, &user.role)
            .await?;

        Ok(Some(ResolvedUser {
            user,
            role_display_name,
            permissions,
        }))
    }
}
