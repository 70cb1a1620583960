//! Account storage and password hashing.
//!
//! Passwords are stored as argon2 PHC strings. Only what the import surface
//! needs lives here: creating accounts from the CLI, and resolving them at
//! login and token verification.

use anyhow::{anyhow, bail, Context, Result};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use estate_harness_core::Role;

use crate::config::Config;
use crate::db;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub client_reference: Option<String>,
    #[serde(skip)]
    pub password_hash: String,
}

/// Input for [`create_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub client_reference: Option<String>,
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(user: &User, password: &str) -> bool {
    match PasswordHash::new(&user.password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(user_id = user.id, error = %e, "stored password hash is unreadable");
            false
        }
    }
}

pub async fn create_user(pool: &SqlitePool, new: &NewUser) -> Result<i64> {
    let email = new.email.trim().to_lowercase();
    if email.is_empty() {
        bail!("email must not be empty");
    }
    if new.password.is_empty() {
        bail!("password must not be empty");
    }

    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, role, client_reference, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.name.trim())
    .bind(&email)
    .bind(hash_password(&new.password)?)
    .bind(new.role.as_str())
    .bind(new.client_reference.as_deref().map(str::trim))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to create user {}", email))?;

    Ok(result.last_insert_rowid())
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        role: role.parse()?,
        client_reference: row.get("client_reference"),
        password_hash: row.get("password_hash"),
    })
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        "SELECT id, name, email, role, client_reference, password_hash FROM users WHERE email = ?",
    )
    .bind(email.trim().to_lowercase())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(row_to_user).transpose()
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(
        "SELECT id, name, email, role, client_reference, password_hash FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(row_to_user).transpose()
}

/// `estate user add`.
pub async fn run_user_add(config: &Config, new: &NewUser) -> Result<()> {
    if new.role == Role::Client && new.client_reference.is_none() {
        tracing::warn!(email = %new.email, "client account has no reference; its listings will not link");
    }
    let pool = db::connect(config).await?;
    let id = create_user(&pool, new).await?;
    pool.close().await;

    println!("user {} ({}) created with id {}", new.email.trim(), new.role, id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let user = User {
            id: 1,
            name: "Admin".to_string(),
            email: "admin@example.com".to_string(),
            role: Role::Master,
            client_reference: None,
            password_hash: hash_password("hunter2").unwrap(),
        };
        assert!(user.password_hash.starts_with("$argon2"));
        assert!(verify_password(&user, "hunter2"));
        assert!(!verify_password(&user, "hunter3"));
    }

    #[test]
    fn test_garbage_hash_never_verifies() {
        let user = User {
            id: 1,
            name: String::new(),
            email: String::new(),
            role: Role::Client,
            client_reference: None,
            password_hash: "not-a-phc-string".to_string(),
        };
        assert!(!verify_password(&user, "anything"));
    }

    #[test]
    fn test_hash_never_serialized() {
        let user = User {
            id: 7,
            name: "C".to_string(),
            email: "c@example.com".to_string(),
            role: Role::Client,
            client_reference: Some("AP01".to_string()),
            password_hash: "secret".to_string(),
        };
        let v = serde_json::to_value(&user).unwrap();
        assert!(v.get("password_hash").is_none());
        assert_eq!(v["role"], "client");
    }
}
