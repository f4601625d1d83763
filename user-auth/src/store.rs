//! PostgreSQL-backed persistence for users, refresh tokens, and addresses.
//!
//! Unlike the catalog services, user accounts are plain relational state,
//! not an event-sourced aggregate: there's no downstream consumer that
//! needs a replayable history of profile edits, so CRUD against
//! `sqlx::query!`-checked tables is the simpler, more honest fit (the same
//! judgment call that put `cart` on direct mutable storage instead of a
//! `Reducer`).

use crate::error::AuthError;
use crate::types::{Address, User, UserId, UserRole};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL repository for the user/auth service's own tables.
#[derive(Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
}

fn parse_role(raw: &str) -> UserRole {
    if raw.eq_ignore_ascii_case("admin") {
        UserRole::Admin
    } else {
        UserRole::Customer
    }
}

impl PostgresUserStore {
    /// Connects to `database_url` and returns a new store.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection pool cannot be established.
    pub async fn new(database_url: &str) -> Result<Self, AuthError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Runs pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if any migration fails to apply.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(Into::into)
    }

    // ── Users ──────────────────────────────────────────────────────────

    /// Creates a new user with an already-hashed password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::EmailAlreadyExists` on a unique-email conflict,
    /// `AuthError::Database` for any other failure.
    pub async fn create_user(&self, email: &str, name: &str, password_hash: &str) -> Result<User, AuthError> {
        let user_id = UserId::generate();
        let now = Utc::now();

        let result = sqlx::query!(
            r#"
            INSERT INTO users (user_id, email, name, password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'customer', $5, $5)
            "#,
            user_id.0,
            email,
            name,
            password_hash,
            now,
        )
        .execute(&self.pool)
        .await;

        if let Err(sqlx::Error::Database(ref db_error)) = result {
            if db_error.is_unique_violation() {
                return Err(AuthError::EmailAlreadyExists);
            }
        }
        result?;

        Ok(User { user_id, email: email.to_string(), name: name.to_string(), role: UserRole::Customer, created_at: now, updated_at: now })
    }

    /// Fetches a user and their password hash by email, for login.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if no account matches (kept
    /// indistinguishable from a wrong password at the handler level).
    pub async fn get_user_with_password_by_email(&self, email: &str) -> Result<(User, String), AuthError> {
        let row = sqlx::query!(
            r#"
            SELECT user_id, email, name, password_hash, role, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
            email
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

        let user = User {
            user_id: UserId(row.user_id),
            email: row.email,
            name: row.name,
            role: parse_role(&row.role),
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        Ok((user, row.password_hash))
    }

    /// Fetches a user by id.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if no such user exists.
    pub async fn get_user_by_id(&self, user_id: UserId) -> Result<User, AuthError> {
        let row = sqlx::query!(
            r#"
            SELECT user_id, email, name, role, created_at, updated_at
            FROM users
            WHERE user_id = $1
            "#,
            user_id.0
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::UserNotFound)?;

        Ok(User {
            user_id: UserId(row.user_id),
            email: row.email,
            name: row.name,
            role: parse_role(&row.role),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    /// Updates a user's display name.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if no such user exists.
    pub async fn update_name(&self, user_id: UserId, name: &str) -> Result<User, AuthError> {
        let now = Utc::now();
        let result = sqlx::query!(
            r#"
            UPDATE users
            SET name = $2, updated_at = $3
            WHERE user_id = $1
            "#,
            user_id.0,
            name,
            now,
        )
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }

        self.get_user_by_id(user_id).await
    }

    // ── Refresh tokens ─────────────────────────────────────────────────

    /// Stores a newly issued refresh token's hash.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Database` on failure.
    pub async fn store_refresh_token(&self, user_id: UserId, token_hash: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError> {
        sqlx::query!(
            r#"
            INSERT INTO refresh_tokens (token_id, user_id, token_hash, issued_at, expires_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5, NULL)
            "#,
            Uuid::new_v4(),
            user_id.0,
            token_hash,
            Utc::now(),
            expires_at,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Looks up a live (unexpired, unrevoked) refresh token by its hash and
    /// atomically revokes it, so the caller can safely mint a replacement
    /// without a second token validating against the same record.
    ///
    /// # Errors
    ///
    /// `AuthError::InvalidRefreshToken` if no record matches the hash at
    /// all; `AuthError::RefreshTokenRevoked` if it matched but was already
    /// revoked or has expired.
    pub async fn consume_refresh_token(&self, token_hash: &str) -> Result<UserId, AuthError> {
        let row = sqlx::query!(
            r#"
            SELECT user_id, expires_at, revoked_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
            token_hash
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::InvalidRefreshToken)?;

        if row.revoked_at.is_some() || row.expires_at < Utc::now() {
            return Err(AuthError::RefreshTokenRevoked);
        }

        sqlx::query!(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE token_hash = $1
            "#,
            token_hash,
            Utc::now(),
        )
        .execute(&self.pool)
        .await?;

        Ok(UserId(row.user_id))
    }

    /// Revokes a refresh token by its hash. Idempotent: revoking an
    /// already-revoked or unknown token is not an error, matching
    /// `logout`'s best-effort semantics.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Database` on failure.
    pub async fn revoke_refresh_token(&self, token_hash: &str) -> Result<(), AuthError> {
        sqlx::query!(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = COALESCE(revoked_at, $2)
            WHERE token_hash = $1
            "#,
            token_hash,
            Utc::now(),
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ── Addresses ──────────────────────────────────────────────────────

    /// Lists every address belonging to a user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Database` on failure.
    pub async fn list_addresses(&self, user_id: UserId) -> Result<Vec<Address>, AuthError> {
        let rows = sqlx::query!(
            r#"
            SELECT address_id, user_id, label, line1, line2, city, state, postal_code, country, is_default
            FROM addresses
            WHERE user_id = $1
            ORDER BY is_default DESC, label
            "#,
            user_id.0
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Address {
                address_id: row.address_id,
                user_id: UserId(row.user_id),
                label: row.label,
                line1: row.line1,
                line2: row.line2,
                city: row.city,
                state: row.state,
                postal_code: row.postal_code,
                country: row.country,
                is_default: row.is_default,
            })
            .collect())
    }

    /// Creates a new address. If `is_default`, clears the flag on every
    /// other address this user owns first, so at most one stays default.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Database` on failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_address(
        &self,
        user_id: UserId,
        label: &str,
        line1: &str,
        line2: Option<&str>,
        city: &str,
        state: &str,
        postal_code: &str,
        country: &str,
        is_default: bool,
    ) -> Result<Address, AuthError> {
        let address_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        if is_default {
            sqlx::query!("UPDATE addresses SET is_default = false WHERE user_id = $1", user_id.0)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query!(
            r#"
            INSERT INTO addresses
                (address_id, user_id, label, line1, line2, city, state, postal_code, country, is_default)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
            address_id,
            user_id.0,
            label,
            line1,
            line2,
            city,
            state,
            postal_code,
            country,
            is_default,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Address {
            address_id,
            user_id,
            label: label.to_string(),
            line1: line1.to_string(),
            line2: line2.map(str::to_string),
            city: city.to_string(),
            state: state.to_string(),
            postal_code: postal_code.to_string(),
            country: country.to_string(),
            is_default,
        })
    }

    /// Deletes an address owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AddressNotFound` if no such address exists for
    /// this user.
    pub async fn delete_address(&self, user_id: UserId, address_id: Uuid) -> Result<(), AuthError> {
        let result = sqlx::query!(
            "DELETE FROM addresses WHERE address_id = $1 AND user_id = $2",
            address_id,
            user_id.0,
        )
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::AddressNotFound);
        }
        Ok(())
    }
}
