use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::User;
use crate::error::{AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::validation("email: invalid email format"));
    }
    Ok(email)
}

fn require_full_name(full_name: &str) -> AppResult<String> {
    let full_name = full_name.trim();
    if full_name.is_empty() {
        return Err(AppError::validation("full_name: this field is required"));
    }
    Ok(full_name.to_string())
}

/// Request body for user registration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

impl RegisterRequest {
    /// Normalizes the email and full name in place.
    pub fn validate(&mut self) -> AppResult<()> {
        self.email = normalize_email(&self.email)?;
        if self.password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(format!(
                "password: minimum length is {}",
                MIN_PASSWORD_LEN
            )));
        }
        self.full_name = require_full_name(&self.full_name)?;
        Ok(())
    }
}

/// Request body for login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&mut self) -> AppResult<()> {
        self.email = normalize_email(&self.email)?;
        if self.password.is_empty() {
            return Err(AppError::validation("password: this field is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileRequest {
    pub email: String,
    pub full_name: String,
}

impl UpdateProfileRequest {
    pub fn validate(&mut self) -> AppResult<()> {
        self.email = normalize_email(&self.email)?;
        self.full_name = require_full_name(&self.full_name)?;
        Ok(())
    }
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub uuid: Uuid,
    pub email: String,
    pub full_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub created_at_unix: i64,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            uuid: u.uuid,
            email: u.email,
            full_name: u.full_name,
            created_at: u.created_at,
            created_at_unix: u.created_at_unix,
        }
    }
}

/// Response returned after login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}
