use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::auth::{
    dto::{LoginRequest, RegisterRequest, UpdateProfileRequest},
    jwt::JwtKeys,
    password::CredentialHasher,
    repo::UserRepository,
    repo_types::{NewUser, User},
};
use crate::error::{AppError, AppResult};

/// Registration, login and profile operations.
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    hasher: CredentialHasher,
    keys: JwtKeys,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, hasher: CredentialHasher, keys: JwtKeys) -> Self {
        Self {
            users,
            hasher,
            keys,
        }
    }

    #[instrument(skip(self, req))]
    pub async fn register(&self, mut req: RegisterRequest) -> AppResult<User> {
        req.validate()?;

        // Advisory only: the unique index on users.email is what actually
        // guards against a concurrent registration slipping through.
        match self.users.find_by_email(&req.email).await {
            Ok(_) => {
                warn!(email = %req.email, "email already registered");
                return Err(AppError::AlreadyExists("email already registered".into()));
            }
            Err(AppError::NotFound(_)) => {}
            Err(e) => warn!(error = %e, "email pre-check failed"),
        }

        let password_hash = self.hasher.hash(&req.password)?;
        let user = self
            .users
            .create(NewUser {
                email: req.email,
                password_hash,
                full_name: req.full_name,
            })
            .await?;

        info!(user_id = user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Unknown email and wrong password produce the same `InvalidCredentials`.
    #[instrument(skip(self, req))]
    pub async fn login(&self, mut req: LoginRequest) -> AppResult<(String, User)> {
        req.validate()?;

        let user = match self.users.find_by_email(&req.email).await {
            Ok(u) => u,
            Err(AppError::NotFound(_)) => {
                warn!(email = %req.email, "login unknown email");
                return Err(AppError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        if !self.hasher.verify(&req.password, &user.password_hash)? {
            warn!(user_id = user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        let token = self.keys.sign(user.id, &user.email)?;
        info!(user_id = user.id, "user logged in");
        Ok((token, user))
    }

    #[instrument(skip(self))]
    pub async fn get_user_by_id(&self, id: i64) -> AppResult<User> {
        self.users.find_by_id(id).await
    }

    #[instrument(skip(self, req))]
    pub async fn update_profile(&self, user_id: i64, mut req: UpdateProfileRequest) -> AppResult<User> {
        req.validate()?;
        let mut user = self.users.find_by_id(user_id).await?;
        user.email = req.email;
        user.full_name = req.full_name;
        let user = self.users.update(&user).await?;
        info!(user_id = user.id, "profile updated");
        Ok(user)
    }
}
