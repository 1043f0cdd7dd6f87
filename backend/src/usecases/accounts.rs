use super::{require_admin, require_user, UseCaseError, UseCaseResult};
use crate::auth::{hash_password, verify_password, SessionStore};
use crate::repository::UserRepository;
use noticeboard_core::validation::{validate_credentials, validate_registration};
use noticeboard_core::{User, UserChange, UserRole};
use tracing::{info, warn};

const INVALID_LOGIN: &str = "Invalid username or password";

/// Registration fields
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub name: String,
    pub surname: String,
    pub mobile_number: String,
}

/// A logged-in user and the bearer token for the session
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: User,
}

/// Account and session use-cases
#[derive(Clone)]
pub struct AccountUseCases {
    users: UserRepository,
    sessions: SessionStore,
}

impl AccountUseCases {
    pub fn new(users: UserRepository, sessions: SessionStore) -> Self {
        Self { users, sessions }
    }

    /// Create an account and log it in.
    ///
    /// The first account on an empty store becomes an administrator.
    pub async fn register(&self, registration: Registration) -> UseCaseResult<Session> {
        let Registration {
            username,
            password,
            name,
            surname,
            mobile_number,
        } = registration;
        validate_registration(&username, &password, &name, &surname, &mobile_number)?;

        // Fast path for the common duplicate; the store re-checks atomically
        if self.users.get_user_by_username(&username).await?.is_some() {
            return Err(noticeboard_core::Error::UsernameTaken.into());
        }

        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| UseCaseError::Storage(e.to_string()))?
            .map_err(|e| UseCaseError::Storage(e.to_string()))?;

        let user = User::new(username, password_hash, name, surname, mobile_number);
        let user = self.users.register_user(user).await?;
        info!(user_id = %user.id, role = ?user.role, "Registered user");
        self.open_session(user)
    }

    pub async fn login(&self, username: &str, password: &str) -> UseCaseResult<Session> {
        validate_credentials(username, password)?;

        let Some(user) = self.users.get_user_by_username(username).await? else {
            return Err(UseCaseError::InvalidArgument(INVALID_LOGIN.to_string()));
        };

        let password = password.to_string();
        let stored = user.password.clone();
        let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
            .await
            .map_err(|e| UseCaseError::Storage(e.to_string()))?;
        if !verified {
            warn!(user_id = %user.id, "Rejected login");
            return Err(UseCaseError::InvalidArgument(INVALID_LOGIN.to_string()));
        }

        info!(user_id = %user.id, "User logged in");
        self.open_session(user)
    }

    /// End a session. Unknown tokens are ignored.
    pub fn logout(&self, token: &str) {
        if self.sessions.revoke(token) {
            info!("User logged out");
        }
    }

    /// User behind a session token, looked up in the active store.
    pub async fn current_user(&self, token: &str) -> Option<User> {
        let user_id = self.sessions.resolve(token)?;
        self.users.get_user_by_id(&user_id).await
    }

    /// Promote `username` to administrator.
    pub async fn make_admin(&self, username: &str, acting: Option<&User>) -> UseCaseResult<User> {
        require_admin(acting, "Only administrators can promote users")?;

        let user = self
            .users
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| UseCaseError::NotFound("User not found".to_string()))?;

        let user = self
            .users
            .change_user(&user.id, UserChange::Role(UserRole::Admin))
            .await?;
        info!(user_id = %user.id, "Promoted user to administrator");
        Ok(user)
    }

    /// Store the device push token reported by the client. `None` clears it.
    pub async fn update_push_token(
        &self,
        token: Option<String>,
        acting: Option<&User>,
    ) -> UseCaseResult<User> {
        let user = require_user(acting)?;
        let token = token.filter(|t| !t.trim().is_empty());
        Ok(self
            .users
            .change_user(&user.id, UserChange::PushToken(token))
            .await?)
    }

    pub async fn set_notifications_enabled(
        &self,
        enabled: bool,
        acting: Option<&User>,
    ) -> UseCaseResult<User> {
        let user = require_user(acting)?;
        Ok(self
            .users
            .change_user(&user.id, UserChange::NotificationsEnabled(enabled))
            .await?)
    }

    fn open_session(&self, user: User) -> UseCaseResult<Session> {
        let token = self
            .sessions
            .issue(&user.id)
            .map_err(|e| UseCaseError::Storage(e.to_string()))?;
        Ok(Session { token, user })
    }
}
