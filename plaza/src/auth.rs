use plaza_types::{LoginRequest, RegisterRequest, User};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::api::{ApiClient, ApiError};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Rejected locally; nothing was sent
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Session error: {0:#}")]
    Session(#[from] anyhow::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
}

/// Rough shape check; the server has the final say
pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

fn required(value: &str, field: &str) -> AuthResult<()> {
    if value.trim().is_empty() {
        return Err(AuthError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Login form input
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn validate(&self) -> AuthResult<LoginRequest> {
        required(&self.email, "Email")?;
        required(&self.password, "Password")?;
        Ok(LoginRequest {
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

/// Sign-up form input
#[derive(Debug, Clone)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl Registration {
    pub fn validate(&self) -> AuthResult<RegisterRequest> {
        required(&self.first_name, "First name")?;
        required(&self.last_name, "Last name")?;
        required(&self.email, "Email")?;
        required(&self.password, "Password")?;

        if !is_valid_email(self.email.trim()) {
            return Err(AuthError::Validation(
                "Please enter a valid email address".to_string(),
            ));
        }
        if self.password != self.confirm_password {
            return Err(AuthError::Validation("Passwords do not match".to_string()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        Ok(RegisterRequest {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

/// Login, registration and session restore against the API.
///
/// Successful logins establish the client's [`SessionContext`], so every
/// later request carries the new token.
///
/// [`SessionContext`]: crate::session::SessionContext
pub struct AuthFlow {
    api: ApiClient,
}

impl AuthFlow {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn login(&self, credentials: &Credentials) -> AuthResult<User> {
        let request = credentials.validate()?;
        log::info!("Logging in as {}", request.email);

        let response = self.api.login(&request).await?;
        self.api
            .session()
            .establish(response.token, response.user.clone())?;
        Ok(response.user)
    }

    pub async fn register(&self, registration: &Registration) -> AuthResult<User> {
        let request = registration.validate()?;
        log::info!("Registering {}", request.email);

        let response = self.api.register(&request).await?;
        self.api
            .session()
            .establish(response.token, response.user.clone())?;
        Ok(response.user)
    }

    /// Check a persisted session with the server.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(user))` if the stored token is still accepted
    /// - `Ok(None)` if there is no session, or the server rejected it (it is cleared)
    /// - `Err(_)` if the server could not be asked
    pub async fn restore(&self) -> AuthResult<Option<User>> {
        if !self.api.session().is_authenticated() {
            log::debug!("No existing session found");
            return Ok(None);
        }

        match self.api.current_user().await {
            Ok(user) => {
                log::info!("Session is valid for user {}", user.id);
                Ok(Some(user))
            }
            Err(ApiError::Network(e)) => Err(ApiError::Network(e).into()),
            Err(e) => {
                log::warn!("Session validation failed: {}", e);
                self.api.session().clear()?;
                Ok(None)
            }
        }
    }

    pub fn logout(&self) -> AuthResult<()> {
        log::info!("Logging out");
        self.api.session().clear()?;
        Ok(())
    }

    pub fn current_user(&self) -> Option<User> {
        self.api.session().current_user()
    }
}
