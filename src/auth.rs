//! Authentication module.

use crate::config::{AuthConfig, PasswordScheme};
use crate::db::{CREDENTIALS_PROVIDER, Database, Role, Session, User, now_timestamp};
use crate::error::{AppError, Result};
use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        rand_core::{OsRng, RngCore},
    },
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use std::sync::OnceLock;

/// Hash a password with the given scheme.
pub fn hash_password(password: &str, scheme: PasswordScheme, bcrypt_cost: u32) -> Result<String> {
    match scheme {
        PasswordScheme::Bcrypt => bcrypt::hash(password, bcrypt_cost)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e))),
        PasswordScheme::Argon2 => {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
        }
    }
}

/// Verify a password against a stored hash of either scheme.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    if hash.starts_with("$argon2") {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

        return Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok());
    }

    if hash.starts_with("$2") {
        return bcrypt::verify(password, hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)));
    }

    Err(AppError::Internal(
        "Unrecognized password hash format".to_string(),
    ))
}

/// Generate a secure random token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Trim and lower-case an email so lookups and the uniqueness
/// constraint see one spelling.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Registration input.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    /// Login email.
    pub email: String,
    /// Plain-text password.
    pub password: String,
    /// Display name; blank falls back to the email's local part.
    pub name: String,
    /// Profile photo URL from a prior upload.
    pub photo: Option<String>,
}

/// Authentication service.
pub struct AuthService {
    db: Database,
    session_duration_days: u32,
    registration_enabled: bool,
    scheme: PasswordScheme,
    bcrypt_cost: u32,
    min_password_length: usize,
    /// Hash verified against on unknown emails so both login failures cost the same.
    dummy_hash: OnceLock<String>,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(db: Database, config: &AuthConfig) -> Self {
        Self {
            db,
            session_duration_days: config.session_days,
            registration_enabled: config.registration_enabled(),
            scheme: config.password_hash,
            bcrypt_cost: config.bcrypt_cost,
            min_password_length: config.min_password_length,
            dummy_hash: OnceLock::new(),
        }
    }

    /// Self-service registration. New accounts always get the `user` role.
    pub fn register(&self, new_user: &NewUser) -> Result<User> {
        if !self.registration_enabled {
            return Err(AppError::Forbidden("Registration is disabled".to_string()));
        }

        self.create_user(new_user, Role::User)
    }

    /// Create a new user (admin function).
    pub fn create_user(&self, new_user: &NewUser, role: Role) -> Result<User> {
        let email = normalize_email(&new_user.email);

        if email.is_empty() || new_user.password.is_empty() {
            return Err(AppError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let local_part = match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => local,
            _ => {
                return Err(AppError::Validation(
                    "Email address is not valid".to_string(),
                ));
            }
        };

        if new_user.password.chars().count() < self.min_password_length {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters",
                self.min_password_length
            )));
        }

        // Fast path for the common case; the UNIQUE constraint still decides races.
        if self.db.get_user_by_email(&email)?.is_some() {
            return Err(AppError::Conflict(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let name = match new_user.name.trim() {
            "" => local_part.to_string(),
            name => name.to_string(),
        };

        let password_hash = hash_password(&new_user.password, self.scheme, self.bcrypt_cost)?;

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            email,
            password_hash,
            provider: CREDENTIALS_PROVIDER.to_string(),
            role,
            photo: new_user.photo.clone().filter(|p| !p.trim().is_empty()),
            created_at: now_timestamp(),
            last_login: None,
        };

        self.db.create_user(&user)?;
        tracing::info!(user_id = %user.id, role = %user.role, "User created");
        Ok(user)
    }

    /// Login and create a session.
    ///
    /// Unknown email and wrong password both yield [`AppError::AuthFailed`].
    pub fn login(&self, email: &str, password: &str) -> Result<(User, String)> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let Some(user) = self.db.get_user_by_email(&email)? else {
            verify_password(password, self.dummy_hash()?)?;
            return Err(AppError::AuthFailed);
        };

        if !verify_password(password, &user.password_hash)? {
            tracing::debug!(user_id = %user.id, "Password mismatch");
            return Err(AppError::AuthFailed);
        }

        // Update last login
        self.db.update_user_last_login(&user.id)?;

        // Create session
        let token = generate_token();
        let expires_at = now_timestamp() + (self.session_duration_days as i64 * 24 * 60 * 60);

        let session = Session {
            token: token.clone(),
            user_id: user.id.clone(),
            expires_at,
        };

        self.db.create_session(&session)?;

        Ok((user, token))
    }

    fn dummy_hash(&self) -> Result<&str> {
        if let Some(hash) = self.dummy_hash.get() {
            return Ok(hash);
        }
        let hash = hash_password("bookworm-dummy-password", self.scheme, self.bcrypt_cost)?;
        Ok(self.dummy_hash.get_or_init(|| hash))
    }

    /// Validate a session token and return the user.
    pub fn validate_token(&self, token: &str) -> Result<Option<User>> {
        let session = match self.db.get_session(token)? {
            Some(s) => s,
            None => return Ok(None),
        };

        // Check expiration
        if session.expires_at < now_timestamp() {
            self.db.delete_session(token)?;
            return Ok(None);
        }

        self.db.get_user_by_id(&session.user_id)
    }

    /// Logout (delete session).
    pub fn logout(&self, token: &str) -> Result<()> {
        self.db.delete_session(token)
    }

    /// Change user password.
    pub fn change_password(&self, email: &str, new_password: &str) -> Result<bool> {
        if new_password.chars().count() < self.min_password_length {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters",
                self.min_password_length
            )));
        }

        let password_hash = hash_password(new_password, self.scheme, self.bcrypt_cost)?;
        self.db
            .update_user_password(&normalize_email(email), &password_hash)
    }

    /// Delete a user.
    pub fn delete_user(&self, email: &str) -> Result<bool> {
        self.db.delete_user(&normalize_email(email))
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.db.list_users()
    }

    /// Drop expired sessions.
    pub fn purge_expired_sessions(&self) -> Result<usize> {
        self.db.cleanup_expired_sessions()
    }

    /// Check if a user is admin.
    pub fn is_admin(&self, user: &User) -> bool {
        user.role == Role::Admin
    }
}
