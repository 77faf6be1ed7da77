use crate::{
    auth::{AuthService, TokenPair},
    entities::{user, User},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// User account service: registration, credential verification, profiles.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthService>,
    event_sender: EventSender,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>, auth: Arc<AuthService>, event_sender: EventSender) -> Self {
        Self {
            db,
            auth,
            event_sender,
        }
    }

    /// Registers a new account. Username and email must be unique.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn register(&self, input: RegisterInput) -> Result<UserProfile, ServiceError> {
        let existing = User::find()
            .filter(user::Column::Username.eq(input.username.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::AlreadyExists(
                "User with this username".to_string(),
            ));
        }

        let existing = User::find()
            .filter(user::Column::Email.eq(input.email.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::AlreadyExists(
                "User with this email".to_string(),
            ));
        }

        let password_hash = self.auth.hash_password(&input.password)?;

        let user = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(input.username),
            email: Set(input.email),
            password_hash: Set(password_hash),
            is_admin: Set(false),
            first_name: Set(input.first_name),
            last_name: Set(input.last_name),
            image: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender.send_or_log(Event::UserRegistered(user.id)).await;
        info!(user_id = %user.id, "user registered");

        Ok(UserProfile::from(user))
    }

    /// Verifies credentials and issues a token pair.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn login(&self, input: LoginInput) -> Result<TokenPair, ServiceError> {
        let user = User::find()
            .filter(user::Column::Username.eq(input.username.clone()))
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !self.auth.verify_password(&input.password, &user.password_hash)? {
            return Err(ServiceError::InvalidCredentials);
        }

        Ok(self.auth.generate_token_pair(&user)?)
    }

    /// Exchanges a refresh token for a new token pair. The account must
    /// still exist.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ServiceError> {
        let claims = self.auth.validate_refresh_token(refresh_token)?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::InvalidToken("subject is not a valid user id".into()))?;

        let user = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::InvalidToken("account no longer exists".into()))?;

        Ok(self.auth.generate_token_pair(&user)?)
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<UserProfile, ServiceError> {
        let user = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;

        Ok(UserProfile::from(user))
    }
}

/// Input for account registration
#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Input for login
#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

/// Public view of an account (no credential material)
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserProfile {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            is_admin: user.is_admin,
            first_name: user.first_name,
            last_name: user.last_name,
            image: user.image,
            created_at: user.created_at,
        }
    }
}
