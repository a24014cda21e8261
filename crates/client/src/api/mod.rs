//! Remote collaborators consumed by the client
//!
//! The backend is treated as a set of request/response contracts. Each
//! contract is a trait so the stores can run against the HTTP client in
//! production and against fakes in tests.

mod http;

pub use http::HttpApi;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use conciliar_common::{
    Credentials, LoginResponse, NewUser, PasswordChange, PasswordReset, StorageError, User,
    UserPage, UserQuery, UserUpdate, ValidationError,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidCredentials(String),
    #[error("No authentication token available")]
    NoToken,
    #[error("{0}")]
    ExpiredOrInvalidToken(String),
    #[error("{0}")]
    NetworkOrServer(String),
    #[error("{0}")]
    Validation(String),
    #[error("Another request is already in progress")]
    Busy,
    /// The result arrived after the state it belonged to was reset or disposed.
    #[error("Request was superseded")]
    Cancelled,
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Storage(e.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> ApiResult<LoginResponse>;

    async fn current_user(&self, token: &str) -> ApiResult<User>;

    /// Local only; no server round trip is guaranteed.
    async fn logout(&self) -> ApiResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait DirectoryApi: Send + Sync {
    async fn list_users(&self, query: &UserQuery) -> ApiResult<UserPage>;
}

#[async_trait]
pub trait UserAdminApi: Send + Sync {
    async fn create_user(&self, user: &NewUser) -> ApiResult<User>;

    async fn get_user(&self, id: &str) -> ApiResult<User>;

    async fn update_user(&self, id: &str, update: &UserUpdate) -> ApiResult<User>;

    async fn delete_user(&self, id: &str) -> ApiResult<()>;

    async fn set_password(&self, id: &str, reset: &PasswordReset) -> ApiResult<()>;

    async fn upload_profile_picture(&self, id: &str, file_name: &str, bytes: Bytes) -> ApiResult<User>;

    async fn delete_profile_picture(&self, id: &str) -> ApiResult<User>;
}

/// Self-service account operations.
#[async_trait]
pub trait AccountApi: Send + Sync {
    async fn change_password(&self, change: &PasswordChange) -> ApiResult<()>;

    async fn activate_account(&self, activation_token: &str) -> ApiResult<Option<User>>;
}

// Shared handles: one HTTP client usually backs every store.

#[async_trait]
impl<T: AuthApi + ?Sized> AuthApi for Arc<T> {
    async fn login(&self, credentials: &Credentials) -> ApiResult<LoginResponse> {
        (**self).login(credentials).await
    }

    async fn current_user(&self, token: &str) -> ApiResult<User> {
        (**self).current_user(token).await
    }

    async fn logout(&self) -> ApiResult<()> {
        (**self).logout().await
    }
}

#[async_trait]
impl<T: DirectoryApi + ?Sized> DirectoryApi for Arc<T> {
    async fn list_users(&self, query: &UserQuery) -> ApiResult<UserPage> {
        (**self).list_users(query).await
    }
}

#[async_trait]
impl<T: UserAdminApi + ?Sized> UserAdminApi for Arc<T> {
    async fn create_user(&self, user: &NewUser) -> ApiResult<User> {
        (**self).create_user(user).await
    }

    async fn get_user(&self, id: &str) -> ApiResult<User> {
        (**self).get_user(id).await
    }

    async fn update_user(&self, id: &str, update: &UserUpdate) -> ApiResult<User> {
        (**self).update_user(id, update).await
    }

    async fn delete_user(&self, id: &str) -> ApiResult<()> {
        (**self).delete_user(id).await
    }

    async fn set_password(&self, id: &str, reset: &PasswordReset) -> ApiResult<()> {
        (**self).set_password(id, reset).await
    }

    async fn upload_profile_picture(&self, id: &str, file_name: &str, bytes: Bytes) -> ApiResult<User> {
        (**self).upload_profile_picture(id, file_name, bytes).await
    }

    async fn delete_profile_picture(&self, id: &str) -> ApiResult<User> {
        (**self).delete_profile_picture(id).await
    }
}

#[async_trait]
impl<T: AccountApi + ?Sized> AccountApi for Arc<T> {
    async fn change_password(&self, change: &PasswordChange) -> ApiResult<()> {
        (**self).change_password(change).await
    }

    async fn activate_account(&self, activation_token: &str) -> ApiResult<Option<User>> {
        (**self).activate_account(activation_token).await
    }
}
