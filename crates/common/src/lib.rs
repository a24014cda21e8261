pub mod models;
pub mod storage;
pub mod validation;

pub use models::{
    Role, RoleFilter, User, Credentials, LoginResponse,
    UserQuery, UserPage, NewUser, UserUpdate,
    PasswordReset, PasswordChange, MessageResponse, UserEnvelope,
};

pub use storage::{
    Database, TokenStore, SqliteTokenStore, MemoryTokenStore, StorageError, TOKEN_KEY,
};

pub use validation::{
    ValidationError, validate_password, validate_password_pair,
    validate_new_user, validate_update, normalize_update,
};
