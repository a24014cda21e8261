//! Conciliar client library
//!
//! Session handling and user administration against the Conciliar HTTP API.

pub mod account;
pub mod admin;
pub mod api;
pub mod config;
pub mod directory;
pub mod session;

pub use admin::AdminService;
pub use api::{AccountApi, ApiError, ApiResult, AuthApi, DirectoryApi, HttpApi, UserAdminApi};
pub use config::ClientConfig;
pub use directory::{DirectoryLoader, DirectoryState, LoadOutcome};
pub use session::{Access, SessionPhase, SessionState, SessionStore};
