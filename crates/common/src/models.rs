//! Domain models for Conciliar

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Conciliador,
    #[default]
    Tercero,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Conciliador => "conciliador",
            Role::Tercero => "tercero",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Conciliador => "Conciliador",
            Role::Tercero => "Tercero",
        }
    }

    pub fn all() -> &'static [Role] {
        &[Role::Admin, Role::Conciliador, Role::Tercero]
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" | "admins" => Ok(Role::Admin),
            "conciliador" | "conciliadores" => Ok(Role::Conciliador),
            "tercero" | "terceros" => Ok(Role::Tercero),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Role filter applied to the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleFilter {
    #[default]
    #[serde(rename = "todos", alias = "all")]
    All,
    Admin,
    Conciliador,
    Tercero,
}

impl RoleFilter {
    /// Value sent as the `role` query parameter.
    pub fn as_query_value(&self) -> &'static str {
        match self {
            RoleFilter::All => "todos",
            RoleFilter::Admin => "admin",
            RoleFilter::Conciliador => "conciliador",
            RoleFilter::Tercero => "tercero",
        }
    }

    pub fn matches(&self, role: Role) -> bool {
        match self {
            RoleFilter::All => true,
            RoleFilter::Admin => role == Role::Admin,
            RoleFilter::Conciliador => role == Role::Conciliador,
            RoleFilter::Tercero => role == Role::Tercero,
        }
    }

    pub fn all() -> &'static [RoleFilter] {
        &[RoleFilter::All, RoleFilter::Conciliador, RoleFilter::Tercero, RoleFilter::Admin]
    }
}


impl From<Role> for RoleFilter {
    fn from(role: Role) -> Self {
        match role {
            Role::Admin => RoleFilter::Admin,
            Role::Conciliador => RoleFilter::Conciliador,
            Role::Tercero => RoleFilter::Tercero,
        }
    }
}

impl std::str::FromStr for RoleFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "todos" => Ok(RoleFilter::All),
            other => other.parse::<Role>().map(RoleFilter::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cedula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numero_sicac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Merge the fields present in `update` into this record.
    pub fn apply(&mut self, update: &UserUpdate) {
        if let Some(first_name) = &update.first_name {
            self.first_name = first_name.clone();
        }
        if let Some(last_name) = &update.last_name {
            self.last_name = last_name.clone();
        }
        if let Some(email) = &update.email {
            self.email = email.clone();
        }
        if let Some(cedula) = &update.cedula {
            self.cedula = Some(cedula.clone());
        }
        if let Some(phone_number) = &update.phone_number {
            self.phone_number = Some(phone_number.clone());
        }
        if let Some(role) = update.role {
            self.role = role;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }
        if let Some(numero_sicac) = &update.numero_sicac {
            self.numero_sicac = numero_sicac.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
    #[serde(default)]
    pub message: Option<String>,
}

/// One page request against the user directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery {
    pub page: u32,
    pub limit: u32,
    pub role: RoleFilter,
    pub search: String,
}

impl UserQuery {
    pub const DEFAULT_LIMIT: u32 = 15;

    pub fn first_page(role: RoleFilter, search: impl Into<String>) -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
            role,
            search: search.into(),
        }
    }

    /// Query string pairs; `search` is only included when it is not blank.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.to_string()),
            ("limit", self.limit.to_string()),
            ("role", self.role.as_query_value().to_string()),
        ];
        let search = self.search.trim();
        if !search.is_empty() {
            pairs.push(("search", search.to_string()));
        }
        pairs
    }
}

impl Default for UserQuery {
    fn default() -> Self {
        Self::first_page(RoleFilter::All, "")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub total_users: Option<u64>,
    #[serde(default)]
    pub current_page: Option<u32>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub has_more: bool,
}

impl UserPage {
    pub fn new(users: Vec<User>, has_more: bool) -> Self {
        Self {
            users,
            total_users: None,
            current_page: None,
            total_pages: None,
            has_more,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub cedula: String,
    pub phone_number: String,
    pub password: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numero_sicac: Option<String>,
}

/// Partial update of a user record. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cedula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    /// `Some(None)` clears the number on the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numero_sicac: Option<Option<String>>,
}

impl UserUpdate {
    pub fn active(is_active: bool) -> Self {
        Self {
            is_active: Some(is_active),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordReset {
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Responses of the form `{ message, user }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEnvelope {
    #[serde(default)]
    pub message: Option<String>,
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_accepts_mongo_id() {
        let json = r#"{
            "_id": "665f1c",
            "email": "ana@example.com",
            "firstName": "Ana",
            "lastName": "Ruiz",
            "role": "conciliador",
            "isActive": true,
            "numeroSicac": "S-42"
        }"#;

        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.id, "665f1c");
        assert_eq!(user.role, Role::Conciliador);
        assert!(user.is_active);
        assert_eq!(user.numero_sicac.as_deref(), Some("S-42"));
        assert_eq!(user.full_name(), "Ana Ruiz");
    }

    #[test]
    fn test_query_pairs_skip_blank_search() {
        let query = UserQuery::first_page(RoleFilter::All, "  ");
        let pairs = query.to_query_pairs();
        assert_eq!(pairs.len(), 3);
        assert!(pairs.iter().all(|(k, _)| *k != "search"));

        let query = UserQuery {
            page: 3,
            limit: 15,
            role: RoleFilter::Tercero,
            search: "ruiz".to_string(),
        };
        let pairs = query.to_query_pairs();
        assert!(pairs.contains(&("page", "3".to_string())));
        assert!(pairs.contains(&("role", "tercero".to_string())));
        assert!(pairs.contains(&("search", "ruiz".to_string())));
    }

    #[test]
    fn test_role_filter_parsing() {
        assert_eq!("todos".parse::<RoleFilter>().unwrap(), RoleFilter::All);
        assert_eq!("Conciliadores".parse::<RoleFilter>().unwrap(), RoleFilter::Conciliador);
        assert!("owner".parse::<RoleFilter>().is_err());
        assert!(RoleFilter::All.matches(Role::Admin));
        assert!(!RoleFilter::Tercero.matches(Role::Admin));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Role::default(), Role::Tercero);
        assert_eq!(RoleFilter::default(), RoleFilter::All);
        assert_eq!(UserQuery::default().role, RoleFilter::All);
    }

    #[test]
    fn test_update_serializes_only_present_fields() {
        let update = UserUpdate::active(false);
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "isActive": false }));

        let update = UserUpdate {
            role: Some(Role::Tercero),
            numero_sicac: Some(None),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "role": "tercero", "numeroSicac": null }));
    }

    #[test]
    fn test_apply_update() {
        let mut user = User {
            id: "1".to_string(),
            email: "a@b.com".to_string(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            role: Role::Conciliador,
            is_active: true,
            cedula: None,
            phone_number: None,
            numero_sicac: Some("S-1".to_string()),
            profile_picture: None,
            created_at: None,
        };

        user.apply(&UserUpdate {
            last_name: Some("C".to_string()),
            role: Some(Role::Tercero),
            numero_sicac: Some(None),
            ..Default::default()
        });

        assert_eq!(user.last_name, "C");
        assert_eq!(user.first_name, "A");
        assert_eq!(user.role, Role::Tercero);
        assert!(user.numero_sicac.is_none());
    }
}
