//! Client-side checks run before a form is submitted.
//!
//! The backend enforces the same rules; these exist so that obviously invalid
//! input never leaves the client.

use thiserror::Error;

use crate::models::{NewUser, Role, UserUpdate};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Characters accepted as the "special character" in a password.
pub const PASSWORD_SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Password must be at least 8 characters long and contain one uppercase letter and one special character")]
    WeakPassword,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("Email address is not valid")]
    InvalidEmail,
    #[error("SICAAC number is required for the conciliador role")]
    MissingSicac,
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let long_enough = password.chars().count() >= MIN_PASSWORD_LENGTH;
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_special = password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c));

    if long_enough && has_upper && has_special {
        Ok(())
    } else {
        Err(ValidationError::WeakPassword)
    }
}

/// Checks a new password together with its confirmation.
pub fn validate_password_pair(password: &str, confirm: &str) -> Result<(), ValidationError> {
    if password != confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    validate_password(password)
}

pub fn validate_new_user(user: &NewUser) -> Result<(), ValidationError> {
    require("First name", &user.first_name)?;
    require("Last name", &user.last_name)?;
    require("Email", &user.email)?;
    require("Cedula", &user.cedula)?;
    require("Phone number", &user.phone_number)?;

    if !user.email.contains('@') {
        return Err(ValidationError::InvalidEmail);
    }

    validate_password(&user.password)?;

    if user.role == Role::Conciliador && is_blank(user.numero_sicac.as_deref()) {
        return Err(ValidationError::MissingSicac);
    }

    Ok(())
}

/// Validates a partial update against the role it leaves the user with.
///
/// `current_role` is the role before the update; a role change in `update`
/// takes precedence.
pub fn validate_update(update: &UserUpdate, current_role: Option<Role>) -> Result<(), ValidationError> {
    if let Some(email) = &update.email {
        require("Email", email)?;
        if !email.contains('@') {
            return Err(ValidationError::InvalidEmail);
        }
    }

    let role = update.role.or(current_role);
    if role == Some(Role::Conciliador) {
        if let Some(sicac) = &update.numero_sicac {
            if is_blank(sicac.as_deref()) {
                return Err(ValidationError::MissingSicac);
            }
        } else if update.role == Some(Role::Conciliador) && current_role != Some(Role::Conciliador) {
            return Err(ValidationError::MissingSicac);
        }
    }

    Ok(())
}

/// Normalizes an update before it is sent: any role other than conciliador
/// clears the SICAAC number.
pub fn normalize_update(mut update: UserUpdate) -> UserUpdate {
    if matches!(update.role, Some(role) if role != Role::Conciliador) {
        update.numero_sicac = Some(None);
    }
    update
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(role: Role) -> NewUser {
        NewUser {
            first_name: "Ana".to_string(),
            last_name: "Ruiz".to_string(),
            email: "ana@example.com".to_string(),
            cedula: "V-123".to_string(),
            phone_number: "555-0100".to_string(),
            password: "Secreto#99".to_string(),
            role,
            numero_sicac: None,
        }
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password("Abcdefg!").is_ok());
        assert_eq!(validate_password("Abc!"), Err(ValidationError::WeakPassword));
        assert_eq!(validate_password("abcdefg!"), Err(ValidationError::WeakPassword));
        assert_eq!(validate_password("Abcdefgh"), Err(ValidationError::WeakPassword));
        assert!(validate_password("Pa\\ssword").is_ok());
    }

    #[test]
    fn test_password_pair() {
        assert_eq!(
            validate_password_pair("Abcdefg!", "Abcdefg?"),
            Err(ValidationError::PasswordMismatch)
        );
        assert!(validate_password_pair("Abcdefg!", "Abcdefg!").is_ok());
    }

    #[test]
    fn test_new_user_rules() {
        assert!(validate_new_user(&sample_user(Role::Tercero)).is_ok());

        let conciliador = sample_user(Role::Conciliador);
        assert_eq!(validate_new_user(&conciliador), Err(ValidationError::MissingSicac));

        let mut conciliador = sample_user(Role::Conciliador);
        conciliador.numero_sicac = Some("S-7".to_string());
        assert!(validate_new_user(&conciliador).is_ok());

        let mut missing = sample_user(Role::Tercero);
        missing.cedula = " ".to_string();
        assert_eq!(validate_new_user(&missing), Err(ValidationError::MissingField("Cedula")));

        let mut bad_email = sample_user(Role::Tercero);
        bad_email.email = "ana.example.com".to_string();
        assert_eq!(validate_new_user(&bad_email), Err(ValidationError::InvalidEmail));
    }

    #[test]
    fn test_update_rules() {
        let promote = UserUpdate {
            role: Some(Role::Conciliador),
            ..Default::default()
        };
        assert_eq!(
            validate_update(&promote, Some(Role::Tercero)),
            Err(ValidationError::MissingSicac)
        );

        let clear = UserUpdate {
            numero_sicac: Some(None),
            ..Default::default()
        };
        assert_eq!(
            validate_update(&clear, Some(Role::Conciliador)),
            Err(ValidationError::MissingSicac)
        );

        assert!(validate_update(&UserUpdate::active(false), Some(Role::Conciliador)).is_ok());
    }

    #[test]
    fn test_normalize_clears_sicac() {
        let update = normalize_update(UserUpdate {
            role: Some(Role::Tercero),
            numero_sicac: Some(Some("S-1".to_string())),
            ..Default::default()
        });
        assert_eq!(update.numero_sicac, Some(None));

        let update = normalize_update(UserUpdate::active(true));
        assert_eq!(update.numero_sicac, None);
    }
}
