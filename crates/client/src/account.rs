//! Self-service account actions

use tracing::info;

use conciliar_common::{validate_password_pair, PasswordChange, User};

use crate::api::{AccountApi, ApiError, ApiResult};

/// Changes the signed-in user's password after the local policy checks.
pub async fn change_password<A: AccountApi + ?Sized>(api: &A, change: &PasswordChange) -> ApiResult<()> {
    if change.current_password.is_empty() {
        return Err(ApiError::Validation("Current password is required".to_string()));
    }
    validate_password_pair(&change.new_password, &change.confirm_new_password)?;

    api.change_password(change).await?;
    info!("Password changed");
    Ok(())
}

/// Confirms an account from the token in its activation e-mail.
pub async fn activate_account<A: AccountApi + ?Sized>(api: &A, activation_token: &str) -> ApiResult<Option<User>> {
    let token = activation_token.trim();
    if token.is_empty() {
        return Err(ApiError::Validation("Activation token is required".to_string()));
    }
    api.activate_account(token).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    #[derive(Default)]
    struct CountingAccount {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AccountApi for CountingAccount {
        async fn change_password(&self, _change: &PasswordChange) -> ApiResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn activate_account(&self, _activation_token: &str) -> ApiResult<Option<User>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    fn change(new: &str, confirm: &str) -> PasswordChange {
        PasswordChange {
            current_password: "Viejo#123".to_string(),
            new_password: new.to_string(),
            confirm_new_password: confirm.to_string(),
        }
    }

    #[tokio::test]
    async fn test_change_password_rules() {
        let api = CountingAccount::default();

        assert!(change_password(&api, &change("weak", "weak")).await.is_err());
        assert!(change_password(&api, &change("Nuevo#1234", "Nuevo#123")).await.is_err());
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);

        change_password(&api, &change("Nuevo#1234", "Nuevo#1234")).await.unwrap();
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_activation_requires_token() {
        let api = CountingAccount::default();
        assert!(activate_account(&api, "  ").await.is_err());
        assert!(activate_account(&api, "abc123").await.unwrap().is_none());
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }
}
