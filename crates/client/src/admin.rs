//! Admin back-office operations
//!
//! Every operation validates locally, calls the server, and only after the
//! server confirmed the change applies the matching local edit to the
//! attached directory. A failure leaves the directory untouched.

use bytes::Bytes;
use tracing::{info, warn};

use conciliar_common::{
    normalize_update, validate_new_user, validate_password_pair, validate_update, NewUser,
    PasswordReset, Role, User, UserUpdate,
};

use crate::api::{ApiResult, DirectoryApi, UserAdminApi};
use crate::directory::DirectoryLoader;

pub struct AdminService<U, D> {
    api: U,
    directory: Option<DirectoryLoader<D>>,
}

impl<U: UserAdminApi, D: DirectoryApi + 'static> AdminService<U, D> {
    pub fn new(api: U) -> Self {
        Self { api, directory: None }
    }

    /// Keeps `directory` in sync with confirmed changes.
    pub fn with_directory(mut self, directory: DirectoryLoader<D>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn directory(&self) -> Option<&DirectoryLoader<D>> {
        self.directory.as_ref()
    }

    pub async fn get_user(&self, id: &str) -> ApiResult<User> {
        self.api.get_user(id).await
    }

    /// Creates the account and reloads the directory from page 1, since the
    /// new record's position depends on server ordering.
    pub async fn create_user(&self, user: &NewUser) -> ApiResult<User> {
        validate_new_user(user)?;

        let mut payload = user.clone();
        if payload.role != Role::Conciliador {
            payload.numero_sicac = None;
        }

        let created = self.api.create_user(&payload).await?;
        info!("Created {} {}", created.role.as_str(), created.email);

        if let Some(directory) = &self.directory {
            // The account exists either way; a failed reload also lands in
            // the directory's own error state.
            if let Err(e) = directory.refresh().await {
                warn!("Directory reload after creating {} failed: {}", created.email, e);
            }
        }
        Ok(created)
    }

    /// `current_role` is the role the record has before the edit, used for
    /// the SICAAC rule when the update does not change the role.
    pub async fn update_user(&self, id: &str, update: UserUpdate, current_role: Option<Role>) -> ApiResult<User> {
        validate_update(&update, current_role)?;
        let update = normalize_update(update);

        let updated = self.api.update_user(id, &update).await?;
        if let Some(directory) = &self.directory {
            directory.replace_user(updated.clone());
        }
        Ok(updated)
    }

    pub async fn set_active(&self, id: &str, is_active: bool) -> ApiResult<User> {
        let updated = self.api.update_user(id, &UserUpdate::active(is_active)).await?;
        info!("{} account {}", if is_active { "Activated" } else { "Deactivated" }, id);

        if let Some(directory) = &self.directory {
            directory.mark_active(id, is_active);
        }
        Ok(updated)
    }

    pub async fn delete_user(&self, id: &str) -> ApiResult<()> {
        self.api.delete_user(id).await?;
        info!("Deleted account {}", id);

        if let Some(directory) = &self.directory {
            directory.remove_by_id(id);
        }
        Ok(())
    }

    pub async fn reset_password(&self, id: &str, password: &str, confirm: &str) -> ApiResult<()> {
        validate_password_pair(password, confirm)?;

        let reset = PasswordReset {
            password: password.to_string(),
            confirm_password: confirm.to_string(),
        };
        self.api.set_password(id, &reset).await?;
        info!("Password reset for {}", id);
        Ok(())
    }

    pub async fn upload_profile_picture(&self, id: &str, file_name: &str, bytes: Bytes) -> ApiResult<User> {
        let updated = self.api.upload_profile_picture(id, file_name, bytes).await?;
        if let Some(directory) = &self.directory {
            directory.replace_user(updated.clone());
        }
        Ok(updated)
    }

    pub async fn delete_profile_picture(&self, id: &str) -> ApiResult<User> {
        let updated = self.api.delete_profile_picture(id).await?;
        if let Some(directory) = &self.directory {
            directory.replace_user(updated.clone());
        }
        Ok(updated)
    }
}
