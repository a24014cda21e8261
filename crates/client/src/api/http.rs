//! HTTP implementation of the collaborator traits

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use conciliar_common::{
    Credentials, LoginResponse, MessageResponse, NewUser, PasswordChange, PasswordReset,
    TokenStore, User, UserEnvelope, UserPage, UserQuery, UserUpdate,
};

use super::{AccountApi, ApiError, ApiResult, AuthApi, DirectoryApi, UserAdminApi};
use crate::config::ApiSettings;

/// Which endpoint a failed response came from; decides how statuses map to errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Login,
    CurrentUser,
    Other,
}

impl Endpoint {
    fn fallback_message(&self) -> &'static str {
        match self {
            Endpoint::Login => "Error al iniciar sesión",
            Endpoint::CurrentUser => "Error al obtener el perfil.",
            Endpoint::Other => "Error en la solicitud.",
        }
    }
}

/// Either `{ message, user }` or a bare user record.
#[derive(Deserialize)]
#[serde(untagged)]
enum UserBody {
    Wrapped(UserEnvelope),
    Bare(User),
}

impl From<UserBody> for User {
    fn from(body: UserBody) -> Self {
        match body {
            UserBody::Wrapped(envelope) => envelope.user,
            UserBody::Bare(user) => user,
        }
    }
}

#[derive(Deserialize)]
struct ActivationBody {
    #[serde(default)]
    user: Option<User>,
}

pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl HttpApi {
    pub fn new(settings: &ApiSettings, tokens: Arc<dyn TokenStore>) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("conciliar-client/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout())
            .build()
            .map_err(|e| ApiError::NetworkOrServer(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Token read from durable storage for every request.
    fn bearer(&self) -> ApiResult<String> {
        self.tokens.load()?.ok_or(ApiError::NoToken)
    }

    fn authorized(&self, method: Method, path: &str) -> ApiResult<RequestBuilder> {
        let token = self.bearer()?;
        Ok(self.client.request(method, self.url(path)).bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, endpoint: Endpoint) -> ApiResult<T> {
        let response = request.send().await.map_err(|e| {
            warn!("Request failed: {}", e);
            ApiError::NetworkOrServer(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::NetworkOrServer(e.to_string()))?;

        debug!("Response {} ({} bytes)", status, body.len());

        if !status.is_success() {
            let message = server_message(&body).unwrap_or_else(|| endpoint.fallback_message().to_string());
            return Err(classify(endpoint, status, message));
        }

        serde_json::from_slice(&body)
            .map_err(|e| ApiError::NetworkOrServer(format!("Invalid response body: {}", e)))
    }
}

fn server_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<MessageResponse>(body)
        .ok()
        .and_then(|r| r.message)
        .filter(|m| !m.trim().is_empty())
}

/// `users/{id}{suffix}` with the id escaped as one path segment.
fn user_path(id: &str, suffix: &str) -> String {
    format!("users/{}{}", urlencoding::encode(id), suffix)
}

fn classify(endpoint: Endpoint, status: StatusCode, message: String) -> ApiError {
    match (endpoint, status.as_u16()) {
        (Endpoint::Login, 400 | 401) => ApiError::InvalidCredentials(message),
        (Endpoint::CurrentUser, 401 | 403) => ApiError::ExpiredOrInvalidToken(message),
        (Endpoint::Other, 401) => ApiError::ExpiredOrInvalidToken(message),
        (Endpoint::Other, 400 | 422) => ApiError::Validation(message),
        _ => ApiError::NetworkOrServer(message),
    }
}

#[async_trait]
impl AuthApi for HttpApi {
    async fn login(&self, credentials: &Credentials) -> ApiResult<LoginResponse> {
        debug!("POST auth/login for {}", credentials.email);
        let request = self.client.post(self.url("auth/login")).json(credentials);
        self.send(request, Endpoint::Login).await
    }

    async fn current_user(&self, token: &str) -> ApiResult<User> {
        let request = self.client.get(self.url("auth/me")).bearer_auth(token);
        let body: UserBody = self.send(request, Endpoint::CurrentUser).await?;
        Ok(body.into())
    }
}

#[async_trait]
impl DirectoryApi for HttpApi {
    async fn list_users(&self, query: &UserQuery) -> ApiResult<UserPage> {
        debug!("GET users page={} role={}", query.page, query.role.as_query_value());
        let request = self
            .authorized(Method::GET, "users")?
            .query(&query.to_query_pairs());
        self.send(request, Endpoint::Other).await
    }
}

#[async_trait]
impl UserAdminApi for HttpApi {
    async fn create_user(&self, user: &NewUser) -> ApiResult<User> {
        let request = self.authorized(Method::POST, "auth/admin/create-user")?.json(user);
        let body: UserBody = self.send(request, Endpoint::Other).await?;
        Ok(body.into())
    }

    async fn get_user(&self, id: &str) -> ApiResult<User> {
        let path = user_path(id, "");
        let body: UserBody = self.send(self.authorized(Method::GET, &path)?, Endpoint::Other).await?;
        Ok(body.into())
    }

    async fn update_user(&self, id: &str, update: &UserUpdate) -> ApiResult<User> {
        let path = user_path(id, "");
        let request = self.authorized(Method::PUT, &path)?.json(update);
        let body: UserBody = self.send(request, Endpoint::Other).await?;
        Ok(body.into())
    }

    async fn delete_user(&self, id: &str) -> ApiResult<()> {
        let path = user_path(id, "");
        let _: MessageResponse = self.send(self.authorized(Method::DELETE, &path)?, Endpoint::Other).await?;
        Ok(())
    }

    async fn set_password(&self, id: &str, reset: &PasswordReset) -> ApiResult<()> {
        let path = user_path(id, "/set-password");
        let request = self.authorized(Method::PUT, &path)?.json(reset);
        let _: MessageResponse = self.send(request, Endpoint::Other).await?;
        Ok(())
    }

    async fn upload_profile_picture(&self, id: &str, file_name: &str, bytes: Bytes) -> ApiResult<User> {
        let path = user_path(id, "/picture");
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("profilePicture", part);
        let request = self.authorized(Method::PUT, &path)?.multipart(form);
        let body: UserBody = self.send(request, Endpoint::Other).await?;
        Ok(body.into())
    }

    async fn delete_profile_picture(&self, id: &str) -> ApiResult<User> {
        let path = user_path(id, "/picture");
        let body: UserBody = self.send(self.authorized(Method::DELETE, &path)?, Endpoint::Other).await?;
        Ok(body.into())
    }
}

#[async_trait]
impl AccountApi for HttpApi {
    async fn change_password(&self, change: &PasswordChange) -> ApiResult<()> {
        let request = self.authorized(Method::PUT, "auth/me/changepassword")?.json(change);
        let _: MessageResponse = self.send(request, Endpoint::Other).await?;
        Ok(())
    }

    async fn activate_account(&self, activation_token: &str) -> ApiResult<Option<User>> {
        let path = format!("auth/activate/{}", urlencoding::encode(activation_token));
        let body: ActivationBody = self.send(self.client.get(self.url(&path)), Endpoint::Other).await?;
        Ok(body.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conciliar_common::MemoryTokenStore;

    fn api(token: Option<&str>) -> HttpApi {
        let store = match token {
            Some(t) => MemoryTokenStore::with_token(t),
            None => MemoryTokenStore::new(),
        };
        HttpApi::new(&ApiSettings::default(), Arc::new(store)).unwrap()
    }

    #[test]
    fn test_url_joining() {
        let mut settings = ApiSettings::default();
        settings.base_url = "https://conciliar.example/api/".to_string();
        let api = HttpApi::new(&settings, Arc::new(MemoryTokenStore::new())).unwrap();
        assert_eq!(api.url("/auth/login"), "https://conciliar.example/api/auth/login");
        assert_eq!(api.url("users"), "https://conciliar.example/api/users");
    }

    #[test]
    fn test_status_mapping() {
        let msg = || "Invalid credentials".to_string();
        assert_eq!(
            classify(Endpoint::Login, StatusCode::UNAUTHORIZED, msg()),
            ApiError::InvalidCredentials("Invalid credentials".to_string())
        );
        assert!(matches!(
            classify(Endpoint::CurrentUser, StatusCode::FORBIDDEN, msg()),
            ApiError::ExpiredOrInvalidToken(_)
        ));
        assert!(matches!(
            classify(Endpoint::Other, StatusCode::UNPROCESSABLE_ENTITY, msg()),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            classify(Endpoint::Login, StatusCode::INTERNAL_SERVER_ERROR, msg()),
            ApiError::NetworkOrServer(_)
        ));
    }

    #[test]
    fn test_server_message_extraction() {
        assert_eq!(
            server_message(br#"{"message":"Usuario no encontrado"}"#).as_deref(),
            Some("Usuario no encontrado")
        );
        assert_eq!(server_message(b"<html>502</html>"), None);
        assert_eq!(server_message(br#"{"message":"  "}"#), None);
    }

    #[test]
    fn test_user_paths_escape_ids() {
        assert_eq!(user_path("665f1c", ""), "users/665f1c");
        assert_eq!(user_path("a/b c", "/picture"), "users/a%2Fb%20c/picture");
        assert_eq!(user_path("ñ?#&", "/set-password"), "users/%C3%B1%3F%23%26/set-password");
    }

    #[test]
    fn test_fallback_messages_match_server_language() {
        let message = server_message(b"").unwrap_or_else(|| Endpoint::Login.fallback_message().to_string());
        assert_eq!(
            classify(Endpoint::Login, StatusCode::UNAUTHORIZED, message),
            ApiError::InvalidCredentials("Error al iniciar sesión".to_string())
        );
        assert_eq!(Endpoint::CurrentUser.fallback_message(), "Error al obtener el perfil.");
    }

    #[test]
    fn test_user_body_shapes() {
        let wrapped: UserBody = serde_json::from_str(
            r#"{"message":"ok","user":{"_id":"1","email":"a@b.com","firstName":"A","lastName":"B","role":"admin","isActive":true}}"#,
        )
        .unwrap();
        assert_eq!(User::from(wrapped).id, "1");

        let bare: UserBody = serde_json::from_str(
            r#"{"id":"2","email":"c@d.com","firstName":"C","lastName":"D","role":"tercero"}"#,
        )
        .unwrap();
        let user = User::from(bare);
        assert_eq!(user.id, "2");
        assert!(!user.is_active);
    }

    #[tokio::test]
    async fn test_missing_token_fails_without_request() {
        let api = api(None);
        let result = api.list_users(&UserQuery::default()).await;
        assert_eq!(result.unwrap_err(), ApiError::NoToken);

        let result = api.delete_user("1").await;
        assert_eq!(result.unwrap_err(), ApiError::NoToken);
    }

    #[test]
    fn test_bearer_reads_store() {
        assert_eq!(api(Some("tok")).bearer().unwrap(), "tok");
    }
}
