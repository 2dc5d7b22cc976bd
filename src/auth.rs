//! Customer accounts.
//!
//! Tokens are issued by the backend and held by the browser; this service only
//! forwards the bearer token it receives.

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};
use crate::api::AuthApi;
use crate::{Result, StorefrontError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub email_verified: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthSession { pub access_token: String, pub refresh_token: String }

/// Raw login answer; see [`interpret_login`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginResponse {
    pub user: Option<User>,
    pub session: Option<AuthSession>,
    pub email_not_verified: Option<bool>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoggedIn { pub user: User, pub session: Option<AuthSession> }

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Credentials {
    #[validate(email)]
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "passwords_match", skip_on_field_errors = false))]
pub struct Registration {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, message = "Passwort muss mindestens 6 Zeichen lang sein"))]
    pub password: String,
    #[serde(skip_serializing)]
    pub confirm_password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

fn passwords_match(registration: &Registration) -> std::result::Result<(), ValidationError> {
    if registration.password == registration.confirm_password { Ok(()) } else { Err(ValidationError::new("passwords_differ")) }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: String,
    #[validate(length(min = 6, message = "Passwort muss mindestens 6 Zeichen lang sein"))]
    pub new_password: String,
}

/// Accepts a login only for verified accounts. The backend may answer 200 with
/// `emailNotVerified`, which must still be refused.
pub fn interpret_login(ok: bool, response: LoginResponse) -> Result<LoggedIn> {
    let unverified = response.email_not_verified.unwrap_or(false)
        || response.user.as_ref().is_some_and(|u| u.email_verified == Some(false));
    if unverified { return Err(StorefrontError::EmailNotVerified); }
    match (ok, response.user) {
        (true, Some(user)) => Ok(LoggedIn { user, session: response.session }),
        (_, _) => Err(StorefrontError::Api { status: 401, message: response.error.unwrap_or_else(|| "Login failed".into()) }),
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves the signed-in user behind the request, if any.
pub async fn current_user<A: AuthApi + ?Sized>(api: &A, headers: &HeaderMap) -> Result<Option<User>> {
    let Some(token) = bearer_token(headers) else { return Ok(None) };
    match api.me(token).await {
        Ok(user) => Ok(Some(user)),
        Err(StorefrontError::Api { status: 401 | 403, .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

pub async fn require_user<A: AuthApi + ?Sized>(api: &A, headers: &HeaderMap) -> Result<User> {
    current_user(api, headers).await?.ok_or(StorefrontError::NotAuthenticated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn user(verified: Option<bool>) -> User {
        User { id: "u1".into(), email: "anna@example.ch".into(), full_name: None, phone: None, created_at: None, email_verified: verified }
    }

    #[test]
    fn test_login_refuses_unverified() {
        let flagged = LoginResponse { user: Some(user(Some(true))), email_not_verified: Some(true), ..Default::default() };
        assert!(matches!(interpret_login(true, flagged), Err(StorefrontError::EmailNotVerified)));
        let unverified = LoginResponse { user: Some(user(Some(false))), ..Default::default() };
        assert!(matches!(interpret_login(true, unverified), Err(StorefrontError::EmailNotVerified)));
    }

    #[test]
    fn test_login_outcomes() {
        let session = AuthSession { access_token: "a".into(), refresh_token: "r".into() };
        let ok = LoginResponse { user: Some(user(Some(true))), session: Some(session.clone()), ..Default::default() };
        assert_eq!(interpret_login(true, ok).unwrap().session, Some(session));
        let denied = LoginResponse { error: Some("Invalid credentials".into()), ..Default::default() };
        match interpret_login(false, denied) {
            Err(StorefrontError::Api { message, .. }) => assert_eq!(message, "Invalid credentials"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_registration_rules() {
        let reg = |pw: &str, confirm: &str| Registration { email: "anna@example.ch".into(), password: pw.into(), confirm_password: confirm.into(), full_name: None, phone: None };
        assert!(reg("secret1", "secret1").validate().is_ok());
        assert!(reg("short", "short").validate().is_err());
        assert!(reg("secret1", "secret2").validate().is_err());
        assert!(PasswordChange { current_password: "x".into(), new_password: "12345".into() }.validate().is_err());
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(bearer_token(&headers), None);
    }
}
