use serde::{Deserialize, Serialize};

use crate::models::UserProfile;

/// Body of a successful `POST /sessions`.
///
/// Every field is optional on the wire; the session manager decides what
/// counts as a complete response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionResponse {
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct SignUpRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
}

/// Body of `PUT /users`.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileUpdate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_password: Option<String>,
}

impl ProfileUpdate {
    pub fn new(name: impl Into<String>, password: Option<PasswordChange>) -> Self {
        let (old_password, password) = match password {
            Some(change) => (Some(change.old_password), Some(change.new_password)),
            None => (None, None),
        };
        Self {
            name: name.into(),
            password,
            old_password,
        }
    }
}
