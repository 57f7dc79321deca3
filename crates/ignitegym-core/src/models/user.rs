use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The signed-in user's profile.
///
/// The session layer treats this as an opaque value: it is replaced as a
/// whole on update and reset to [`UserProfile::default`] on sign-out. The
/// default value is the canonical "signed out" user, so consumers never deal
/// with an absent profile.
///
/// Attributes the backend returns beyond the identity fields are kept in
/// `extra` and written back unchanged when the profile is persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, deserialize_with = "id_from_string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            avatar: None,
            extra: Map::new(),
        }
    }

    /// A profile without an id is the signed-out user.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    /// Copy of this profile with a new display name
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

/// The backend has served ids both as strings and as numbers.
fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for user id, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_is_empty() {
        assert!(UserProfile::default().is_empty());
        assert!(!UserProfile::new("1", "A", "a@x.com").is_empty());
    }

    #[test]
    fn test_parse_profile_keeps_unknown_fields() {
        let json = r#"{"id": 7, "name": "Ana", "email": "ana@x.com", "avatar": "ana.png", "created_at": "2024-01-02"}"#;
        let user: UserProfile = serde_json::from_str(json).expect("profile should parse");

        assert_eq!(user.id, "7");
        assert_eq!(user.avatar.as_deref(), Some("ana.png"));
        assert_eq!(user.extra.get("created_at"), Some(&Value::from("2024-01-02")));

        let written = serde_json::to_value(&user).expect("profile should serialize");
        assert_eq!(written["created_at"], "2024-01-02");
        assert_eq!(written["id"], "7");
    }

    #[test]
    fn test_with_name_replaces_only_name() {
        let mut user = UserProfile::new("1", "A", "a@x.com");
        user.avatar = Some("a.png".to_string());

        let renamed = user.with_name("B");
        assert_eq!(renamed.name, "B");
        assert_eq!(renamed.email, "a@x.com");
        assert_eq!(renamed.avatar.as_deref(), Some("a.png"));
    }
}
