use serde::{Deserialize, Serialize};

/// Access token plus refresh token, opaque to the client.
///
/// Serialized as `{"token": ..., "refreshToken": ...}`. Missing fields read as
/// empty strings, and a pair without an access token is the empty pair.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    #[serde(default)]
    pub token: String,
    #[serde(default, rename = "refreshToken")]
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("token", &if self.token.is_empty() { "<empty>" } else { "<redacted>" })
            .field(
                "refresh_token",
                &if self.refresh_token.is_empty() { "<empty>" } else { "<redacted>" },
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_uses_camel_case_refresh_token() {
        let pair = CredentialPair::new("tok1", "ref1");
        let json = serde_json::to_string(&pair).expect("pair should serialize");
        assert_eq!(json, r#"{"token":"tok1","refreshToken":"ref1"}"#);
    }

    #[test]
    fn test_missing_fields_read_as_empty() {
        let pair: CredentialPair = serde_json::from_str("{}").expect("empty object should parse");
        assert!(pair.is_empty());
        assert_eq!(pair, CredentialPair::default());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", CredentialPair::new("secret-token", "secret-refresh"));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
