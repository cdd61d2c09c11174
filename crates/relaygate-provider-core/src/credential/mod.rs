mod model_unavailable_queue;
mod pool;
mod state;
mod unavailable_queue;

pub use pool::{AcquireError, CredentialPool};
pub use state::{CredentialId, CredentialState, UnavailableReason};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Credential {
    OpenAI(ApiKeyCredential),
    Claude(ApiKeyCredential),
    AIStudio(ApiKeyCredential),
    VertexExpress(ApiKeyCredential),
    Vertex(ServiceAccountCredential),
    GeminiCli(GeminiCliCredential),
    ClaudeCode(ClaudeCodeCredential),
    Codex(CodexCredential),
    Antigravity(AntigravityCredential),
    Nvidia(ApiKeyCredential),
    DeepSeek(ApiKeyCredential),
    Custom(ApiKeyCredential),
}

impl Credential {
    /// Unix-epoch seconds at which the access token expires, for variants that carry
    /// an OAuth-style lifetime. `None` means there is nothing for the token refresher
    /// to act on (API keys, or an unset/zero expiry).
    pub fn expires_at(&self) -> Option<i64> {
        match self {
            Credential::OpenAI(_)
            | Credential::Claude(_)
            | Credential::AIStudio(_)
            | Credential::VertexExpress(_)
            | Credential::Nvidia(_)
            | Credential::DeepSeek(_)
            | Credential::Custom(_) => None,
            Credential::Vertex(c) => Some(c.expires_at).filter(|&t| t > 0),
            Credential::GeminiCli(c) => Some(c.expires_at).filter(|&t| t > 0),
            Credential::ClaudeCode(c) => Some(c.expires_at).filter(|&t| t > 0),
            Credential::Codex(c) => Some(c.expires_at).filter(|&t| t > 0),
            Credential::Antigravity(c) => Some(c.expires_at).filter(|&t| t > 0),
        }
    }

    /// Copies `previous`'s refresh token into `self` when the refresh response didn't
    /// return one. Several providers (Gemini CLI in particular) omit `refresh_token`
    /// on subsequent refreshes, and overwriting a working token with an empty string
    /// would strand the credential at the next expiry.
    pub fn preserve_refresh_token(&mut self, previous: &Credential) {
        match (self, previous) {
            (Credential::GeminiCli(new), Credential::GeminiCli(old))
                if new.refresh_token.is_empty() =>
            {
                new.refresh_token = old.refresh_token.clone();
            }
            (Credential::ClaudeCode(new), Credential::ClaudeCode(old))
                if new.refresh_token.is_empty() =>
            {
                new.refresh_token = old.refresh_token.clone();
            }
            (Credential::Codex(new), Credential::Codex(old)) if new.refresh_token.is_empty() => {
                new.refresh_token = old.refresh_token.clone();
            }
            (Credential::Antigravity(new), Credential::Antigravity(old))
                if new.refresh_token.is_empty() =>
            {
                new.refresh_token = old.refresh_token.clone();
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyCredential {
    pub api_key: String,
}

/// Google Service Account JSON fields used by Vertex.
/// Extra metadata fields are kept for round-trip compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccountCredential {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    pub private_key_id: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_provider_x509_cert_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_x509_cert_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub universe_domain: Option<String>,
    pub access_token: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiCliCredential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub project_id: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodexCredential {
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub account_id: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeCodeCredential {
    #[serde(default, alias = "accessToken")]
    pub access_token: String,
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_claude_1m_sonnet: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_claude_1m_opus: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports_claude_1m_sonnet: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports_claude_1m_opus: Option<bool>,
    #[serde(default, alias = "subscriptionType")]
    pub subscription_type: String,
    #[serde(default, alias = "rateLimitTier")]
    pub rate_limit_tier: String,
    #[serde(default, alias = "sessionKey", skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntigravityCredential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub project_id: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claudecode_allows_session_key_only() {
        let value = serde_json::json!({
            "ClaudeCode": {
                "session_key": "sess_123"
            }
        });
        let cred: Credential = serde_json::from_value(value).expect("credential should parse");
        match cred {
            Credential::ClaudeCode(secret) => {
                assert_eq!(secret.access_token, "");
                assert_eq!(secret.refresh_token, "");
                assert_eq!(secret.expires_at, 0);
                assert_eq!(secret.session_key.as_deref(), Some("sess_123"));
            }
            other => panic!("unexpected credential variant: {other:?}"),
        }
    }

    #[test]
    fn expires_at_is_none_for_api_keys_and_unset_oauth() {
        assert_eq!(
            Credential::OpenAI(ApiKeyCredential {
                api_key: "sk".into()
            })
            .expires_at(),
            None
        );
        assert_eq!(
            Credential::ClaudeCode(ClaudeCodeCredential {
                access_token: "".into(),
                refresh_token: "".into(),
                expires_at: 0,
                enable_claude_1m_sonnet: None,
                enable_claude_1m_opus: None,
                supports_claude_1m_sonnet: None,
                supports_claude_1m_opus: None,
                subscription_type: "".into(),
                rate_limit_tier: "".into(),
                session_key: Some("sess".into()),
                user_email: None,
            })
            .expires_at(),
            None
        );
    }

    #[test]
    fn expires_at_returns_value_when_set() {
        let cred = Credential::GeminiCli(GeminiCliCredential {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: 1_700_000_000,
            project_id: "p".into(),
            client_id: "c".into(),
            client_secret: "s".into(),
            user_email: None,
        });
        assert_eq!(cred.expires_at(), Some(1_700_000_000));
    }

    #[test]
    fn preserve_refresh_token_fills_in_empty_token() {
        let old = Credential::GeminiCli(GeminiCliCredential {
            access_token: "old-access".into(),
            refresh_token: "keep-me".into(),
            expires_at: 100,
            project_id: "p".into(),
            client_id: "c".into(),
            client_secret: "s".into(),
            user_email: None,
        });
        let mut new = Credential::GeminiCli(GeminiCliCredential {
            access_token: "new-access".into(),
            refresh_token: "".into(),
            expires_at: 200,
            project_id: "p".into(),
            client_id: "c".into(),
            client_secret: "s".into(),
            user_email: None,
        });
        new.preserve_refresh_token(&old);
        match new {
            Credential::GeminiCli(c) => {
                assert_eq!(c.refresh_token, "keep-me");
                assert_eq!(c.access_token, "new-access");
            }
            other => panic!("unexpected credential variant: {other:?}"),
        }
    }

    #[test]
    fn preserve_refresh_token_does_not_overwrite_a_returned_token() {
        let old = Credential::Codex(CodexCredential {
            access_token: "old-access".into(),
            refresh_token: "old-refresh".into(),
            id_token: "".into(),
            user_email: None,
            account_id: "acct".into(),
            expires_at: 100,
        });
        let mut new = Credential::Codex(CodexCredential {
            access_token: "new-access".into(),
            refresh_token: "new-refresh".into(),
            id_token: "".into(),
            user_email: None,
            account_id: "acct".into(),
            expires_at: 200,
        });
        new.preserve_refresh_token(&old);
        match new {
            Credential::Codex(c) => assert_eq!(c.refresh_token, "new-refresh"),
            other => panic!("unexpected credential variant: {other:?}"),
        }
    }
}
