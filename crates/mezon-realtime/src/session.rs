//! Authenticated session used to open the realtime connection.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::adapter::{AuthParams, Endpoint};

/// Credentials issued by the Mezon API after login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token presented on the connect URL.
    pub token: String,
    /// Token used to obtain a new bearer token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Authenticated user.
    #[serde(default)]
    pub user_id: Option<String>,
    /// API base URL returned with the session. When present, the realtime
    /// gateway lives on the same host.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Creation time, unix seconds.
    pub created_at: u64,
}

impl Session {
    /// Create a session for `token`, stamped with the current time.
    pub fn new(token: impl Into<String>) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self {
            token: token.into(),
            refresh_token: None,
            user_id: None,
            api_url: None,
            created_at,
        }
    }

    /// Set the API URL.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    /// Set the user id.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Gateway endpoint derived from [`api_url`](Self::api_url), if it parses.
    pub fn endpoint(&self) -> Option<Endpoint> {
        let url = Url::parse(self.api_url.as_deref()?).ok()?;
        let use_ssl = matches!(url.scheme(), "https" | "wss");
        let host = url.host_str()?.to_owned();
        let port = url.port_or_known_default()?;
        Some(Endpoint {
            host,
            port,
            use_ssl,
        })
    }

    /// Connect-URL parameters for this session.
    pub fn auth_params(&self, lang: &str, create_status: bool) -> AuthParams {
        AuthParams {
            token: self.token.clone(),
            create_status,
            lang: lang.to_owned(),
        }
    }
}
