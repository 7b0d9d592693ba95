//! Bearer token attachment and token-scoped cache keys.

use std::hash::{DefaultHasher, Hash, Hasher};

use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};

/// What the current token contributes to one request.
#[derive(Debug, Default)]
pub(crate) struct AuthScope {
    pub(crate) header: Option<(HeaderName, HeaderValue)>,
    /// Hash of the token. Folded into cache and dedup keys so responses never cross tokens.
    pub(crate) fingerprint: Option<u64>,
}

impl super::ApiClient {
    /// Sets the token attached to every subsequent request.
    ///
    /// Responses cached under another token (or none) are not served to later calls.
    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }

    /// Stops attaching a token, e.g. after sign-out.
    pub async fn clear_token(&self) {
        *self.token.write().await = None;
    }

    pub async fn has_token(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Header and key scope for the current token, read under a single lock.
    pub(crate) async fn auth_scope(&self) -> AuthScope {
        let guard = self.token.read().await;
        let Some(token) = guard.as_deref() else {
            return AuthScope::default();
        };

        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let fingerprint = Some(hasher.finish());

        let header = match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                Some((AUTHORIZATION, value))
            }
            Err(_) => {
                tracing::warn!("token is not a valid header value, sending request without it");
                None
            }
        };
        AuthScope { header, fingerprint }
    }
}
