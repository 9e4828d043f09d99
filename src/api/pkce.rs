use std::sync::Arc;

use base64::Engine;
use sha2::{Digest, Sha256};

use crate::api::auth::{expiry_epoch_ms, now_epoch_ms, StoreKey, TokenGrant, TokenStore};
use crate::api::response::pares;
use crate::api::{SpotifyResponse, AUTHORIZE_URL, SCOPES, TOKEN_URL};
use crate::config::Credentials;
use crate::Error;

/// PKCE verifier/challenge pair. Generated fresh per authorization attempt.
#[derive(Debug, Clone)]
pub struct CodeChallenge {
    pub(crate) verifier: String,
    pub(crate) challenge: String,
}

impl CodeChallenge {
    fn sha256<S: AsRef<[u8]>>(value: S) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(value);
        hasher.finalize().to_vec()
    }

    fn base64encode<S: AsRef<[u8]>>(value: S) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(value)
    }

    pub fn new() -> Self {
        let mut bytes = [0u8; 32];
        getrandom::getrandom(&mut bytes).unwrap();

        let verifier = Self::base64encode(bytes);
        let challenge = Self::base64encode(Self::sha256(&verifier));
        Self {
            verifier,
            challenge,
        }
    }
}

impl Default for CodeChallenge {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the PKCE flow and the persisted access/refresh token pair, producing
/// a valid access token on demand.
pub struct TokenManager {
    credentials: Credentials,
    store: Arc<dyn TokenStore>,
}

impl TokenManager {
    pub fn new(credentials: Credentials, store: Arc<dyn TokenStore>) -> Self {
        Self { credentials, store }
    }

    /// Whether a previous run left an access token behind.
    pub fn has_persisted_token(&self) -> bool {
        self.store.get(StoreKey::AccessToken).is_some()
    }

    pub fn authorization_url(
        &self,
        challenge: &str,
    ) -> Result<String, serde_urlencoded::ser::Error> {
        Ok(format!(
            "{AUTHORIZE_URL}?{}",
            serde_urlencoded::to_string([
                ("client_id", self.credentials.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
                ("scope", SCOPES),
                ("code_challenge_method", "S256"),
                ("code_challenge", challenge),
            ])?
        ))
    }

    /// Generate a fresh PKCE pair, persist the verifier so it survives the
    /// redirect round trip, and send the browser to the authorization page.
    ///
    /// Execution resumes when the redirect lands on the callback listener
    /// with an authorization code.
    pub fn begin_authorization(&self) -> Result<(), Error> {
        let code = CodeChallenge::new();
        self.store.set(StoreKey::PkceVerifier, &code.verifier)?;

        let url = self.authorization_url(&code.challenge)?;
        log::info!("opening authorization page: {url}");
        open::that(url)?;
        Ok(())
    }

    /// Exchange an authorization code for the token pair.
    ///
    /// Returns `Ok(false)` without any network call when the code or the
    /// stored verifier is missing, guarding against malformed invocation.
    /// A non-success exchange is logged and surfaced as an error with every
    /// stored key untouched; the caller must not proceed to polling.
    pub async fn complete_authorization(&self, code: Option<&str>) -> Result<bool, Error> {
        let verifier = self.store.get(StoreKey::PkceVerifier);
        let (code, verifier) = match (code, verifier) {
            (Some(code), Some(verifier)) if !code.is_empty() => (code, verifier),
            _ => return Ok(false),
        };

        let body = serde_urlencoded::to_string([
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.credentials.redirect_uri.as_str()),
            ("client_id", self.credentials.client_id.as_str()),
            ("code_verifier", verifier.as_str()),
        ])?;

        let response = reqwest::Client::new()
            .post(TOKEN_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let response = SpotifyResponse::from_response(response).await?;
        if !response.status.is_success() {
            log::error!("token exchange failed: {}", response.body);
            return Err(response.into_error());
        }

        let grant: TokenGrant = pares!(&response.body)?;
        let refresh_token = grant
            .refresh_token
            .ok_or_else(|| Error::custom("token exchange response missing refresh_token"))?;

        self.store.set(StoreKey::RefreshToken, &refresh_token)?;
        self.store.set(StoreKey::AccessToken, &grant.access_token)?;
        self.store.set(
            StoreKey::TokenExpiresAt,
            &expiry_epoch_ms(now_epoch_ms(), grant.expires_in).to_string(),
        )?;
        // The verifier only needed to survive the redirect round trip.
        self.store.clear(StoreKey::PkceVerifier)?;
        Ok(true)
    }

    /// Obtain a new access token with the stored refresh token.
    ///
    /// Spotify does not rotate the refresh token on this grant; only the
    /// access token and expiry are rewritten. A non-success exchange is
    /// logged and leaves the stale token in place.
    pub async fn refresh(&self) -> Result<(), Error> {
        let refresh_token = self
            .store
            .get(StoreKey::RefreshToken)
            .ok_or(Error::NoRefreshToken)?;

        let body = serde_urlencoded::to_string([
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.credentials.client_id.as_str()),
        ])?;

        let response = reqwest::Client::new()
            .post(TOKEN_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let response = SpotifyResponse::from_response(response).await?;
        if !response.status.is_success() {
            log::error!("token refresh failed: {}", response.body);
            return Ok(());
        }

        let grant: TokenGrant = pares!(&response.body)?;
        self.apply_refresh_grant(grant)
    }

    fn apply_refresh_grant(&self, grant: TokenGrant) -> Result<(), Error> {
        self.store.set(StoreKey::AccessToken, &grant.access_token)?;
        self.store.set(
            StoreKey::TokenExpiresAt,
            &expiry_epoch_ms(now_epoch_ms(), grant.expires_in).to_string(),
        )?;
        Ok(())
    }

    /// Current access token, refreshing first when nothing is stored or the
    /// stored expiry has already passed. The expiry was margin-adjusted when
    /// stored, so the comparison here is a strict `now >= expiry`.
    pub async fn valid_access_token(&self) -> Result<String, Error> {
        let expires_at = self
            .store
            .get(StoreKey::TokenExpiresAt)
            .and_then(|ms| ms.parse::<i64>().ok())
            .unwrap_or(0);

        if self.store.get(StoreKey::AccessToken).is_none() || now_epoch_ms() >= expires_at {
            self.refresh().await?;
        }

        self.store
            .get(StoreKey::AccessToken)
            .ok_or(Error::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::MemoryTokenStore;

    fn manager_with_store() -> (TokenManager, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::new());
        let credentials = Credentials {
            client_id: "client".to_string(),
            redirect_uri: "http://127.0.0.1:8888/nowify/auth".to_string(),
        };
        (TokenManager::new(credentials, store.clone()), store)
    }

    fn assert_base64url(value: &str) {
        assert!(!value.contains('+'), "{value} contains '+'");
        assert!(!value.contains('/'), "{value} contains '/'");
        assert!(!value.contains('='), "{value} contains '='");
    }

    #[test]
    fn challenge_is_base64url_sha256_of_verifier() {
        let code = CodeChallenge::new();
        let expected =
            CodeChallenge::base64encode(CodeChallenge::sha256(code.verifier.as_bytes()));
        assert_eq!(code.challenge, expected);
    }

    #[test]
    fn pkce_pair_is_url_safe_without_padding() {
        for _ in 0..16 {
            let code = CodeChallenge::new();
            // 32 random bytes encode to 43 chars without padding
            assert_eq!(code.verifier.len(), 43);
            assert_base64url(&code.verifier);
            assert_base64url(&code.challenge);
        }
    }

    #[test]
    fn fresh_pair_per_attempt() {
        let a = CodeChallenge::new();
        let b = CodeChallenge::new();
        assert_ne!(a.verifier, b.verifier);
    }

    #[test]
    fn authorization_url_carries_the_pkce_parameters() {
        let (manager, _) = manager_with_store();
        let url = manager.authorization_url("challenge-value").unwrap();

        assert!(url.starts_with("https://accounts.spotify.com/authorize?"));
        assert!(url.contains("client_id=client"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("code_challenge=challenge-value"));
        assert!(url.contains("scope=user-read-currently-playing"));
    }

    #[tokio::test]
    async fn complete_authorization_without_code_is_a_no_op() {
        let (manager, store) = manager_with_store();
        store.set(StoreKey::PkceVerifier, "verifier").unwrap();

        assert!(!manager.complete_authorization(None).await.unwrap());
        assert_eq!(store.get(StoreKey::PkceVerifier).as_deref(), Some("verifier"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn complete_authorization_without_verifier_is_a_no_op() {
        let (manager, store) = manager_with_store();

        assert!(!manager.complete_authorization(Some("code")).await.unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn refresh_grant_never_rotates_the_stored_refresh_token() {
        let (manager, store) = manager_with_store();
        store.set(StoreKey::RefreshToken, "original").unwrap();

        for access in ["first", "second"] {
            manager
                .apply_refresh_grant(TokenGrant {
                    access_token: access.to_string(),
                    refresh_token: None,
                    expires_in: 3600,
                })
                .unwrap();

            assert_eq!(store.get(StoreKey::AccessToken).as_deref(), Some(access));
            assert_eq!(store.get(StoreKey::RefreshToken).as_deref(), Some("original"));
            assert!(store.get(StoreKey::TokenExpiresAt).is_some());
        }
    }

    #[tokio::test]
    async fn refresh_with_empty_store_is_a_hard_failure() {
        let (manager, _) = manager_with_store();

        assert!(matches!(
            manager.refresh().await,
            Err(Error::NoRefreshToken)
        ));
    }

    #[tokio::test]
    async fn valid_access_token_surfaces_the_missing_refresh_token() {
        let (manager, _) = manager_with_store();

        assert!(matches!(
            manager.valid_access_token().await,
            Err(Error::NoRefreshToken)
        ));
    }

    #[tokio::test]
    async fn an_expired_token_forces_a_refresh_attempt() {
        let (manager, store) = manager_with_store();
        store.set(StoreKey::AccessToken, "stale").unwrap();
        store.set(StoreKey::TokenExpiresAt, "1").unwrap();

        // The refresh attempt fails fast on the empty refresh token slot,
        // proving the stale token is never handed back untried.
        assert!(matches!(
            manager.valid_access_token().await,
            Err(Error::NoRefreshToken)
        ));
    }

    #[tokio::test]
    async fn an_unexpired_token_is_returned_without_a_refresh() {
        let (manager, store) = manager_with_store();
        let expires_at = now_epoch_ms() + 30_000;
        store.set(StoreKey::AccessToken, "fresh").unwrap();
        store
            .set(StoreKey::TokenExpiresAt, &expires_at.to_string())
            .unwrap();

        // No refresh token is stored, so reaching the network would fail;
        // a fresh expiry short-circuits straight to the stored token.
        assert_eq!(manager.valid_access_token().await.unwrap(), "fresh");
    }
}
