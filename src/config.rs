use dotenvy::dotenv;
use serde::Deserialize;

fn default_redirect_uri() -> String {
    "http://127.0.0.1:8888/nowify/auth".to_string()
}

/// Spotify application credentials, loaded from `NOWIFY_` prefixed
/// environment variables (a `.env` file is honored).
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
}

impl Credentials {
    pub fn from_env() -> Option<Self> {
        dotenv().ok();

        match envy::prefixed("NOWIFY_").from_env() {
            Ok(value) => Some(value),
            Err(err) => {
                log::error!("Error loading spotify credentials: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_uri_defaults_to_the_local_listener() {
        let credentials: Credentials =
            serde_json::from_str(r#"{"client_id": "abc"}"#).unwrap();
        assert_eq!(credentials.client_id, "abc");
        assert_eq!(credentials.redirect_uri, "http://127.0.0.1:8888/nowify/auth");
    }
}
