pub mod auth;
pub mod pkce;
pub mod response;

use std::collections::HashMap;

use reqwest::StatusCode;

use crate::Error;

pub(crate) static AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
pub(crate) static TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub(crate) static NOW_PLAYING_URL: &str =
    "https://api.spotify.com/v1/me/player/currently-playing";

/// Scope granting read access to the currently playing track.
pub static SCOPES: &str = "user-read-currently-playing";

pub type DefaultResponse = HashMap<String, serde_json::Value>;

/// Status and body of a spotify response, captured before any
/// success/failure decision is made so callers can special case statuses
/// like `204 No Content`.
#[derive(Debug)]
pub struct SpotifyResponse {
    pub status: StatusCode,
    pub body: String,
}

impl SpotifyResponse {
    pub(crate) async fn from_response(response: reqwest::Response) -> Result<Self, Error> {
        let status = response.status();
        let body = String::from_utf8(response.bytes().await?.to_vec())?;
        Ok(SpotifyResponse { status, body })
    }

    /// Convert a non-success response into the error its body describes.
    ///
    /// Token endpoint failures carry `error`/`error_description`; API
    /// failures nest a `message` under `error`.
    pub(crate) fn into_error(self) -> Error {
        if !self.body.is_empty() {
            if let Ok(err_res) = serde_json::from_str::<DefaultResponse>(&self.body) {
                if err_res.contains_key("error_description") {
                    return Error::Auth {
                        code: self.status.as_u16(),
                        error: err_res
                            .get("error")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_owned(),
                        message: err_res
                            .get("error_description")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_owned(),
                    };
                }

                if let Some(message) = err_res
                    .get("error")
                    .and_then(|err| err.as_object())
                    .and_then(|err| err.get("message"))
                    .and_then(|msg| msg.as_str())
                {
                    return Error::Request {
                        code: self.status.as_u16(),
                        message: message.to_owned(),
                    };
                }
            }
        }

        Error::Request {
            code: self.status.as_u16(),
            message: "Failed to make spotify request".to_owned(),
        }
    }
}
