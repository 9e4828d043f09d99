use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use color_eyre::eyre::eyre;
use color_eyre::{Report, Result};
use futures::future::BoxFuture;
use html_to_string_macro::html;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::Service;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedSender;

use crate::Error;

/// Query parameters spotify appends to the redirect.
#[derive(Debug, Deserialize)]
struct AuthCodeResponse {
    code: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
struct Callback {
    path: String,
    tx: UnboundedSender<String>,
}

macro_rules! layout {
    ($($html: tt)*) => {
        layout(html! { $($html)*})
    };
}

impl Callback {
    async fn handler(
        query: Option<&str>,
        result: UnboundedSender<String>,
    ) -> Result<Response<Full<Bytes>>> {
        match query {
            Some(query) => {
                let response: AuthCodeResponse = serde_qs::from_str(query)?;
                if let Some(err) = response.error {
                    result.send(String::new())?;
                    return Err(eyre!(err));
                }

                match response.code {
                    Some(code) => {
                        result.send(code)?;
                        Ok(Response::builder()
                            .body(Full::new(Bytes::from(layout! {
                                <h1>
                                    "Successfully authenticated Nowify with "
                                    <span class="green">"Spotify"</span>
                                </h1>
                                <h3>"This tab may now be closed"</h3>
                            })))
                            .unwrap())
                    }
                    None => {
                        result.send(String::new())?;
                        Err(eyre!("authorization response did not include a code"))
                    }
                }
            }
            None => {
                result.send(String::new())?;
                Err(eyre!("Spotify did not send a response"))
            }
        }
    }
}

impl Service<Request<Incoming>> for Callback {
    type Response = Response<Full<Bytes>>;
    type Error = Report;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        if req.method() == Method::GET && req.uri().path() == self.path {
            let tx = self.tx.clone();
            Box::pin(async move {
                match Callback::handler(req.uri().query(), tx).await {
                    Ok(response) => Ok(response),
                    Err(err) => {
                        log::error!("authorization callback failed: {err:?}");
                        Ok(Response::builder()
                            .status(500)
                            .body(Full::new(Bytes::from(layout! {
                                <h1>"500 Internal Server Error"</h1>
                            })))
                            .unwrap())
                    }
                }
            })
        } else {
            Box::pin(async {
                Ok(Response::builder()
                    .status(404)
                    .body(Full::new(Bytes::from(layout! {
                        <h1>"404 Page not found"</h1>
                    })))
                    .unwrap())
            })
        }
    }
}

/// Split a loopback redirect uri into the address to bind and the request
/// path spotify will hit.
fn parse_redirect(redirect: &str) -> Result<(SocketAddr, String), Error> {
    let invalid = || Error::InvalidRedirect(redirect.to_string());

    let rest = redirect.strip_prefix("http://").ok_or_else(invalid)?;
    let (authority, path) = match rest.split_once('/') {
        Some((authority, path)) => (authority, format!("/{path}")),
        None => (rest, "/".to_string()),
    };

    let (host, port) = authority.split_once(':').ok_or_else(invalid)?;
    let port: u16 = port.parse().map_err(|_| invalid())?;
    let ip: IpAddr = match host {
        "localhost" => IpAddr::V4(Ipv4Addr::LOCALHOST),
        other => other.parse().map_err(|_| invalid())?,
    };

    Ok((SocketAddr::new(ip, port), path))
}

/// Serve the redirect target until the browser comes back with an
/// authorization code. The accept loop is torn down once a code (or an
/// empty result for a denied/malformed callback) arrives.
pub async fn authorization_code(redirect_uri: &str) -> Result<String> {
    let (addr, path) = parse_redirect(redirect_uri)?;
    let listener = TcpListener::bind(addr).await?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let callback = Callback { path, tx };

    let handle = tokio::task::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let io = TokioIo::new(stream);

            let service = callback.clone();
            tokio::task::spawn(async move {
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    log::error!("Error serving connection to spotify callback: {err:?}");
                }
            });
        }
    });

    let code = rx
        .recv()
        .await
        .ok_or(eyre!("authorization callback closed without a code"))?;
    handle.abort();
    Ok(code)
}

fn layout(body: String) -> String {
    html! {
        <html>
            <head>
                <title>"Nowify"</title>
                <style>"
                * {
                    box-sizing: border-box
                }
                html {
                    font-family: Arial;
                    background-color: #191414;
                    color: #FFFFFF
                }
                :is(h1, h3) {
                    text-align: center;
                }
                body {
                    padding: 1.5rem;
                }
                .green {
                    color: #1DB954
                }
                "</style>
            </head>
            <body>
                {body}
            </body>
        </html>
    }
}
