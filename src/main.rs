use std::sync::Arc;

use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;

use nowify::{
    callback, ui, FileTokenStore, NowPlayingPoller, TokenManager, TokioScheduler,
};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let credentials = nowify::Credentials::from_env()
        .ok_or_eyre("missing spotify credentials; set NOWIFY_CLIENT_ID")?;
    let redirect_uri = credentials.redirect_uri.clone();

    let tokens = TokenManager::new(credentials, Arc::new(FileTokenStore::new()));

    // Without a persisted token the app suspends on the authorization
    // redirect and resumes once the browser lands on the callback listener.
    if !tokens.has_persisted_token() {
        tokens.begin_authorization()?;
        let code = callback::authorization_code(&redirect_uri).await?;
        if !tokens.complete_authorization(Some(&code)).await? {
            return Err(eyre!("authorization callback was missing a code or verifier"));
        }
    }

    let poller = NowPlayingPoller::new(
        tokens,
        Arc::new(TokioScheduler),
        Box::new(ui::render),
    );
    poller.start();

    // Polls run as scheduled tasks; keep the runtime alive until Ctrl-C.
    tokio::signal::ctrl_c().await?;
    Ok(())
}
