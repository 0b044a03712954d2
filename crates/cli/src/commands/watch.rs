//! `watch`: keep the session alive until interrupted.

use secrecy::ExposeSecret;
use tasty_bites_client::{Navigation, Store};
use tokio::sync::broadcast::error::RecvError;

use super::CliError;

/// Run the expiry watch, reporting session changes, until Ctrl-C or until
/// the session ends.
///
/// # Errors
///
/// Returns an error if the user is not signed in or Ctrl-C cannot be
/// listened for.
pub async fn run(store: &Store) -> Result<(), CliError> {
    if !store.snapshot().is_authenticated() {
        return Err(CliError::NotSignedIn);
    }

    let _watch = store.spawn_expiry_watch();
    let mut navigation = store.api().navigation();
    let mut state = store.subscribe();
    let mut token = current_token(store);

    if let Some(remaining) = store.remaining_display() {
        tracing::info!("Watching session (expires in {remaining}); Ctrl-C to stop");
    }

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Stopped");
                return Ok(());
            }
            nav = navigation.recv() => match nav {
                Ok(Navigation::Login) => {
                    tracing::warn!("Session could not be refreshed; sign in again");
                    return Ok(());
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(()),
            },
            changed = state.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let latest = current_token(store);
                if latest.is_none() {
                    tracing::info!("Session ended");
                    return Ok(());
                }
                if latest != token {
                    token = latest;
                    if let Some(remaining) = store.remaining_display() {
                        tracing::info!("Session refreshed; expires in {remaining}");
                    }
                }
            }
        }
    }
}

fn current_token(store: &Store) -> Option<String> {
    store
        .snapshot()
        .token
        .map(|token| token.expose_secret().to_string())
}
