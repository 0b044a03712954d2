//! Session commands: `login`, `logout`, `whoami`.

use secrecy::SecretString;
use tasty_bites_client::{Credentials, Store};
use tasty_bites_core::Email;

use super::CliError;

/// Sign in and persist the session.
///
/// # Errors
///
/// Returns an error for a malformed email, wrong credentials, or a failed
/// request.
pub async fn login(store: &Store, email: &str, password: String) -> Result<(), CliError> {
    let credentials = Credentials {
        email: Email::parse(email).map_err(|e| CliError::invalid("email", e))?,
        password: SecretString::from(password),
    };

    let user = store.login(&credentials).await?;
    tracing::info!("Signed in as {} ({:?})", user.name, user.role);
    if let Some(notice) = store.cart_restore_notice() {
        tracing::info!("{notice}");
    }
    Ok(())
}

pub fn logout(store: &Store) {
    store.logout();
    tracing::info!("Signed out");
}

pub fn whoami(store: &Store) {
    let state = store.snapshot();
    match state.user.as_ref().filter(|_| state.is_authenticated()) {
        Some(user) => {
            tracing::info!(
                "{} <{}> role={:?}",
                user.name,
                user.email.as_deref().unwrap_or("-"),
                user.role
            );
            if let Some(remaining) = store.remaining_display() {
                tracing::info!("Session expires in {remaining}");
            }
        }
        None => tracing::info!("Not signed in"),
    }
}
