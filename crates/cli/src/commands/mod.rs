//! Command implementations.
//!
//! Output goes through `tracing` at info level so it shares the log
//! formatting (and `RUST_LOG` filtering) of everything else.

pub mod account;
pub mod orders;
pub mod shop;
pub mod watch;

use tasty_bites_client::{ApiError, SessionError, TransportError};
use thiserror::Error;

/// Errors surfaced to the user by a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Could not build HTTP client: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Invalid {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    #[error("Not signed in. Run `tb-cli login` first")]
    NotSignedIn,

    #[error("Product {0} is not in the cart")]
    NotInCart(String),

    #[error("Failed to listen for Ctrl-C: {0}")]
    Signal(#[from] std::io::Error),
}

impl CliError {
    pub fn invalid(field: &'static str, reason: impl ToString) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.to_string(),
        }
    }
}
