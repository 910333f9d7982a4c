//! Gateway error types.

use thiserror::Error;

use scanward_state::ModelError;

/// Errors returned to gateway callers.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("model writer is not running")]
    Closed,
}

pub type GatewayResult<T> = Result<T, GatewayError>;
