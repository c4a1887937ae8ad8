use rollcall_core::{RegistrationState, TransitionError, ValidationError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("registration already in progress ({0:?})")]
    Busy(RegistrationState),
    #[error("capture session has shut down")]
    ChannelClosed,
}

impl From<TransitionError> for EngineError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Validation(v) => EngineError::Validation(v),
            TransitionError::InvalidState { state, .. } => EngineError::Busy(state),
        }
    }
}
