//! Clock errors.

use crate::scheduler::RegistrationId;

/// Failures of the clock face and its scheduler.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("unknown numbering base {0:?}; expected sexagesimal, 24, decimal or hexadecimal")]
    UnknownBase(String),
    #[error("registration {0} is already in use")]
    DuplicateRegistration(RegistrationId),
    #[error("clock face must be drawn before it can be started")]
    NotRendered,
    #[error("clock face was already drawn; create a new face to redraw")]
    AlreadyRendered,
}
