//! This module contains errors pertaining to the symbolic walking of method
//! bodies.

use thiserror::Error;

use crate::error::container;

/// Errors that occur while the [`crate::walker::Walker`] interprets a method
/// body.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("The instruction required {needed:?} stack values but only {available:?} were present")]
    StackUnderflow { needed: usize, available: usize },

    #[error("No instruction exists at offset {offset:?}")]
    MissingInstruction { offset: u32 },
}

/// A walk error with an associated instruction offset.
pub type LocatedError = container::Located<Error>;

/// The result type for operations that may fail while walking.
pub type Result<T> = std::result::Result<T, LocatedError>;
