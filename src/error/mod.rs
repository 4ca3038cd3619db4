//! This module contains the primary error type for the extractor's interface.
//! It also re-exports the more specific error types that are
//! subsystem-specific.

pub mod container;
pub mod inspection;
pub mod walk;

use thiserror::Error;

/// The interface result type for the library.
///
/// # Usage
///
/// Any function considered to be part of the public interface of the library
/// should return this result type. Subsystems should return the more-specific
/// child error types as appropriate.
///
/// Note that _all_ of the library is public in order to facilitate use-cases
/// beyond the ones designed for.
pub type Result<T> = std::result::Result<T, Failures>;

/// The interface error type for the library.
///
/// All errors that can occur while decompiling a single type are members of
/// this enum.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// Errors from walking a method body.
    #[error(transparent)]
    Walk(#[from] walk::Error),

    /// Errors from interpreting the walk of a method body.
    #[error(transparent)]
    Inspection(#[from] inspection::Error),

    /// An unknown error, represented as a string.
    #[error("Unknown Error: {_0:?}")]
    Other(String),
}

impl Error {
    /// Constructs an unknown error with the provided `message`.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Make it possible to attach locations to these errors.
impl container::Locatable for Error {
    type Located = LocatedError;

    fn locate(self, offset: u32) -> Self::Located {
        container::Located {
            location: Some(offset),
            payload:  self,
        }
    }
}

/// A library error with an optional associated instruction offset.
pub type LocatedError = container::Located<Error>;

/// A container of errors that may occur while decompiling a type.
pub type Errors = container::Errors<LocatedError>;

/// Allow simple conversions from located walk errors by re-wrapping the
/// located error around the more general payload.
impl From<walk::LocatedError> for LocatedError {
    fn from(value: walk::LocatedError) -> Self {
        let location = value.location;
        let payload = Error::from(value.payload);
        Self { location, payload }
    }
}

/// Allow simple conversions from located walk errors by re-wrapping the
/// located error around the more general payload in the Errors container.
impl From<walk::LocatedError> for Errors {
    fn from(value: walk::LocatedError) -> Self {
        let re_wrapped: LocatedError = value.into();
        re_wrapped.into()
    }
}

/// Inspection errors raised outside a walk carry no location.
impl From<inspection::Error> for LocatedError {
    fn from(value: inspection::Error) -> Self {
        container::Located::unlocated(Error::from(value))
    }
}

/// Allow simple conversions from unlocated inspection errors into the Errors
/// container.
impl From<inspection::Error> for Errors {
    fn from(value: inspection::Error) -> Self {
        let re_wrapped: LocatedError = value.into();
        re_wrapped.into()
    }
}

/// The failure to decompile a single type, naming that type.
///
/// Failures are recorded by the extractor and never stop it from decompiling
/// the remaining types.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("Failed to decompile {type_name}: {errors}")]
pub struct Failure {
    /// The full name of the type that failed to decompile.
    pub type_name: String,

    /// The errors that caused the failure.
    pub errors: Errors,
}

impl Failure {
    /// Constructs a failure for the type named `type_name`.
    pub fn new(type_name: impl Into<String>, errors: impl Into<Errors>) -> Self {
        let type_name = type_name.into();
        let errors = errors.into();
        Self { type_name, errors }
    }
}

/// A container of the per-type failures that occurred during an extraction.
pub type Failures = container::Errors<Failure>;
