//! This module contains errors pertaining to the interpretation of walked
//! method bodies by the dialect inspectors, and to the linking of their output.

use thiserror::Error;

/// Errors that occur while recovering the schema of a single type.
///
/// All of these are fatal for the type being decompiled, but never for the
/// extraction as a whole.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("A field write was seen with no pending tag bytes")]
    EmptyTagBuffer,

    #[error("The pending tag bytes {bytes:02x?} do not form a terminated varint")]
    UnterminatedTag { bytes: Vec<u8> },

    #[error("Only {consumed:?} of the pending tag bytes {bytes:02x?} were consumed by the tag")]
    TrailingTagBytes { consumed: usize, bytes: Vec<u8> },

    #[error("The tag byte written by `{rendered}` is not a byte literal")]
    NonLiteralTagByte { rendered: String },

    #[error("Could not recover the field written by `{rendered}`")]
    UnrecognizedFieldAccess { rendered: String },

    #[error("The written field {name:?} has no backing property")]
    UnknownProperty { name: String },

    #[error("The field number {index:?} has no entry in the field name table")]
    UnknownFieldIndex { index: i64 },

    #[error("The method {name}/{parameters} is required but was not found")]
    MissingMethod { name: String, parameters: usize },

    #[error("The method {name} has no body to walk")]
    MissingBody { name: String },

    #[error("The type does not match any known generator dialect")]
    NoMatchingDialect,

    #[error("The type was referenced but is not defined in the module")]
    UnknownType,

    #[error("The property {property:?} has no field number constant")]
    MissingFieldNumber { property: String },

    #[error("The tag {tag:?} is used by both {first:?} and {second:?}")]
    DuplicateTag {
        tag:    u32,
        first:  String,
        second: String,
    },

    #[error("Enums stored as {storage:?} are not supported")]
    UnsupportedEnumStorage { storage: String },

    #[error("The enum member {member:?} has no constant value")]
    NonConstantEnumMember { member: String },

    #[error("Could not recover the full name of the service")]
    MissingServiceName,

    #[error("The extension field {field:?} does not reference a message")]
    ExtensionWithoutPackage { field: String },

    #[error("The extension field {field:?} targets {target}, which may not be extended")]
    DeniedExtensionTarget { field: String, target: String },

    #[error("The extension field {field:?} targets {target}, which was not decompiled")]
    UnknownExtensionTarget { field: String, target: String },
}

/// The result type for inspection operations.
pub type Result<T> = std::result::Result<T, Error>;
