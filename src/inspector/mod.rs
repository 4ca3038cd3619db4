//! This module contains the inspectors that recover protobuf types from the
//! code that a generator emitted for them.
//!
//! Each supported generator, or dialect, emits structurally different code for
//! the same wire format. The inspector for a dialect walks the relevant
//! methods of a type with the [`crate::walker`], and interprets the calls and
//! stores that the walk reports in terms of that dialect's idioms.
//!
//! # Dispatch
//!
//! A type is classified into a [`Subject`] by cheap structural tests on its
//! metadata (the interfaces it implements, its base type, and the types it
//! nests). The subject then selects the inspector that runs.

pub mod enumeration;
pub mod fields;
pub mod google_codec;
pub mod google_v1;
pub mod mapping;
pub mod rules;
pub mod service;
pub mod silent_orbit;

use crate::{
    error::{inspection::Error, LocatedError},
    metadata::{instruction::MethodBody, MethodDef, Module, TypeDef},
    schema::TypeDescriptor,
};

/// The result type for inspecting a type.
///
/// Errors raised while walking a method carry the offset of the instruction
/// that caused them.
pub type Result<T> = std::result::Result<T, LocatedError>;

/// The base types that messages of the Google V1 dialect derive from.
const GOOGLE_V1_BASE_TYPES: [&str; 4] = [
    "GeneratedMessageLite`2",
    "ExtendableMessageLite`2",
    "GeneratedMessage`2",
    "ExtendableMessage`2",
];

/// The generators whose message code can be inspected.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Dialect {
    /// The `SilentOrbit` `ProtocolBuffer` generator, whose messages implement
    /// `IProtoBuf`.
    SilentOrbit,

    /// The protobuf-csharp-port generator, whose messages derive from a
    /// generated message base and nest a `Builder`.
    GoogleV1,

    /// The `Google.Protobuf` generator, whose messages implement `IMessage`
    /// and write through field codecs.
    GoogleCodec,
}

impl Dialect {
    /// Detects the dialect of the message type `ty`, if it is a message of
    /// any known dialect.
    #[must_use]
    pub fn detect(ty: &TypeDef) -> Option<Self> {
        if ty.implements("IProtoBuf") {
            return Some(Self::SilentOrbit);
        }
        if ty
            .base_type_name()
            .is_some_and(|base| GOOGLE_V1_BASE_TYPES.contains(&base))
            && ty.has_nested_type("Builder")
        {
            return Some(Self::GoogleV1);
        }
        if ty.implements("IMessage") || ty.implements("IMessage`1") {
            return Some(Self::GoogleCodec);
        }

        None
    }
}

/// What a type turned out to be once classified.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Subject {
    Enum,
    Message(Dialect),

    /// A `SilentOrbit` RPC service descriptor.
    Service,
}

impl Subject {
    /// Classifies `ty`, returning [`None`] if it is not something that the
    /// extractor can recover.
    #[must_use]
    pub fn classify(ty: &TypeDef) -> Option<Self> {
        if ty.is_enum {
            return Some(Self::Enum);
        }
        if let Some(dialect) = Dialect::detect(ty) {
            return Some(Self::Message(dialect));
        }
        if ty.base_type_name() == Some("ServiceDescriptor") {
            return Some(Self::Service);
        }

        None
    }
}

/// The outcome of inspecting a single type.
#[derive(Clone, Debug, PartialEq)]
pub struct Inspection {
    /// The recovered type.
    pub descriptor: TypeDescriptor,

    /// The CIL full names of the types that the recovered type refers to, and
    /// that must be recovered in turn.
    pub references: Vec<String>,
}

/// Recovers the protobuf type described by `ty`.
///
/// # Errors
///
/// Returns [`Err`] if `ty` is not a recoverable type, or if its generated code
/// cannot be interpreted.
pub fn inspect(module: &Module, ty: &TypeDef) -> Result<Inspection> {
    let subject = Subject::classify(ty).ok_or(Error::NoMatchingDialect)?;
    tracing::debug!(type_name = %ty.full_name, ?subject, "Inspecting type");

    match subject {
        Subject::Enum => Ok(enumeration::inspect(module, ty)?),
        Subject::Service => service::inspect(module, ty),
        Subject::Message(Dialect::SilentOrbit) => silent_orbit::inspect(module, ty),
        Subject::Message(Dialect::GoogleV1) => google_v1::inspect(module, ty),
        Subject::Message(Dialect::GoogleCodec) => google_codec::inspect(module, ty),
    }
}

/// Gets the body of the method of `ty` selected by `method`, which is
/// described by `name` and `parameters` for reporting.
fn body_of<'t>(
    ty: &'t TypeDef,
    method: Option<&'t MethodDef>,
    name: &str,
    parameters: usize,
) -> std::result::Result<&'t MethodBody, Error> {
    let method = method.ok_or_else(|| Error::MissingMethod {
        name: name.to_string(),
        parameters,
    })?;
    method.body.as_ref().ok_or_else(|| Error::MissingBody {
        name: format!("{}::{}", ty.full_name, method.name),
    })
}
