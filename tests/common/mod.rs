//! This module contains common utilities for simplifying the writing of
//! integration tests for this library.

#![cfg(test)]

use std::fs;

use anyhow::anyhow;
use proto_schema_extractor as pse;
use proto_schema_extractor::{
    extractor::{Config, InitialExtractor},
    metadata::{
        instruction::{ArgumentRef, MethodBody, Opcode},
        FieldDef,
        MethodDef,
        MethodRef,
        Module,
        Parameter,
        PropertyDef,
        TypeDef,
        TypeSig,
    },
};

/// Constructs a new extractor over a module made of `types`.
///
/// It uses the default configuration for the extractor.
#[allow(unused)] // It is actually
pub fn new_extractor(types: Vec<TypeDef>) -> InitialExtractor {
    pse::new(Module::new(types), Config::default())
}

/// Constructs a new extractor over the JSON module found at `path`, relative
/// to the root of the crate.
///
/// It uses the default configuration for the extractor.
#[allow(unused)] // It is actually
pub fn new_extractor_from_path(path: impl Into<String>) -> anyhow::Result<InitialExtractor> {
    let path = format!("{}/{}", env!("CARGO_MANIFEST_DIR"), path.into());
    let contents = fs::read_to_string(path).map_err(|_| anyhow!("File not available"))?;
    let module = Module::from_json(&contents).map_err(|e| anyhow!("Could not parse module: {e}"))?;

    Ok(pse::new(module, Config::default()))
}

/// Creates an empty type definition for the CIL `full_name`.
///
/// A name containing `/` is a nested type, which has no namespace of its own.
pub fn type_def(full_name: &str) -> TypeDef {
    let (declaring_type, namespace, name) = match full_name.rsplit_once('/') {
        Some((parent, name)) => (Some(parent.to_string()), String::new(), name),
        None => {
            let (namespace, name) = full_name.rsplit_once('.').unwrap_or(("", full_name));
            (None, namespace.to_string(), name)
        }
    };

    TypeDef {
        full_name: full_name.into(),
        namespace,
        name: name.into(),
        declaring_type,
        is_enum: false,
        base_type: Some(TypeSig::new("System.Object")),
        interfaces: vec![],
        nested_types: vec![],
        properties: vec![],
        fields: vec![],
        methods: vec![],
    }
}

/// Creates a property named `name` of type `ty`.
#[allow(unused)] // It is actually
pub fn property(name: &str, ty: TypeSig, has_setter: bool) -> PropertyDef {
    PropertyDef {
        name: name.into(),
        property_type: ty,
        has_setter,
    }
}

/// Creates a field named `name` holding the constant `value`.
#[allow(unused)] // It is actually
pub fn constant(name: &str, value: i64) -> FieldDef {
    FieldDef {
        name:       name.into(),
        field_type: TypeSig::new("System.Int32"),
        constant:   Some(value),
    }
}

/// Creates a method with the provided `parameters` (as full type names) whose
/// body consists of `opcodes` at sequential offsets.
pub fn method(name: &str, parameters: &[&str], is_static: bool, opcodes: Vec<Opcode>) -> MethodDef {
    MethodDef {
        name: name.into(),
        parameters: parameters
            .iter()
            .enumerate()
            .map(|(i, p)| Parameter {
                name:           format!("p{i}"),
                parameter_type: TypeSig::new(*p),
            })
            .collect(),
        is_static,
        body: Some(MethodBody::sequential(opcodes)),
    }
}

/// Creates an enum stored as `Int32` with the provided `members`.
#[allow(unused)] // It is actually
pub fn enum_type(full_name: &str, members: &[(&str, i64)]) -> TypeDef {
    let mut ty = type_def(full_name);
    ty.is_enum = true;
    ty.base_type = Some(TypeSig::new("System.Enum"));
    ty.fields.push(FieldDef {
        name:       "value__".into(),
        field_type: TypeSig::new("System.Int32"),
        constant:   None,
    });
    ty.fields.extend(members.iter().map(|(name, value)| FieldDef {
        name:       (*name).into(),
        field_type: TypeSig::new(full_name),
        constant:   Some(*value),
    }));
    ty
}

/// Creates a reference to the getter of `property` on `declaring`.
#[allow(unused)] // It is actually
pub fn getter(declaring: &str, property: &str, ty: TypeSig) -> MethodRef {
    MethodRef::new(TypeSig::new(declaring), format!("get_{property}"))
        .instance()
        .returning(ty)
}

/// Creates a reference to the setter of `property` on `declaring`.
#[allow(unused)] // It is actually
pub fn setter(declaring: &str, property: &str, ty: TypeSig) -> MethodRef {
    MethodRef::new(TypeSig::new(declaring), format!("set_{property}"))
        .instance()
        .with_parameter(ty)
}

/// Creates a `SilentOrbit` message with the provided serialize and deserialize
/// method bodies.
#[allow(unused)] // It is actually
pub fn silent_orbit_message(
    full_name: &str,
    properties: Vec<PropertyDef>,
    serialize: Vec<Opcode>,
    deserialize: Vec<Opcode>,
) -> TypeDef {
    let mut ty = type_def(full_name);
    ty.interfaces.push("SilentOrbit.ProtocolBuffers.IProtoBuf".into());
    ty.properties = properties;
    ty.methods = vec![
        method("Serialize", &["System.IO.Stream", full_name], true, serialize),
        method(
            "Deserialize",
            &["System.IO.Stream", full_name, "System.Int64"],
            true,
            deserialize,
        ),
    ];
    ty
}

/// Emits `stream.WriteByte(b)` for each of the tag `bytes`, with the stream as
/// the first argument of the enclosing method.
#[allow(unused)] // It is actually
pub fn write_tag(bytes: &[u8]) -> Vec<Opcode> {
    let write_byte = MethodRef::new(TypeSig::new("System.IO.Stream"), "WriteByte")
        .instance()
        .with_parameter(TypeSig::new("System.Byte"));
    bytes
        .iter()
        .flat_map(|&b| {
            [
                Opcode::Ldarg(ArgumentRef::Index(0)),
                Opcode::LdcI4(i32::from(b)),
                Opcode::Callvirt(write_byte.clone()),
            ]
        })
        .collect()
}

/// Creates a reference to the static `ProtocolParser.Write<kind>(Stream, T)`
/// helper, where `value_type` is the full name of `T`.
#[allow(unused)] // It is actually
pub fn protocol_write(kind: &str, value_type: &str) -> MethodRef {
    MethodRef::new(
        TypeSig::new("SilentOrbit.ProtocolBuffers.ProtocolParser"),
        format!("Write{kind}"),
    )
    .with_parameter(TypeSig::new("System.IO.Stream"))
    .with_parameter(TypeSig::new(value_type))
}

/// Emits `ProtocolParser.Write<kind>(stream, instance.<property>)`, with the
/// stream and the instance as the first two arguments of the enclosing method.
#[allow(unused)] // It is actually
pub fn write_property(
    declaring: &str,
    property: &str,
    ty: &str,
    kind: &str,
    value_type: &str,
) -> Vec<Opcode> {
    vec![
        Opcode::Ldarg(ArgumentRef::Index(0)),
        Opcode::Ldarg(ArgumentRef::Index(1)),
        Opcode::Callvirt(getter(declaring, property, TypeSig::new(ty))),
        Opcode::Conv,
        Opcode::Call(protocol_write(kind, value_type)),
    ]
}

/// Converts a position in a list of opcodes to the branch target at that
/// position.
#[allow(unused)] // It is actually
pub fn target(position: usize) -> u32 {
    u32::try_from(position).unwrap_or(u32::MAX)
}
