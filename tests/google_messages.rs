//! This module tests the recovery of messages emitted by the two Google
//! generators, driven through the whole extractor.
#![cfg(test)]

use proto_schema_extractor::{
    metadata::{
        instruction::{ArgumentRef, Opcode},
        FieldDef,
        FieldRef,
        MethodRef,
        TypeDef,
        TypeSig,
    },
    schema::{Label, TypeRef, WireKind},
};

mod common;

const ATTRIBUTE: &str = "bnet.protocol.Attribute";
const VARIANT: &str = "bnet.protocol.Variant";

const REPORT: &str = "Blizzard.Telemetry.Report";
const SESSION: &str = "Blizzard.Telemetry.Session";
const LEVEL: &str = "Blizzard.Telemetry.Level";

fn names_field(message: &str) -> FieldRef {
    FieldRef::new(
        TypeSig::new(message),
        "_fieldNames",
        TypeSig::new("System.String[]"),
    )
}

/// Emits the static constructor that fills the field-name table of `message`.
fn name_table(message: &str, names: &[&str]) -> anyhow::Result<Vec<Opcode>> {
    let mut opcodes = vec![
        Opcode::LdcI4(i32::try_from(names.len())?),
        Opcode::Newarr(TypeSig::new("System.String")),
    ];
    for (index, name) in names.iter().enumerate() {
        opcodes.extend([
            Opcode::Dup,
            Opcode::LdcI4(i32::try_from(index)?),
            Opcode::Ldstr((*name).to_string()),
            Opcode::Stelem,
        ]);
    }
    opcodes.extend([Opcode::Stsfld(names_field(message)), Opcode::Ret]);
    Ok(opcodes)
}

/// Emits `if (this.<presence>) output.Write<kind>(number, names[index],
/// this.<property>)`, placed at position `start` of the method body.
fn write_field(
    start: usize,
    message: &str,
    presence: &str,
    (kind, value_type): (&str, &str),
    (number, index): (i32, i32),
    property: &str,
) -> Vec<Opcode> {
    let presence = FieldRef::new(TypeSig::new(message), presence, TypeSig::new("System.Boolean"));
    let write = MethodRef::new(
        TypeSig::new("Google.ProtocolBuffers.ICodedOutputStream"),
        format!("Write{kind}"),
    )
    .instance()
    .with_parameter(TypeSig::new("System.Int32"))
    .with_parameter(TypeSig::new("System.String"))
    .with_parameter(TypeSig::new(value_type));
    let write = vec![
        Opcode::Ldarg(ArgumentRef::Index(1)),
        Opcode::LdcI4(number),
        Opcode::Ldsfld(names_field(message)),
        Opcode::LdcI4(index),
        Opcode::Ldelem,
        Opcode::Ldarg(ArgumentRef::This),
        Opcode::Callvirt(common::getter(message, property, TypeSig::new(value_type))),
        Opcode::Callvirt(write),
    ];

    let mut opcodes = vec![
        Opcode::Ldarg(ArgumentRef::This),
        Opcode::Ldfld(presence),
        Opcode::Brfalse(common::target(start + 3 + write.len())),
    ];
    opcodes.extend(write);
    opcodes
}

fn v1_message(full_name: &str, names: &[&str], write_to: Vec<Opcode>) -> anyhow::Result<TypeDef> {
    let mut ty = common::type_def(full_name);
    ty.base_type = Some(TypeSig::new("Google.ProtocolBuffers.GeneratedMessageLite`2"));
    ty.nested_types.push(format!("{full_name}/Builder"));
    ty.methods = vec![
        common::method(".cctor", &[], true, name_table(full_name, names)?),
        common::method(
            "WriteTo",
            &["Google.ProtocolBuffers.ICodedOutputStream"],
            false,
            write_to,
        ),
    ];
    Ok(ty)
}

fn attribute() -> anyhow::Result<TypeDef> {
    let mut write_to = write_field(
        0,
        ATTRIBUTE,
        "hasName",
        ("String", "System.String"),
        (1, 0),
        "Name",
    );
    write_to.extend(write_field(
        write_to.len(),
        ATTRIBUTE,
        "hasValue",
        ("Message", VARIANT),
        (2, 1),
        "Value",
    ));
    write_to.push(Opcode::Ret);

    let mut ty = v1_message(ATTRIBUTE, &["name", "value"], write_to)?;
    ty.fields.push(FieldDef {
        name:       "value_".into(),
        field_type: TypeSig::new(VARIANT),
        constant:   None,
    });
    Ok(ty)
}

fn variant() -> anyhow::Result<TypeDef> {
    let mut write_to = write_field(
        0,
        VARIANT,
        "hasIntValue",
        ("Int64", "System.Int64"),
        (3, 0),
        "IntValue",
    );
    write_to.push(Opcode::Ret);
    v1_message(VARIANT, &["int_value"], write_to)
}

#[test]
fn recovers_google_v1_messages_from_their_name_tables() -> anyhow::Result<()> {
    let schema = common::new_extractor(vec![attribute()?, variant()?])
        .with_roots([ATTRIBUTE])
        .analyze()?;
    assert_eq!(schema.len(), 2);

    let attribute = schema
        .message(".bnet.protocol.Attribute")
        .ok_or_else(|| anyhow::anyhow!("attribute was not recovered"))?;
    let name = attribute.field("name").ok_or_else(|| anyhow::anyhow!("no name"))?;
    assert_eq!(name.tag, 1);
    assert_eq!(name.kind, WireKind::String);
    assert_eq!(name.label, Label::Optional);

    let value = attribute.field("value").ok_or_else(|| anyhow::anyhow!("no value"))?;
    assert_eq!(value.tag, 2);
    assert_eq!(value.kind, WireKind::Message);
    assert_eq!(
        value.referenced_type.as_ref().and_then(TypeRef::id),
        schema.id_of(".bnet.protocol.Variant")
    );

    let variant = schema
        .message(".bnet.protocol.Variant")
        .ok_or_else(|| anyhow::anyhow!("variant was not recovered"))?;
    let int_value = variant.field("int_value").ok_or_else(|| anyhow::anyhow!("no int_value"))?;
    assert_eq!(int_value.tag, 3);
    assert_eq!(int_value.kind, WireKind::Int64);

    Ok(())
}

fn codec_message(full_name: &str, properties: &[(&str, &str, i64)]) -> TypeDef {
    let mut ty = common::type_def(full_name);
    ty.interfaces.push("Google.Protobuf.IMessage`1".into());
    for (name, property_type, number) in properties {
        ty.properties
            .push(common::property(name, TypeSig::new(*property_type), true));
        ty.fields
            .push(common::constant(&format!("{name}FieldNumber"), *number));
    }
    ty.properties.push(common::property(
        "Parser",
        TypeSig::new("Google.Protobuf.MessageParser`1"),
        false,
    ));
    ty.methods = vec![common::method(
        "WriteTo",
        &["Google.Protobuf.CodedOutputStream"],
        false,
        vec![Opcode::Ret],
    )];
    ty
}

#[test]
fn recovers_google_codec_messages_from_their_declarations() -> anyhow::Result<()> {
    let report = codec_message(REPORT, &[("Session", SESSION, 1), ("Level", LEVEL, 2)]);
    let session = codec_message(SESSION, &[("Offset", "System.Int64", 1)]);
    let level = common::enum_type(LEVEL, &[("Info", 0), ("Error", 1)]);

    let schema = common::new_extractor(vec![report, session, level])
        .with_roots([REPORT])
        .analyze()?;
    assert_eq!(schema.len(), 3);

    let report = schema
        .message(".Blizzard.Telemetry.Report")
        .ok_or_else(|| anyhow::anyhow!("report was not recovered"))?;
    assert_eq!(report.fields.len(), 2);

    let session = report.field("session").ok_or_else(|| anyhow::anyhow!("no session"))?;
    assert_eq!(session.tag, 1);
    assert_eq!(session.kind, WireKind::Message);
    assert_eq!(session.label, Label::Optional);
    assert_eq!(
        session.referenced_type.as_ref().and_then(TypeRef::id),
        schema.id_of(".Blizzard.Telemetry.Session")
    );

    let level = report.field("level").ok_or_else(|| anyhow::anyhow!("no level"))?;
    assert_eq!(level.tag, 2);
    assert_eq!(level.kind, WireKind::Enum);
    assert_eq!(
        level.referenced_type.as_ref().and_then(TypeRef::id),
        schema.id_of(".Blizzard.Telemetry.Level")
    );

    let offset = schema
        .message(".Blizzard.Telemetry.Session")
        .and_then(|m| m.field("offset"))
        .ok_or_else(|| anyhow::anyhow!("no offset"))?;
    assert_eq!(offset.kind, WireKind::Int64);

    let level = schema
        .find(".Blizzard.Telemetry.Level")
        .and_then(|t| t.as_enum())
        .ok_or_else(|| anyhow::anyhow!("level was not recovered"))?;
    assert_eq!(level.values[1].name, "ERROR");

    Ok(())
}
