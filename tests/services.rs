//! This module tests the recovery of RPC services and of the messages that
//! their RPCs respond with.
#![cfg(test)]

use proto_schema_extractor::{
    metadata::{
        instruction::{ArgumentRef, Opcode},
        MethodRef,
        TypeDef,
        TypeSig,
    },
    schema::{TypeDescriptor, WireKind},
};

mod common;

const SERVICE: &str = "bnet.protocol.game_master.GameMaster";
const RESPONSE: &str = "bnet.protocol.game_master.JoinGameResponse";
const BASE: &str = "bnet.protocol.ServiceDescriptor";

/// Emits the construction of the method descriptor for the RPC `name`.
fn rpc(name: &str, id: i32, response: &str) -> Vec<Opcode> {
    let parser = MethodRef::new(TypeSig::new("bnet.protocol.ProtobufUtil"), "ParseFrom")
        .with_parameter(TypeSig::new("System.Byte[]"))
        .with_generic_argument(TypeSig::new(response));
    let parse_method = MethodRef::new(
        TypeSig::new("bnet.protocol.MethodDescriptor/ParseMethod"),
        ".ctor",
    )
    .instance()
    .with_parameter(TypeSig::new("System.Object"))
    .with_parameter(TypeSig::new("System.IntPtr"));
    let descriptor = MethodRef::new(TypeSig::new("bnet.protocol.MethodDescriptor"), ".ctor")
        .instance()
        .with_parameter(TypeSig::new("System.String"))
        .with_parameter(TypeSig::new("System.Int32"))
        .with_parameter(TypeSig::new("bnet.protocol.MethodDescriptor/ParseMethod"));

    vec![
        Opcode::Ldstr(format!("{SERVICE}.{name}")),
        Opcode::LdcI4(id),
        Opcode::Ldnull,
        Opcode::Ldftn(parser),
        Opcode::Newobj(parse_method),
        Opcode::Newobj(descriptor),
        Opcode::Pop,
    ]
}

fn service() -> TypeDef {
    let base_constructor = MethodRef::new(TypeSig::new(BASE), ".ctor")
        .instance()
        .with_parameter(TypeSig::new("System.String"));
    let mut constructor = vec![
        Opcode::Ldarg(ArgumentRef::This),
        Opcode::Ldstr(SERVICE.into()),
        Opcode::Call(base_constructor),
    ];
    constructor.extend(rpc("JoinGame", 1, RESPONSE));
    constructor.push(Opcode::Ret);

    let mut ty = common::type_def(SERVICE);
    ty.base_type = Some(TypeSig::new(BASE));
    ty.methods = vec![common::method(".ctor", &[], false, constructor)];
    ty
}

fn response() -> TypeDef {
    let mut serialize = common::write_tag(&[0x08]);
    serialize.extend(common::write_property(
        RESPONSE,
        "RequestId",
        "System.UInt64",
        "UInt64",
        "System.UInt64",
    ));
    serialize.push(Opcode::Ret);

    let properties = vec![common::property("RequestId", TypeSig::new("System.UInt64"), true)];
    common::silent_orbit_message(RESPONSE, properties, serialize, vec![Opcode::Ret])
}

#[test]
fn recovers_services_and_their_responses() -> anyhow::Result<()> {
    let schema = common::new_extractor(vec![service(), response()])
        .with_roots([SERVICE])
        .analyze()?;
    assert_eq!(schema.len(), 2);

    let service = schema
        .find(".bnet.protocol.game_master.GameMaster")
        .and_then(TypeDescriptor::as_service)
        .ok_or_else(|| anyhow::anyhow!("service was not recovered"))?;
    assert_eq!(service.rpcs.len(), 1);
    let rpc = &service.rpcs[0];
    assert_eq!(rpc.name, "JoinGame");
    assert_eq!(rpc.method_id, Some(1));
    assert_eq!(rpc.output.to_string(), ".bnet.protocol.game_master.JoinGameResponse");

    let request_id = schema
        .message(".bnet.protocol.game_master.JoinGameResponse")
        .and_then(|m| m.field("request_id"))
        .ok_or_else(|| anyhow::anyhow!("response was not recovered"))?;
    assert_eq!(request_id.tag, 1);
    assert_eq!(request_id.kind, WireKind::UInt64);

    Ok(())
}

#[test]
fn services_share_the_namespace_of_their_messages() -> anyhow::Result<()> {
    let schema = common::new_extractor(vec![service(), response()]).analyze()?;

    let namespaces = schema.namespaces();
    assert_eq!(namespaces.len(), 1);
    assert_eq!(namespaces[0].package, "bnet.protocol.game_master");
    assert_eq!(namespaces[0].types.len(), 2);

    Ok(())
}
