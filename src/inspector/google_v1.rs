//! This module contains the inspector for messages emitted by the
//! protobuf-csharp-port generator.
//!
//! The generator keeps the names of a message's fields in a static string
//! table built by the static constructor, and `WriteTo(ICodedOutputStream)`
//! writes each field through a call of the form
//! `output.Write<Kind>(number, names[i], value)`. The field number is passed
//! as a literal, so no tag bytes need decoding.

use tracing::warn;

use crate::{
    error::inspection::{Error, Result as InspectionResult},
    inspector::{
        body_of,
        fields::{FieldTable, PartialField},
        mapping::literal_kind,
        rules::{has_presence_check, LoopFacts},
        Inspection,
        Result,
    },
    metadata::{Module, TypeDef, TypeSig},
    schema::{Label, MessageDescriptor, TypeDescriptor, TypeRef, WireKind},
    walker::{
        event::{CallEvent, StoreEvent},
        value::SymbolicValue,
        walk,
        Observer,
    },
    wire::TagBuffer,
};

/// The prefix of every field write.
const WRITE: &str = "Write";

/// The prefix of writes of packed repeated fields.
const PACKED: &str = "Packed";

/// The suffix of writes of repeated fields.
const ARRAY: &str = "Array";

/// Recovers the message described by `ty`.
///
/// # Errors
///
/// Returns [`Err`] if the message lacks its static constructor or its
/// serialize method, or if they cannot be interpreted.
pub fn inspect(module: &Module, ty: &TypeDef) -> Result<Inspection> {
    let static_constructor = body_of(ty, ty.static_constructor(), ".cctor", 0)?;
    let mut names = NameTableObserver::default();
    walk(static_constructor, &mut names)?;

    let serialize = body_of(
        ty,
        ty.method_with_signature("WriteTo", &["ICodedOutputStream"]),
        "WriteTo",
        1,
    )?;
    let mut observer = SerializeObserver {
        module,
        ty,
        names: &names.names,
        table: FieldTable::default(),
        references: vec![],
    };
    walk(serialize, &mut observer)?;

    let message = MessageDescriptor::new(module.type_name(&ty.full_name), observer.table.finish()?);
    Ok(Inspection {
        descriptor: TypeDescriptor::Message(message),
        references: observer.references,
    })
}

/// Collects the field-name table from the stores of a static constructor.
#[derive(Clone, Debug, Default)]
pub struct NameTableObserver {
    /// The slots of the first string array stored to a static field.
    pub names: Vec<Option<String>>,

    found: bool,
}

impl Observer for NameTableObserver {
    fn on_call(&mut self, _: &CallEvent, _: &mut TagBuffer) -> InspectionResult<()> {
        Ok(())
    }

    fn on_store(&mut self, event: &StoreEvent) -> InspectionResult<()> {
        let SymbolicValue::OpenArray(array) = &event.value else {
            return Ok(());
        };
        if self.found || event.receiver.is_some() || array.element_type != "String" {
            return Ok(());
        }

        self.names = array
            .slots()
            .iter()
            .map(|slot| slot.as_ref().and_then(SymbolicValue::as_str).map(ToString::to_string))
            .collect();
        self.found = true;

        Ok(())
    }
}

/// Interprets the calls of the `WriteTo(ICodedOutputStream)` method.
#[derive(Debug)]
pub struct SerializeObserver<'a> {
    pub module:     &'a Module,
    pub ty:         &'a TypeDef,
    pub names:      &'a [Option<String>],
    pub table:      FieldTable,
    pub references: Vec<String>,
}

impl<'a> SerializeObserver<'a> {
    /// Looks up the field name selected by the name-table element `value`.
    fn field_name(&self, event: &CallEvent) -> InspectionResult<&'a str> {
        let unrecognized = || Error::UnrecognizedFieldAccess {
            rendered: event.rendered.clone(),
        };
        let SymbolicValue::Element { index, .. } = event.argument(2).ok_or_else(unrecognized)?
        else {
            return Err(unrecognized());
        };
        let index = index.as_int().ok_or_else(unrecognized)?;
        usize::try_from(index)
            .ok()
            .and_then(|i| self.names.get(i))
            .and_then(Option::as_deref)
            .ok_or(Error::UnknownFieldIndex { index })
    }

    /// Finds the type that a message or enum field named `name` refers to.
    ///
    /// Generic writes name the type directly. Otherwise the type is taken
    /// from the shortest declared field whose name contains the field name.
    fn referenced_type(&self, event: &CallEvent, name: &str, repeated: bool) -> Option<TypeSig> {
        if let Some(argument) = event.method.generic_arguments.first() {
            return Some(argument.clone());
        }

        let wanted = name.to_lowercase().replace('_', "");
        let field_type = self
            .ty
            .fields
            .iter()
            .filter(|f| !f.name.starts_with("has") && !f.name.contains("Number"))
            .filter(|f| f.name.to_lowercase().contains(&wanted))
            .min_by_key(|f| f.name.len())
            .map(|f| &f.field_type)?;

        if repeated {
            Some(field_type.element().clone())
        } else {
            Some(field_type.clone())
        }
    }
}

impl<'a> Observer for SerializeObserver<'a> {
    fn on_call(&mut self, event: &CallEvent, _: &mut TagBuffer) -> InspectionResult<()> {
        let method = &event.method;
        let Some(kind_name) = method.name.strip_prefix(WRITE) else {
            return Ok(());
        };
        if kind_name == "Until" || kind_name.starts_with("To") {
            return Ok(());
        }
        let Some(number) = event.argument(1).and_then(SymbolicValue::as_int) else {
            return Ok(());
        };

        let name = self.field_name(event)?;
        let (packed, kind_name) = match kind_name.strip_prefix(PACKED) {
            Some(rest) => (true, rest),
            None => (false, kind_name),
        };
        let (array, kind_name) = match kind_name.strip_suffix(ARRAY) {
            Some(rest) => (true, rest),
            None => (false, kind_name),
        };

        let facts = LoopFacts::new(&event.conditions);
        let label = if array || facts.has_length_test() {
            Label::Repeated
        } else if has_presence_check(&event.conditions) {
            Label::Optional
        } else {
            Label::Required
        };

        let mut field = PartialField::new(name, name);
        field.label = label;
        field.packed = packed;
        field.tag = u32::try_from(number).ok();
        field.kind = match literal_kind(kind_name) {
            Some(kind) => kind,
            None => {
                let reference = self.referenced_type(event, name, label == Label::Repeated);
                let kind = match (kind_name, &reference) {
                    (_, Some(r)) if self.module.is_enum(&r.full_name) => WireKind::Enum,
                    ("Enum", _) => WireKind::Enum,
                    ("Message" | "Group", _) => WireKind::Message,
                    _ => {
                        warn!(
                            type_name = %self.ty.full_name,
                            field = %name,
                            call = %event.rendered,
                            "Unresolved wire kind"
                        );
                        WireKind::Invalid
                    }
                };
                match reference {
                    Some(reference) if kind.is_reference() => {
                        field.referenced_type =
                            Some(TypeRef::Placeholder(self.module.type_name(&reference.full_name)));
                        self.references.push(reference.full_name);
                    }
                    _ => {}
                }
                kind
            }
        };
        self.table.push(field);

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::{
        inspector::google_v1::inspect,
        metadata::{
            instruction::{ArgumentRef, MethodBody, Opcode},
            FieldDef,
            FieldRef,
            MethodDef,
            MethodRef,
            Module,
            Parameter,
            TypeDef,
            TypeSig,
        },
        schema::{Label, TypeDescriptor, WireKind},
    };

    const MESSAGE: &str = "bnet.protocol.Attribute";

    fn names_field() -> FieldRef {
        FieldRef::new(
            TypeSig::new(MESSAGE),
            "_attributeFieldNames",
            TypeSig::new("System.String[]"),
        )
    }

    fn static_constructor(names: &[&str]) -> MethodBody {
        let mut opcodes = vec![
            Opcode::LdcI4(i32::try_from(names.len()).unwrap_or_default()),
            Opcode::Newarr(TypeSig::new("System.String")),
        ];
        for (index, name) in names.iter().enumerate() {
            opcodes.extend([
                Opcode::Dup,
                Opcode::LdcI4(i32::try_from(index).unwrap_or_default()),
                Opcode::Ldstr((*name).to_string()),
                Opcode::Stelem,
            ]);
        }
        opcodes.extend([Opcode::Stsfld(names_field()), Opcode::Ret]);
        MethodBody::sequential(opcodes)
    }

    fn write(kind: &str, value_type: &str) -> MethodRef {
        MethodRef::new(
            TypeSig::new("Google.ProtocolBuffers.ICodedOutputStream"),
            format!("Write{kind}"),
        )
        .instance()
        .with_parameter(TypeSig::new("System.Int32"))
        .with_parameter(TypeSig::new("System.String"))
        .with_parameter(TypeSig::new(value_type))
    }

    /// Emits `output.Write<kind>(number, names[index], this.<getter>)`.
    fn write_field(
        kind: &str,
        value_type: &str,
        number: i32,
        index: i32,
        getter: &str,
    ) -> Vec<Opcode> {
        let getter = MethodRef::new(TypeSig::new(MESSAGE), getter)
            .instance()
            .returning(TypeSig::new(value_type));
        vec![
            Opcode::Ldarg(ArgumentRef::Index(1)),
            Opcode::LdcI4(number),
            Opcode::Ldsfld(names_field()),
            Opcode::LdcI4(index),
            Opcode::Ldelem,
            Opcode::Ldarg(ArgumentRef::This),
            Opcode::Callvirt(getter),
            Opcode::Callvirt(write(kind, value_type)),
        ]
    }

    fn message(write_to: Vec<Opcode>) -> TypeDef {
        let has_name = FieldRef::new(
            TypeSig::new(MESSAGE),
            "hasName",
            TypeSig::new("System.Boolean"),
        );
        let ret = u32::try_from(write_to.len() + 3).unwrap_or_default();
        let mut opcodes = vec![
            Opcode::Ldarg(ArgumentRef::This),
            Opcode::Ldfld(has_name),
            Opcode::Brfalse(ret),
        ];
        opcodes.extend(write_to);
        opcodes.push(Opcode::Ret);
        let body = MethodBody::sequential(opcodes);

        TypeDef {
            full_name:      MESSAGE.into(),
            namespace:      "bnet.protocol".into(),
            name:           "Attribute".into(),
            declaring_type: None,
            is_enum:        false,
            base_type:      Some(TypeSig::new("Google.ProtocolBuffers.GeneratedMessageLite`2")),
            interfaces:     vec![],
            nested_types:   vec![format!("{MESSAGE}/Builder")],
            properties:     vec![],
            fields:         vec![FieldDef {
                name:       "value_".into(),
                field_type: TypeSig::new("bnet.protocol.Variant"),
                constant:   None,
            }],
            methods:        vec![
                MethodDef {
                    name:       ".cctor".into(),
                    parameters: vec![],
                    is_static:  true,
                    body:       Some(static_constructor(&["name", "value"])),
                },
                MethodDef {
                    name:       "WriteTo".into(),
                    parameters: vec![Parameter {
                        name:           "output".into(),
                        parameter_type: TypeSig::new("Google.ProtocolBuffers.ICodedOutputStream"),
                    }],
                    is_static:  false,
                    body:       Some(body),
                },
            ],
        }
    }

    #[test]
    fn writes_name_fields_through_the_name_table() -> anyhow::Result<()> {
        let mut write_to = write_field("String", "System.String", 1, 0, "get_Name");
        write_to.extend(write_field("Message", "bnet.protocol.Variant", 2, 1, "get_Value"));
        let ty = message(write_to);
        let module = Module::new(vec![ty.clone()]);

        let inspection = inspect(&module, &ty)?;
        let TypeDescriptor::Message(message) = inspection.descriptor else {
            anyhow::bail!("expected a message");
        };

        let name = message.field("name").ok_or_else(|| anyhow::anyhow!("no name field"))?;
        assert_eq!(name.tag, 1);
        assert_eq!(name.kind, WireKind::String);
        assert_eq!(name.label, Label::Optional);

        let value = message.field("value").ok_or_else(|| anyhow::anyhow!("no value field"))?;
        assert_eq!(value.tag, 2);
        assert_eq!(value.kind, WireKind::Message);
        assert_eq!(value.type_text(), ".bnet.protocol.Variant");
        assert_eq!(inspection.references, vec!["bnet.protocol.Variant".to_string()]);

        Ok(())
    }

    #[test]
    fn packed_array_writes_are_repeated() -> anyhow::Result<()> {
        let write_to = write_field(
            "PackedUInt32Array",
            "System.Collections.Generic.IList`1",
            3,
            1,
            "get_ValueList",
        );
        let ty = message(write_to);
        let module = Module::new(vec![ty.clone()]);

        let inspection = inspect(&module, &ty)?;
        let field = inspection
            .descriptor
            .as_message()
            .and_then(|m| m.field("value"))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no value field"))?;

        assert_eq!(field.kind, WireKind::UInt32);
        assert_eq!(field.label, Label::Repeated);
        assert!(field.packed);

        Ok(())
    }
}
