//! This module contains the inspector for messages emitted by the
//! `SilentOrbit` `ProtocolBuffer` generator.
//!
//! The generator writes each field as one or more raw tag bytes followed by a
//! call to a `ProtocolParser.Write*` helper (or to a `BinaryWriter` for fixed
//! width values, or to the nested message's own `Serialize`). Defaults are
//! assigned unconditionally at the top of `Deserialize`.

use tracing::warn;

use crate::{
    error::inspection::{Error, Result as InspectionResult},
    inspector::{
        body_of,
        fields::{FieldTable, PartialField},
        mapping::{fixed_kind, primitive_kind},
        rules::{label_for, written_member, LoopFacts},
        Inspection,
        Result,
    },
    metadata::{Module, TypeDef, TypeSig},
    schema::{DefaultValue, Label, MessageDescriptor, TypeDescriptor, TypeRef, WireKind},
    utility::{quote_string_literal, to_lower_under},
    walker::{
        event::CallEvent,
        value::{Literal, SymbolicValue},
        walk,
        Observer,
    },
    wire::TagBuffer,
};

/// The raw single-byte write used to emit tag bytes.
const WRITE_BYTE: &str = "WriteByte";

/// The method whose result is the length prefix of an embedded message.
const SERIALIZED_SIZE: &str = "GetSerializedSize";

/// The serialize method of every message.
const SERIALIZE: &str = "Serialize";

/// The writer whose overloads produce fixed-width values.
const RAW_WRITER: &str = "BinaryWriter";

/// Recovers the message described by `ty`.
///
/// # Errors
///
/// Returns [`Err`] if the message lacks its serialize or deserialize methods,
/// or if they cannot be interpreted.
pub fn inspect(module: &Module, ty: &TypeDef) -> Result<Inspection> {
    let fields = ty
        .properties
        .iter()
        .filter(|p| p.has_setter)
        .map(|p| PartialField::new(&p.name, to_lower_under(&p.name)))
        .collect();
    let mut table = FieldTable::new(fields);
    let mut references = vec![];
    nested_enums(module, ty, &mut references);

    let serialize = body_of(ty, ty.method(SERIALIZE, 2), SERIALIZE, 2)?;
    let mut observer = SerializeObserver {
        module,
        ty,
        table: &mut table,
        references: &mut references,
    };
    walk(serialize, &mut observer)?;

    let deserialize = body_of(ty, ty.method("Deserialize", 3), "Deserialize", 3)?;
    let mut observer = DefaultObserver {
        module,
        ty,
        table: &mut table,
    };
    walk(deserialize, &mut observer)?;

    let message = MessageDescriptor::new(module.type_name(&ty.full_name), table.finish()?);
    Ok(Inspection {
        descriptor: TypeDescriptor::Message(message),
        references,
    })
}

/// Collects the full names of every enum nested, at any depth, in `ty`.
fn nested_enums(module: &Module, ty: &TypeDef, into: &mut Vec<String>) {
    for nested in ty.nested_types.iter().filter_map(|name| module.get(name)) {
        if nested.is_enum {
            into.push(nested.full_name.clone());
        }
        nested_enums(module, nested, into);
    }
}

/// Interprets the calls of the `Serialize(Stream, T)` method.
#[derive(Debug)]
pub struct SerializeObserver<'a> {
    pub module:     &'a Module,
    pub ty:         &'a TypeDef,
    pub table:      &'a mut FieldTable,
    pub references: &'a mut Vec<String>,
}

impl<'a> SerializeObserver<'a> {
    /// Works out the wire kind of a field whose values have the type
    /// `element`, and the type it references if it is a message or enum.
    fn classify(&self, event: &CallEvent, element: &TypeSig) -> (WireKind, Option<String>) {
        let method = &event.method;
        if self.module.is_enum(&element.full_name) {
            return (WireKind::Enum, Some(element.full_name.clone()));
        }
        if method.name == SERIALIZE {
            return (WireKind::Message, Some(method.declaring_type.full_name.clone()));
        }

        let kind = if method.declaring_type.name == RAW_WRITER {
            event.parameter_type_name(1).and_then(fixed_kind)
        } else {
            primitive_kind(&element.name)
        };
        let kind = kind.unwrap_or_else(|| {
            warn!(
                type_name = %self.ty.full_name,
                value_type = %element.full_name,
                call = %event.rendered,
                "Unresolved wire kind"
            );
            WireKind::Invalid
        });

        (kind, None)
    }
}

impl<'a> Observer for SerializeObserver<'a> {
    fn on_call(&mut self, event: &CallEvent, tags: &mut TagBuffer) -> InspectionResult<()> {
        let method = &event.method;
        if method.name == WRITE_BYTE {
            let byte = event
                .argument(1)
                .and_then(SymbolicValue::as_int)
                .and_then(|b| u8::try_from(b).ok())
                .ok_or_else(|| Error::NonLiteralTagByte {
                    rendered: event.rendered.clone(),
                })?;
            tags.push(byte);
            return Ok(());
        }
        if event.arguments.iter().any(|a| a.mentions_call(SERIALIZED_SIZE)) {
            return Ok(());
        }
        if !method.name.starts_with("Write") && method.name != SERIALIZE {
            return Ok(());
        }

        let facts = LoopFacts::new(&event.conditions);
        if facts.is_size_prewrite() {
            return Ok(());
        }

        let tag = tags.take_tag()?;
        let label = label_for(&facts, &event.conditions, Label::Required);
        let property = if label == Label::Repeated {
            facts.collection_property()
        } else {
            event.argument(1).and_then(written_member)
        }
        .ok_or_else(|| Error::UnrecognizedFieldAccess {
            rendered: event.rendered.clone(),
        })?;

        let unknown = || Error::UnknownProperty {
            name: property.to_string(),
        };
        let definition = self.ty.property(property).ok_or_else(unknown)?;
        let element = if label == Label::Repeated {
            definition.property_type.element()
        } else {
            &definition.property_type
        };
        let (kind, reference) = self.classify(event, element);
        let referenced_type = reference
            .as_deref()
            .map(|r| TypeRef::Placeholder(self.module.type_name(r)));

        let field = self.table.get_mut(property).ok_or_else(unknown)?;
        field.tag = Some(tag.field_number());
        field.label = label;
        field.packed = facts.is_packed();
        field.kind = kind;
        field.referenced_type = referenced_type;
        self.references.extend(reference);

        Ok(())
    }
}

/// Interprets the calls of the `Deserialize(Stream, T, long)` method, which
/// assigns field defaults before reading from the stream.
#[derive(Debug)]
pub struct DefaultObserver<'a> {
    pub module: &'a Module,
    pub ty:     &'a TypeDef,
    pub table:  &'a mut FieldTable,
}

impl<'a> DefaultObserver<'a> {
    /// Renders the default that a setter call assigns, if it assigns a
    /// constant.
    fn default_value(&self, event: &CallEvent, property: &str) -> Option<DefaultValue> {
        let value = event.argument(1)?;
        let is_enum = self
            .ty
            .property(property)
            .is_some_and(|p| self.module.is_enum(&p.property_type.full_name));

        if let Some(text) = value.as_str() {
            return Some(DefaultValue::Literal(quote_string_literal(text)));
        }
        if is_empty_string(value) {
            return Some(DefaultValue::Literal(quote_string_literal("")));
        }
        if let SymbolicValue::Literal(Literal::Float(float)) = value {
            return Some(DefaultValue::Literal(float.to_string()));
        }

        let integer = value.as_int()?;
        let default = if is_enum {
            DefaultValue::EnumValue(integer)
        } else if event.parameter_type_name(1) == Some("Boolean") {
            DefaultValue::Literal((integer != 0).to_string())
        } else {
            DefaultValue::Literal(integer.to_string())
        };

        Some(default)
    }
}

impl<'a> Observer for DefaultObserver<'a> {
    fn on_call(&mut self, event: &CallEvent, _: &mut TagBuffer) -> InspectionResult<()> {
        if !event.conditions.is_empty() {
            return Ok(());
        }
        let Some(property) = event.method.name.strip_prefix("set_") else {
            return Ok(());
        };
        if let Some(default) = self.default_value(event, property) {
            self.table.set_default(property, default);
        }

        Ok(())
    }
}

/// Checks if `value` reads the `String.Empty` sentinel.
fn is_empty_string(value: &SymbolicValue) -> bool {
    matches!(
        value,
        SymbolicValue::FieldAccess { base: None, field }
            if field.name == "Empty" && field.declaring_type.full_name == "System.String"
    )
}
