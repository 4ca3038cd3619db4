//! This module contains the inspector for messages emitted by the
//! `Google.Protobuf` generator for proto3 schemas.
//!
//! Messages of this dialect declare most of their schema outright. Every field
//! is a property whose number is held by a `<Property>FieldNumber` constant,
//! and repeated fields are written through static field codecs whose raw tags
//! reveal their packing. `WriteTo(CodedOutputStream)` only refines the wire
//! kinds of singular fields, as several kinds share a runtime type.

use tracing::warn;

use crate::{
    error::inspection::{Error, Result as InspectionResult},
    inspector::{
        body_of,
        fields::{FieldTable, PartialField},
        mapping::literal_kind,
        rules::written_member,
        Inspection,
        Result,
    },
    metadata::{Module, PropertyDef, TypeDef},
    schema::{Label, MessageDescriptor, TypeDescriptor, TypeRef, WireKind},
    utility::to_lower_under,
    walker::{
        event::{CallEvent, StoreEvent},
        value::SymbolicValue,
        walk,
        Observer,
    },
    wire::{Tag, TagBuffer, WireType},
};

/// The collection type of repeated fields.
const REPEATED_FIELD: &str = "RepeatedField";

/// The suffix of the constants holding field numbers.
const FIELD_NUMBER: &str = "FieldNumber";

/// The prefix and suffix of the static fields holding repeated field codecs.
const CODEC_FIELD: (&str, &str) = ("_repeated_", "_codec");

/// The prefix of the factory methods of field codecs.
const CODEC_FACTORY: &str = "For";

/// The call that writes raw tag bytes.
const WRITE_RAW_TAG: &str = "WriteRawTag";

/// Recovers the message described by `ty`.
///
/// # Errors
///
/// Returns [`Err`] if a field has no field number constant, if the message
/// lacks its serialize method, or if its methods cannot be interpreted.
pub fn inspect(module: &Module, ty: &TypeDef) -> Result<Inspection> {
    let mut table = FieldTable::default();
    let mut references = vec![];
    for property in &ty.properties {
        let Some(label) = label_of(property) else {
            continue;
        };
        let field = declared_field(module, ty, property, label, &mut references)?;
        table.push(field);
    }

    if let Some(body) = ty.static_constructor().and_then(|m| m.body.as_ref()) {
        let mut observer = CodecObserver {
            ty,
            table: &mut table,
        };
        walk(body, &mut observer)?;
    }

    let serialize = body_of(
        ty,
        ty.method_with_signature("WriteTo", &["CodedOutputStream"]),
        "WriteTo",
        1,
    )?;
    let mut observer = SerializeObserver {
        ty,
        table: &mut table,
    };
    walk(serialize, &mut observer)?;

    let message = MessageDescriptor::new(module.type_name(&ty.full_name), table.finish()?);
    Ok(Inspection {
        descriptor: TypeDescriptor::Message(message),
        references,
    })
}

/// Works out the label of the field backed by `property`, if the property
/// backs a field at all.
///
/// Proto3 has no required fields, so every settable property is optional.
/// Repeated fields are exposed as read-only `RepeatedField<T>` properties.
fn label_of(property: &PropertyDef) -> Option<Label> {
    let ty = &property.property_type;
    if property.has_setter {
        Some(Label::Optional)
    } else if ty.base_name() == REPEATED_FIELD && !ty.generic_arguments.is_empty() {
        Some(Label::Repeated)
    } else {
        None
    }
}

/// Builds the field backed by `property` from its declaration alone.
fn declared_field(
    module: &Module,
    ty: &TypeDef,
    property: &PropertyDef,
    label: Label,
    references: &mut Vec<String>,
) -> InspectionResult<PartialField> {
    let constant = format!("{}{FIELD_NUMBER}", property.name);
    let tag = ty
        .field(&constant)
        .and_then(|f| f.constant)
        .and_then(|c| u32::try_from(c).ok())
        .ok_or_else(|| Error::MissingFieldNumber {
            property: property.name.clone(),
        })?;

    let element = property.property_type.element();
    let mut field = PartialField::new(&property.name, to_lower_under(&property.name));
    field.label = label;
    field.tag = Some(tag);
    field.kind = match literal_kind(&element.name) {
        Some(kind) => kind,
        None => {
            let placeholder = TypeRef::Placeholder(module.type_name(&element.full_name));
            field.referenced_type = Some(placeholder);
            references.push(element.full_name.clone());
            if module.is_enum(&element.full_name) {
                WireKind::Enum
            } else {
                WireKind::Message
            }
        }
    };

    Ok(field)
}

/// Interprets the stores of the static constructor, which creates the codecs
/// of repeated fields.
#[derive(Debug)]
pub struct CodecObserver<'a> {
    pub ty:    &'a TypeDef,
    pub table: &'a mut FieldTable,
}

impl<'a> Observer for CodecObserver<'a> {
    fn on_call(&mut self, _: &CallEvent, _: &mut TagBuffer) -> InspectionResult<()> {
        Ok(())
    }

    fn on_store(&mut self, event: &StoreEvent) -> InspectionResult<()> {
        let (prefix, suffix) = CODEC_FIELD;
        let Some(name) = event
            .field
            .name
            .strip_prefix(prefix)
            .and_then(|n| n.strip_suffix(suffix))
        else {
            return Ok(());
        };
        let Some(call) = event.value.as_call() else {
            return Ok(());
        };
        let Some(kind_name) = call.method.name.strip_prefix(CODEC_FACTORY) else {
            return Ok(());
        };
        let Some(raw) = call
            .arguments
            .first()
            .and_then(SymbolicValue::as_int)
            .and_then(|raw| u64::try_from(raw).ok())
        else {
            return Ok(());
        };

        let tag = Tag::new(raw);
        let Some(field) = self
            .ty
            .properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .and_then(|p| self.table.get_mut(&p.name))
        else {
            warn!(
                type_name = %self.ty.full_name,
                codec = %event.field.name,
                "Codec for unknown field"
            );
            return Ok(());
        };

        if let Some(kind) = literal_kind(kind_name) {
            field.kind = kind;
        }
        field.packed =
            tag.wire_type() == Some(WireType::LengthDelimited) && field.kind.is_packable();
        if field.tag != Some(tag.field_number()) {
            warn!(
                field = %field.name,
                codec_tag = tag.field_number(),
                "Codec tag disagrees with the field number"
            );
        }

        Ok(())
    }
}

/// Interprets the calls of the `WriteTo(CodedOutputStream)` method.
#[derive(Debug)]
pub struct SerializeObserver<'a> {
    pub ty:    &'a TypeDef,
    pub table: &'a mut FieldTable,
}

impl<'a> Observer for SerializeObserver<'a> {
    fn on_call(&mut self, event: &CallEvent, tags: &mut TagBuffer) -> InspectionResult<()> {
        let method = &event.method;
        if method.name == WRITE_RAW_TAG {
            for argument in event.arguments.iter().skip(1) {
                let byte = argument
                    .as_int()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| Error::NonLiteralTagByte {
                        rendered: event.rendered.clone(),
                    })?;
                tags.push(byte);
            }
            return Ok(());
        }
        let Some(kind_name) = method.name.strip_prefix("Write") else {
            return Ok(());
        };
        if kind_name.starts_with("To") {
            return Ok(());
        }

        let property = event
            .argument(1)
            .and_then(written_member)
            .ok_or_else(|| Error::UnrecognizedFieldAccess {
                rendered: event.rendered.clone(),
            })?;
        let field = self
            .table
            .get_mut(property)
            .ok_or_else(|| Error::UnknownProperty {
                name: property.to_string(),
            })?;

        if !tags.is_empty() {
            let tag = tags.take_tag()?;
            if field.tag != Some(tag.field_number()) {
                warn!(
                    type_name = %self.ty.full_name,
                    field = %field.name,
                    written_tag = tag.field_number(),
                    "Written tag disagrees with the field number"
                );
            }
        }
        if let Some(kind) = literal_kind(kind_name) {
            field.kind = kind;
        }

        Ok(())
    }
}
