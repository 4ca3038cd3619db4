//! This module contains the recovery of enums, which needs no method walks as
//! every member is a literal field of the enum type.

use crate::{
    constant::ENUM_STORAGE_FIELD,
    error::inspection::{Error, Result},
    inspector::Inspection,
    metadata::{Module, TypeDef},
    schema::{EnumDescriptor, EnumValue, TypeDescriptor},
    utility::to_upper_snake,
};

/// Recovers the enum described by `ty`.
///
/// # Errors
///
/// Returns [`Err`] if the enum is stored as anything but a 32-bit integer, or
/// if one of its members has no constant value.
pub fn inspect(module: &Module, ty: &TypeDef) -> Result<Inspection> {
    let storage = ty
        .enum_storage()
        .map_or("<missing>", |storage| storage.name.as_str());
    let unsigned = match storage {
        "Int32" => false,
        "UInt32" => true,
        other => {
            return Err(Error::UnsupportedEnumStorage {
                storage: other.to_string(),
            })
        }
    };

    let values = ty
        .fields
        .iter()
        .filter(|field| field.name != ENUM_STORAGE_FIELD)
        .map(|field| {
            let constant = field.constant.ok_or_else(|| Error::NonConstantEnumMember {
                member: field.name.clone(),
            })?;
            Ok(EnumValue {
                name:  to_upper_snake(&field.name),
                value: narrow(constant, unsigned),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let descriptor = TypeDescriptor::Enum(EnumDescriptor {
        name: module.type_name(&ty.full_name),
        values,
    });
    let references = vec![];

    Ok(Inspection {
        descriptor,
        references,
    })
}

/// Narrows a member constant to the 32 bits that protobuf enums hold,
/// reinterpreting the bits of unsigned constants.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn narrow(constant: i64, unsigned: bool) -> i32 {
    if unsigned {
        constant as u32 as i32
    } else {
        constant as i32
    }
}

#[cfg(test)]
mod test {
    use crate::{
        error::inspection::Error,
        inspector::enumeration::inspect,
        metadata::{FieldDef, Module, TypeDef, TypeSig},
        schema::{EnumValue, TypeDescriptor},
    };

    fn enum_type(storage: &str, members: &[(&str, Option<i64>)]) -> TypeDef {
        let mut fields = vec![FieldDef {
            name:       "value__".into(),
            field_type: TypeSig::new(format!("System.{storage}")),
            constant:   None,
        }];
        fields.extend(members.iter().map(|(name, constant)| FieldDef {
            name:       (*name).to_string(),
            field_type: TypeSig::new("PegasusShared.CardState"),
            constant:   *constant,
        }));

        TypeDef {
            full_name: "PegasusShared.CardState".into(),
            namespace: "PegasusShared".into(),
            name: "CardState".into(),
            declaring_type: None,
            is_enum: true,
            base_type: Some(TypeSig::new("System.Enum")),
            interfaces: vec![],
            nested_types: vec![],
            properties: vec![],
            fields,
            methods: vec![],
        }
    }

    #[test]
    fn members_become_upper_snake_values() -> anyhow::Result<()> {
        let ty = enum_type("Int32", &[("NotPlayed", Some(0)), ("IN_HAND", Some(2))]);
        let module = Module::new(vec![ty.clone()]);
        let inspection = inspect(&module, &ty)?;

        let TypeDescriptor::Enum(descriptor) = inspection.descriptor else {
            anyhow::bail!("expected an enum");
        };
        assert_eq!(descriptor.name.to_string(), ".PegasusShared.CardState");
        assert_eq!(descriptor.values, vec![
            EnumValue {
                name:  "NOT_PLAYED".into(),
                value: 0,
            },
            EnumValue {
                name:  "IN_HAND".into(),
                value: 2,
            },
        ]);

        Ok(())
    }

    #[test]
    fn unsigned_storage_is_reinterpreted() -> anyhow::Result<()> {
        let ty = enum_type("UInt32", &[("Max", Some(0xFFFF_FFFF))]);
        let module = Module::new(vec![ty.clone()]);
        let inspection = inspect(&module, &ty)?;

        let first = inspection.descriptor.as_enum().map(|e| e.values[0].value);
        assert_eq!(first, Some(-1));

        Ok(())
    }

    #[test]
    fn wide_storage_is_rejected() -> anyhow::Result<()> {
        let ty = enum_type("Int64", &[("A", Some(1))]);
        let module = Module::new(vec![ty.clone()]);

        assert_eq!(inspect(&module, &ty), Err(Error::UnsupportedEnumStorage {
            storage: "Int64".into(),
        }));

        Ok(())
    }

    #[test]
    fn members_need_constants() -> anyhow::Result<()> {
        let ty = enum_type("Int32", &[("A", Some(1)), ("B", None)]);
        let module = Module::new(vec![ty.clone()]);

        assert_eq!(inspect(&module, &ty), Err(Error::NonConstantEnumMember {
            member: "B".into(),
        }));

        Ok(())
    }
}
