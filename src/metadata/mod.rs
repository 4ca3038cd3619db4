//! This module contains the model of the compiled program that the extractor
//! consumes.
//!
//! Reading the binary image is the job of an external reader, which hands the
//! extractor a [`Module`] of fully-resolved type definitions. Every type here
//! can be deserialized so that the reader can live in another process and
//! speak JSON.

pub mod instruction;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    constant::{ENUM_STORAGE_FIELD, NESTED_TYPES_CONTAINER},
    metadata::instruction::MethodBody,
    schema::TypeName,
    utility::strip_generic_arity,
};

/// A reference to a type, as it appears in signatures.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSig {
    /// The full CIL name of the type, with nested types separated by `/`.
    pub full_name: String,

    /// The simple name of the type, e.g. `Int32` or ``List`1``.
    pub name: String,

    /// The generic arguments of the type, if it is an instantiated generic.
    #[serde(default)]
    pub generic_arguments: Vec<TypeSig>,
}

impl TypeSig {
    /// Creates a non-generic type reference from its `full_name`.
    #[must_use]
    pub fn new(full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        let name = full_name
            .rsplit(['.', '/'])
            .next()
            .unwrap_or(&full_name)
            .to_string();
        let generic_arguments = vec![];
        Self {
            full_name,
            name,
            generic_arguments,
        }
    }

    /// Creates an instantiated generic type reference.
    #[must_use]
    pub fn generic(full_name: impl Into<String>, generic_arguments: Vec<TypeSig>) -> Self {
        Self {
            generic_arguments,
            ..Self::new(full_name)
        }
    }

    /// Checks if this is the `System.Void` type.
    #[must_use]
    pub fn is_void(&self) -> bool {
        self.full_name == "System.Void"
    }

    /// Gets the type of the elements of this type if it is a generic
    /// collection, or the type itself otherwise.
    #[must_use]
    pub fn element(&self) -> &TypeSig {
        self.generic_arguments.first().unwrap_or(self)
    }

    /// Gets the simple name without any generic arity marker.
    #[must_use]
    pub fn base_name(&self) -> &str {
        strip_generic_arity(&self.name)
    }
}

/// A declared parameter of a method.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name:           String,
    pub parameter_type: TypeSig,
}

/// A resolved reference to a method, as found in call operands.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodRef {
    /// The type that declares the method.
    pub declaring_type: TypeSig,

    /// The name of the method, e.g. `WriteByte` or `.ctor`.
    pub name: String,

    /// The declared parameters, not including any receiver.
    #[serde(default)]
    pub parameters: Vec<Parameter>,

    /// Whether the method takes a receiver.
    #[serde(default)]
    pub has_this: bool,

    /// The return type of the method.
    pub return_type: TypeSig,

    /// The generic arguments of an instantiated generic method.
    #[serde(default)]
    pub generic_arguments: Vec<TypeSig>,
}

impl MethodRef {
    /// Creates a reference to a static method with no parameters that returns
    /// nothing.
    #[must_use]
    pub fn new(declaring_type: TypeSig, name: impl Into<String>) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            parameters: vec![],
            has_this: false,
            return_type: TypeSig::new("System.Void"),
            generic_arguments: vec![],
        }
    }

    /// Marks the method as taking a receiver.
    #[must_use]
    pub fn instance(mut self) -> Self {
        self.has_this = true;
        self
    }

    /// Appends a parameter of type `parameter_type` to the method.
    #[must_use]
    pub fn with_parameter(mut self, parameter_type: TypeSig) -> Self {
        let name = format!("p{}", self.parameters.len());
        self.parameters.push(Parameter {
            name,
            parameter_type,
        });
        self
    }

    /// Sets the return type of the method.
    #[must_use]
    pub fn returning(mut self, return_type: TypeSig) -> Self {
        self.return_type = return_type;
        self
    }

    /// Appends a generic argument to the method instantiation.
    #[must_use]
    pub fn with_generic_argument(mut self, argument: TypeSig) -> Self {
        self.generic_arguments.push(argument);
        self
    }

    /// Checks if the method is an instance constructor.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor"
    }

    /// Gets the full name of the method in `Type::Method` form.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.declaring_type.full_name, self.name)
    }
}

/// A resolved reference to a field, as found in field access operands.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRef {
    pub declaring_type: TypeSig,
    pub name:           String,
    pub field_type:     TypeSig,
}

impl FieldRef {
    /// Creates a new field reference.
    #[must_use]
    pub fn new(declaring_type: TypeSig, name: impl Into<String>, field_type: TypeSig) -> Self {
        let name = name.into();
        Self {
            declaring_type,
            name,
            field_type,
        }
    }
}

/// A property declared on a type.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDef {
    pub name:          String,
    pub property_type: TypeSig,
    #[serde(default)]
    pub has_setter:    bool,
}

/// A field declared on a type.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub name:       String,
    pub field_type: TypeSig,

    /// The literal value of a constant field.
    #[serde(default)]
    pub constant: Option<i64>,
}

/// A method declared on a type.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDef {
    pub name:       String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub is_static:  bool,

    /// The body of the method, absent for abstract and external methods.
    #[serde(default)]
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// Checks whether this is the static constructor of its type.
    #[must_use]
    pub fn is_static_constructor(&self) -> bool {
        self.name == ".cctor"
    }

    /// Checks whether this is an instance constructor.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor"
    }
}

/// A type defined in the module being analysed.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDef {
    /// The full CIL name, with nested types separated by `/`.
    pub full_name: String,

    /// The namespace of the type, empty for nested types.
    #[serde(default)]
    pub namespace: String,

    /// The simple name of the type.
    pub name: String,

    /// The full name of the type this one is nested inside, if any.
    #[serde(default)]
    pub declaring_type: Option<String>,

    #[serde(default)]
    pub is_enum: bool,

    #[serde(default)]
    pub base_type: Option<TypeSig>,

    /// The full names of the interfaces the type implements.
    #[serde(default)]
    pub interfaces: Vec<String>,

    /// The full names of the types nested inside this one.
    #[serde(default)]
    pub nested_types: Vec<String>,

    #[serde(default)]
    pub properties: Vec<PropertyDef>,

    #[serde(default)]
    pub fields: Vec<FieldDef>,

    #[serde(default)]
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    /// Checks if the type implements an interface with the simple name
    /// `interface`, ignoring its namespace.
    #[must_use]
    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces
            .iter()
            .any(|i| i.rsplit(['.', '/']).next() == Some(interface))
    }

    /// Gets the simple name of the base type, if there is one.
    #[must_use]
    pub fn base_type_name(&self) -> Option<&str> {
        self.base_type.as_ref().map(|t| t.name.as_str())
    }

    /// Gets the method named `name` taking exactly `parameters` parameters.
    #[must_use]
    pub fn method(&self, name: &str, parameters: usize) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.parameters.len() == parameters)
    }

    /// Gets the method named `name` whose parameters have exactly the simple
    /// type names in `parameter_types`.
    #[must_use]
    pub fn method_with_signature(
        &self,
        name: &str,
        parameter_types: &[&str],
    ) -> Option<&MethodDef> {
        self.methods.iter().find(|m| {
            m.name == name
                && m.parameters.len() == parameter_types.len()
                && m.parameters
                    .iter()
                    .zip(parameter_types)
                    .all(|(p, t)| p.parameter_type.name == *t)
        })
    }

    /// Gets the static constructor of the type, if it has one.
    #[must_use]
    pub fn static_constructor(&self) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.is_static_constructor())
    }

    /// Gets the property called `name`.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Gets the field called `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Checks if the type nests a type with the simple name `name`.
    #[must_use]
    pub fn has_nested_type(&self, name: &str) -> bool {
        self.nested_types
            .iter()
            .any(|n| n.rsplit('/').next() == Some(name))
    }

    /// Gets the storage type of an enum, as given by its storage field.
    #[must_use]
    pub fn enum_storage(&self) -> Option<&TypeSig> {
        self.field(ENUM_STORAGE_FIELD).map(|f| &f.field_type)
    }
}

/// The serialized form of a [`Module`].
#[derive(Clone, Debug, Deserialize, Serialize)]
struct ModuleRepr {
    types: Vec<TypeDef>,
}

/// The set of types defined by the program being analysed.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(from = "ModuleRepr")]
pub struct Module {
    types: Vec<TypeDef>,
    index: HashMap<String, usize>,
}

impl Module {
    /// Creates a module containing `types`.
    #[must_use]
    pub fn new(types: Vec<TypeDef>) -> Self {
        let index = types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.full_name.clone(), i))
            .collect();
        Self { types, index }
    }

    /// Reads a module from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `json` is not a valid module.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Gets all of the types in the module.
    #[must_use]
    pub fn types(&self) -> &[TypeDef] {
        &self.types
    }

    /// Gets the type with the CIL `full_name`, if the module defines it.
    #[must_use]
    pub fn get(&self, full_name: &str) -> Option<&TypeDef> {
        self.index.get(full_name).and_then(|&i| self.types.get(i))
    }

    /// Checks if `full_name` names an enum defined in the module.
    #[must_use]
    pub fn is_enum(&self, full_name: &str) -> bool {
        self.get(full_name).is_some_and(|t| t.is_enum)
    }

    /// Computes the protobuf name for the type with the CIL `full_name`.
    ///
    /// Nested types are joined with `.` and take the package of their
    /// outermost declaring type. The `Types` containers that some generators
    /// place nested messages in are skipped.
    #[must_use]
    pub fn type_name(&self, full_name: &str) -> TypeName {
        let Some(mut current) = self.get(full_name) else {
            return TypeName::from_full_name(full_name);
        };

        let mut segments = vec![strip_generic_arity(&current.name).to_string()];
        while let Some(parent) = current
            .declaring_type
            .as_deref()
            .and_then(|parent| self.get(parent))
        {
            current = parent;
            if current.name != NESTED_TYPES_CONTAINER {
                segments.push(strip_generic_arity(&current.name).to_string());
            }
        }
        segments.reverse();

        TypeName::new(current.namespace.clone(), segments.join("."))
    }
}

impl From<ModuleRepr> for Module {
    fn from(value: ModuleRepr) -> Self {
        Self::new(value.types)
    }
}
