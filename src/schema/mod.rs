//! This module contains the schema graph that the extractor produces.
//!
//! The graph is an arena of [`TypeDescriptor`]s indexed by [`TypeId`]. Fields
//! refer to the types they use through [`TypeRef`]s, which start out as
//! placeholders naming the type and are resolved to arena entries once every
//! type has been decompiled. References can therefore form cycles without any
//! shared ownership.

pub mod extension;
pub mod field;
pub mod link;

use std::{
    collections::{BTreeMap, HashMap},
    fmt::{Display, Formatter},
};

pub use field::{DefaultValue, FieldDescriptor, Label, TypeRef, WireKind};

use crate::constant::NESTED_TYPES_CONTAINER;

/// The name of a protobuf type, split into its package and its (possibly
/// nested) name.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TypeName {
    package: String,
    name:    String,
}

impl TypeName {
    /// Creates a new type name.
    #[must_use]
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        let package = package.into();
        let name = name.into();
        Self { package, name }
    }

    /// Creates a type name from a CIL full name, for types that are not
    /// defined in the module being analysed.
    #[must_use]
    pub fn from_full_name(full_name: &str) -> Self {
        let mut segments = full_name.split('/');
        let outermost = segments.next().unwrap_or_default();
        let (package, outer) = outermost.rsplit_once('.').unwrap_or(("", outermost));
        let name = std::iter::once(outer)
            .chain(segments.filter(|s| *s != NESTED_TYPES_CONTAINER))
            .map(crate::utility::strip_generic_arity)
            .collect::<Vec<_>>()
            .join(".");

        Self::new(package, name)
    }

    /// Gets the package of the type.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Gets the name of the type within its package.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Displays the fully-qualified name in `.package.Name` form.
impl Display for TypeName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.package.is_empty() {
            write!(f, ".{}", self.name)
        } else {
            write!(f, ".{}.{}", self.package, self.name)
        }
    }
}

/// The location of a type in the schema graph.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TypeId(pub usize);

/// An `extend` block recovered from an extension field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExtendDeclaration {
    /// The message being extended.
    pub extendee: TypeName,

    /// The extension field.
    pub field: FieldDescriptor,
}

/// A recovered message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MessageDescriptor {
    pub name:   TypeName,
    pub fields: Vec<FieldDescriptor>,

    /// The `extend` blocks declared alongside this message.
    pub extends: Vec<ExtendDeclaration>,

    /// Whether other messages declare extensions of this one.
    pub accepts_extensions: bool,
}

impl MessageDescriptor {
    /// Creates a message with the provided `fields`.
    #[must_use]
    pub fn new(name: TypeName, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name,
            fields,
            extends: vec![],
            accepts_extensions: false,
        }
    }

    /// Gets the field with the protobuf name `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Gets the field with the tag `tag`.
    #[must_use]
    pub fn field_by_tag(&self, tag: u32) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.tag == tag)
    }
}

/// A single member of a recovered enum.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct EnumValue {
    pub name:  String,
    pub value: i32,
}

/// A recovered enum.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnumDescriptor {
    pub name:   TypeName,
    pub values: Vec<EnumValue>,
}

impl EnumDescriptor {
    /// Gets the name of the first member with the numeric `value`.
    #[must_use]
    pub fn member_for(&self, value: i64) -> Option<&str> {
        self.values
            .iter()
            .find(|v| i64::from(v.value) == value)
            .map(|v| v.name.as_str())
    }
}

/// A single method of a recovered service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RpcDescriptor {
    pub name:      String,
    pub input:     TypeName,
    pub output:    TypeName,
    pub method_id: Option<i64>,
}

/// A recovered service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceDescriptor {
    pub name: TypeName,
    pub rpcs: Vec<RpcDescriptor>,
}

/// Any of the kinds of type that the extractor can recover.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TypeDescriptor {
    Message(MessageDescriptor),
    Enum(EnumDescriptor),
    Service(ServiceDescriptor),
}

impl TypeDescriptor {
    /// Gets the name of the type.
    #[must_use]
    pub fn name(&self) -> &TypeName {
        match self {
            Self::Message(m) => &m.name,
            Self::Enum(e) => &e.name,
            Self::Service(s) => &s.name,
        }
    }

    /// Gets the type as a message, if it is one.
    #[must_use]
    pub fn as_message(&self) -> Option<&MessageDescriptor> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }

    /// Gets the type as a mutable message, if it is one.
    pub fn as_message_mut(&mut self) -> Option<&mut MessageDescriptor> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }

    /// Gets the type as an enum, if it is one.
    #[must_use]
    pub fn as_enum(&self) -> Option<&EnumDescriptor> {
        match self {
            Self::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Gets the type as a service, if it is one.
    #[must_use]
    pub fn as_service(&self) -> Option<&ServiceDescriptor> {
        match self {
            Self::Service(s) => Some(s),
            _ => None,
        }
    }
}

/// The types of one protobuf package.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Namespace {
    pub package: String,
    pub types:   Vec<TypeId>,
}

/// The graph of all recovered types.
///
/// Entries that failed to decompile are left empty so that the [`TypeId`]s
/// of the remaining entries stay stable.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SchemaGraph {
    entries: Vec<Option<TypeDescriptor>>,
    by_name: HashMap<String, TypeId>,
}

impl SchemaGraph {
    /// Creates a graph over `entries`, where the position of each entry is its
    /// [`TypeId`].
    #[must_use]
    pub fn new(entries: Vec<Option<TypeDescriptor>>) -> Self {
        let by_name = entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|t| (t.name().to_string(), TypeId(i))))
            .collect();
        Self { entries, by_name }
    }

    /// Gets the type at `id`.
    #[must_use]
    pub fn get(&self, id: TypeId) -> Option<&TypeDescriptor> {
        self.entries.get(id.0).and_then(Option::as_ref)
    }

    /// Gets the type at `id` mutably.
    pub fn get_mut(&mut self, id: TypeId) -> Option<&mut TypeDescriptor> {
        self.entries.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Gets the location of the type with the fully-qualified name `name`
    /// (in `.package.Name` form).
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Gets the type with the fully-qualified name `name` (in `.package.Name`
    /// form).
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&TypeDescriptor> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    /// Gets the message with the fully-qualified name `name`.
    #[must_use]
    pub fn message(&self, name: &str) -> Option<&MessageDescriptor> {
        self.find(name).and_then(TypeDescriptor::as_message)
    }

    /// Removes the type at `id` from the graph, returning it.
    pub fn remove(&mut self, id: TypeId) -> Option<TypeDescriptor> {
        let removed = self.entries.get_mut(id.0).and_then(Option::take);
        if let Some(descriptor) = &removed {
            self.by_name.remove(&descriptor.name().to_string());
        }
        removed
    }

    /// Iterates over all types in the graph.
    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeDescriptor)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|t| (TypeId(i), t)))
    }

    /// Gets the number of types in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Checks if the graph contains no types.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Groups the types of the graph by their package, ordered by package
    /// name.
    #[must_use]
    pub fn namespaces(&self) -> Vec<Namespace> {
        let mut packages: BTreeMap<&str, Vec<TypeId>> = BTreeMap::new();
        for (id, descriptor) in self.types() {
            packages
                .entry(descriptor.name().package())
                .or_default()
                .push(id);
        }

        packages
            .into_iter()
            .map(|(package, types)| Namespace {
                package: package.to_string(),
                types,
            })
            .collect()
    }
}
