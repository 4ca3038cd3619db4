//! This library recovers the [protocol buffer](https://protobuf.dev) schemas
//! of a compiled CIL program from the serialization code that protobuf code
//! generators emitted into it. It is a _best effort_ analysis.
//!
//! Note that this library is not intended to be nor expected to evolve into a
//! general-purpose decompiler for CIL.
//!
//! # How it Works
//!
//! From a very high level, the schema recovery process is performed as
//! follows:
//!
//! 1. A [`metadata::Module`] of resolved type definitions is handed over by a
//!    binary reader, either directly or as JSON.
//! 2. Each type is classified by the [`inspector`] as an enum, a service, or a
//!    message of one of the supported generator dialects.
//! 3. The serialization methods of a message are walked symbolically by the
//!    [`walker`], which explores every path through the method and reports
//!    each call it sees along with the conditions that guard it.
//! 4. The dialect's inspector interprets those calls as field writes, using
//!    the [`wire`] tag bytes to recover field numbers, and records the types
//!    that each message references so that they are decompiled in turn.
//! 5. Once no new types are referenced, the [`extractor`] links the recovered
//!    types into a [`SchemaGraph`], moving extension fields into `extend`
//!    blocks and resolving references between types.
//!
//! # Basic Usage
//!
//! For the most basic usage of the library, it is sufficient to construct an
//! `Extractor` and call the `.analyze` method.
//!
//! ```
//! use proto_schema_extractor as pse;
//! use proto_schema_extractor::{extractor::Config, metadata::Module};
//!
//! let module = Module::from_json(
//!     r#"{
//!         "types": [{
//!             "fullName": "PegasusShared.Platform",
//!             "namespace": "PegasusShared",
//!             "name": "Platform",
//!             "isEnum": true,
//!             "fields": [
//!                 { "name": "value__", "fieldType": { "fullName": "System.Int32", "name": "Int32" } },
//!                 { "name": "DesktopClient", "fieldType": { "fullName": "PegasusShared.Platform", "name": "Platform" }, "constant": 1 }
//!             ]
//!         }]
//!     }"#,
//! )
//! .unwrap();
//!
//! let schema = pse::new(module, Config::default()).analyze().unwrap();
//! let platform = schema.find(".PegasusShared.Platform").unwrap();
//!
//! assert_eq!(platform.as_enum().unwrap().values[0].name, "DESKTOP_CLIENT");
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod constant;
pub mod error;
pub mod extractor;
pub mod inspector;
pub mod metadata;
pub mod schema;
pub mod utility;
pub mod walker;
pub mod wire;

// Re-exports to provide the library interface.
pub use extractor::new;
pub use schema::SchemaGraph;
