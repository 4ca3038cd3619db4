//! This module contains the inspector for the RPC service descriptors that
//! accompany `SilentOrbit` messages.
//!
//! A service is a subclass of `ServiceDescriptor` whose constructor passes the
//! service's full name to the base constructor, and constructs one
//! `MethodDescriptor` per RPC. Each method descriptor carries the RPC's full
//! name, its numeric id, and a pointer to the parser of its response type.

use tracing::warn;

use crate::{
    constant::{UNKNOWN_PACKAGE, UNKNOWN_RPC_INPUT},
    error::inspection::{Error, Result as InspectionResult},
    inspector::{body_of, Inspection, Result},
    metadata::{Module, TypeDef, TypeSig},
    schema::{RpcDescriptor, ServiceDescriptor, TypeDescriptor, TypeName},
    walker::{event::CallEvent, value::SymbolicValue, walk, Observer},
    wire::TagBuffer,
};

/// The descriptor type constructed for every RPC.
const METHOD_DESCRIPTOR: &str = "MethodDescriptor";

/// The delegate type that wraps the response parser of an RPC.
const PARSE_METHOD: &str = "ParseMethod";

/// Recovers the service described by `ty`.
///
/// RPCs whose response type cannot be recovered are left out of the service.
///
/// # Errors
///
/// Returns [`Err`] if the service has no parameterless constructor, or if the
/// constructor never names the service.
pub fn inspect(module: &Module, ty: &TypeDef) -> Result<Inspection> {
    let constructor = ty
        .methods
        .iter()
        .find(|m| m.is_constructor() && !m.is_static && m.parameters.is_empty());
    let body = body_of(ty, constructor, ".ctor", 0)?;

    let mut observer = ConstructorObserver::new(module, ty);
    walk(body, &mut observer)?;

    let name = observer.name.ok_or(Error::MissingServiceName)?;
    let service = ServiceDescriptor {
        name,
        rpcs: observer.rpcs,
    };

    Ok(Inspection {
        descriptor: TypeDescriptor::Service(service),
        references: observer.references,
    })
}

/// Interprets the calls of a service's constructor.
#[derive(Debug)]
pub struct ConstructorObserver<'a> {
    module: &'a Module,
    ty:     &'a TypeDef,

    /// The name of the service, once the base constructor has been seen.
    pub name: Option<TypeName>,

    pub rpcs:       Vec<RpcDescriptor>,
    pub references: Vec<String>,

    /// The response type parsed by the most recently constructed parser,
    /// for method descriptors that receive their parser through a local.
    pending_output: Option<TypeSig>,
}

impl<'a> ConstructorObserver<'a> {
    /// Creates an observer for the constructor of the service `ty`.
    #[must_use]
    pub fn new(module: &'a Module, ty: &'a TypeDef) -> Self {
        Self {
            module,
            ty,
            name: None,
            rpcs: vec![],
            references: vec![],
            pending_output: None,
        }
    }

    /// Records the RPC described by a method descriptor construction.
    fn add_rpc(&mut self, event: &CallEvent) {
        let full_name = event.argument(1).and_then(SymbolicValue::as_str).unwrap_or_default();
        let name = full_name.rsplit('.').next().unwrap_or(full_name).to_string();
        let method_id = event.argument(2).and_then(SymbolicValue::as_int);

        let output = event
            .arguments
            .iter()
            .find_map(parsed_type)
            .cloned()
            .or_else(|| self.pending_output.take());
        let Some(output) = output else {
            warn!(
                service = %self.ty.full_name,
                rpc = %name,
                "Missing RPC return type"
            );
            return;
        };
        self.pending_output = None;

        self.references.push(output.full_name.clone());
        self.rpcs.push(RpcDescriptor {
            name,
            input: TypeName::new(UNKNOWN_PACKAGE, UNKNOWN_RPC_INPUT),
            output: self.module.type_name(&output.full_name),
            method_id,
        });
    }
}

impl<'a> Observer for ConstructorObserver<'a> {
    fn on_call(&mut self, event: &CallEvent, _: &mut TagBuffer) -> InspectionResult<()> {
        let method = &event.method;
        if !method.is_constructor() {
            return Ok(());
        }

        let is_base = self
            .ty
            .base_type
            .as_ref()
            .is_some_and(|base| base.full_name == method.declaring_type.full_name);
        if is_base {
            let full_name = event
                .argument(1)
                .and_then(SymbolicValue::as_str)
                .ok_or(Error::MissingServiceName)?;
            let (package, name) = full_name.rsplit_once('.').unwrap_or(("", full_name));
            self.name = Some(TypeName::new(package, name));
        } else if method.declaring_type.name == PARSE_METHOD {
            if let Some(previous) = self.pending_output.take() {
                warn!(
                    service = %self.ty.full_name,
                    output = %previous.full_name,
                    "Discarding RPC return type"
                );
            }
            self.pending_output = event.arguments.iter().find_map(parsed_type).cloned();
        } else if method.declaring_type.name == METHOD_DESCRIPTOR {
            self.add_rpc(event);
        }

        Ok(())
    }
}

/// Gets the type parsed by the generic parser method that `value` points to.
fn parsed_type(value: &SymbolicValue) -> Option<&TypeSig> {
    match value {
        SymbolicValue::FunctionPointer(method) => method.generic_arguments.first(),
        SymbolicValue::Call(call) => call.arguments.iter().find_map(parsed_type),
        _ => None,
    }
}
