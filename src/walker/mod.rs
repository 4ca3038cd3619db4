//! This module contains the bytecode walker: a symbolic executor that explores
//! every path through a method body and reports the calls and stores it finds
//! to an [`Observer`].
//!
//! The walker is partial. It interprets only the instructions
//! that affect how serialization code passes values around, and ignores every
//! other instruction.

pub mod condition;
pub mod data;
pub mod event;
pub mod frame;
pub mod value;

use std::collections::HashMap;

use tracing::trace;

use crate::{
    error::{
        container::Locatable,
        inspection,
        walk,
        Error,
        LocatedError,
    },
    metadata::{
        instruction::{ArgumentRef, Instruction, MethodBody, Opcode},
        MethodRef,
    },
    walker::{
        condition::{BranchKind, Condition},
        data::ExploredOffsets,
        event::{CallEvent, StoreEvent},
        frame::Frame,
        value::{CallExpr, Literal, OpenArray, SymbolicValue},
    },
    wire::TagBuffer,
};

/// The result type for walking a method body.
pub type Result<T> = std::result::Result<T, LocatedError>;

/// The receiver of the events produced by a walk.
pub trait Observer {
    /// Called for every call and object construction reached by the walk.
    ///
    /// `tags` holds the tag bytes pending on the path that reached the call.
    ///
    /// # Errors
    ///
    /// Returning [`Err`] stops the walk, which then fails with the error
    /// located at the call.
    fn on_call(&mut self, event: &CallEvent, tags: &mut TagBuffer) -> inspection::Result<()>;

    /// Called for every field store reached by the walk.
    ///
    /// # Errors
    ///
    /// Returning [`Err`] stops the walk, which then fails with the error
    /// located at the store.
    fn on_store(&mut self, _event: &StoreEvent) -> inspection::Result<()> {
        Ok(())
    }
}

/// Figures describing the work that a walk performed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Statistics {
    /// The number of frames taken from the worklist.
    pub frames_popped: usize,

    /// The number of distinct offsets that were explored.
    pub offsets_explored: usize,

    /// The number of frames merged into another at a join point.
    pub joins: usize,
}

/// What happens to a frame after one of its instructions is interpreted.
enum Flow {
    /// Continue with the next instruction in the body.
    Next,

    /// Continue with the instruction at the target.
    Jump(u32),

    /// Fork a frame to the target, and continue with the next instruction.
    Fork {
        target:    u32,
        taken:     Condition,
        not_taken: Condition,
    },

    /// The path ends here.
    Stop,
}

/// The walker over a single method body.
#[derive(Clone, Debug)]
pub struct Walker<'b> {
    /// The method body being walked.
    body: &'b MethodBody,

    /// The position in `body` of the instruction at each offset.
    positions: HashMap<u32, usize>,

    /// The frames waiting to be explored.
    queue: Vec<Frame>,

    /// The offsets that have already been explored.
    explored: ExploredOffsets,

    statistics: Statistics,
}

impl<'b> Walker<'b> {
    /// Constructs a walker over `body`, with a single empty frame at its entry
    /// point.
    #[must_use]
    pub fn new(body: &'b MethodBody) -> Self {
        let positions = body
            .instructions()
            .iter()
            .enumerate()
            .map(|(position, instruction)| (instruction.offset, position))
            .collect();
        let queue = body.entry_offset().map(Frame::new).into_iter().collect();

        Self {
            body,
            positions,
            queue,
            explored: ExploredOffsets::new(),
            statistics: Statistics::default(),
        }
    }

    /// Explores every path through the method body, reporting events to
    /// `observer`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the body cannot be interpreted, or if the observer
    /// rejects an event.
    pub fn walk(mut self, observer: &mut impl Observer) -> Result<Statistics> {
        while let Some(frame) = self.next_frame() {
            self.statistics.frames_popped += 1;
            self.explore(frame, observer)?;
        }

        self.statistics.offsets_explored = self.explored.len();
        trace!(statistics = ?self.statistics, "Finished walking method body");
        Ok(self.statistics)
    }

    /// Takes the next frame to explore from the queue, merging into it every
    /// other queued frame at the same offset.
    ///
    /// Frames are taken lowest offset first, and the least constrained frame
    /// is chosen among those at the same offset. Every forward path into a
    /// join is therefore queued before the join is explored.
    fn next_frame(&mut self) -> Option<Frame> {
        let (index, _) = self
            .queue
            .iter()
            .enumerate()
            .min_by_key(|(_, frame)| (frame.offset(), frame.conditions().len()))?;
        let mut frame = self.queue.swap_remove(index);

        let (siblings, rest) = std::mem::take(&mut self.queue)
            .into_iter()
            .partition::<Vec<_>, _>(|other| other.offset() == frame.offset());
        self.queue = rest;
        for sibling in &siblings {
            frame.prune_against(sibling);
            self.statistics.joins += 1;
        }

        Some(frame)
    }

    /// Explores the path of `frame` until it ends, forks, or reaches an
    /// instruction that has already been explored.
    fn explore(&mut self, mut frame: Frame, observer: &mut impl Observer) -> Result<()> {
        let body = self.body;
        loop {
            let offset = frame.offset();
            if !self.explored.mark_explored(offset) {
                return Ok(());
            }
            let (position, instruction) = self
                .positions
                .get(&offset)
                .and_then(|&p| body.instructions().get(p).map(|i| (p, i)))
                .ok_or(walk::Error::MissingInstruction { offset })
                .locate(offset)?;

            let successor = body.instructions().get(position + 1).map(|i| i.offset);
            match Self::step(&mut frame, instruction, observer)? {
                Flow::Jump(target) => {
                    frame.at(target);
                    continue;
                }
                Flow::Stop => return Ok(()),
                Flow::Next => {}
                Flow::Fork {
                    target,
                    taken,
                    not_taken,
                } => {
                    self.queue.push(frame.fork(target, taken));
                    frame.add_condition(not_taken);
                }
            }

            if let Some(next) = successor {
                frame.at(next);
                self.queue.push(frame);
            }
            return Ok(());
        }
    }

    /// Interprets a single `instruction` on `frame`.
    #[allow(clippy::too_many_lines)] // One arm per instruction kind
    fn step(
        frame: &mut Frame,
        instruction: &Instruction,
        observer: &mut impl Observer,
    ) -> Result<Flow> {
        let offset = instruction.offset;
        match &instruction.opcode {
            Opcode::Nop | Opcode::Conv | Opcode::Other(_) => {}
            Opcode::Ret | Opcode::Throw => return Ok(Flow::Stop),
            Opcode::Dup => {
                let top = frame.peek()?.clone();
                frame.push(top);
            }
            Opcode::Pop | Opcode::Stloc(_) => {
                frame.pop()?;
            }
            Opcode::Ldnull => frame.push(SymbolicValue::Literal(Literal::Null)),
            Opcode::LdcI4(value) => frame.push(SymbolicValue::int(i64::from(*value))),
            Opcode::LdcI8(value) => frame.push(SymbolicValue::int(*value)),
            Opcode::LdcR4(value) => {
                frame.push(SymbolicValue::Literal(Literal::Float(f64::from(*value))));
            }
            Opcode::LdcR8(value) => frame.push(SymbolicValue::Literal(Literal::Float(*value))),
            Opcode::Ldstr(value) => frame.push(SymbolicValue::string(value.clone())),
            Opcode::Ldloc(index) => frame.push(SymbolicValue::Variable(*index)),
            Opcode::Ldloca(index) => frame.push(SymbolicValue::VariableAddress(*index)),
            Opcode::Ldarg(argument) => frame.push(SymbolicValue::Argument(*argument)),
            Opcode::Ldfld(field) | Opcode::Ldflda(field) => {
                let base = frame.pop()?;
                frame.push(SymbolicValue::FieldAccess {
                    base:  Some(Box::new(base)),
                    field: field.clone(),
                });
            }
            Opcode::Ldsfld(field) => frame.push(SymbolicValue::FieldAccess {
                base:  None,
                field: field.clone(),
            }),
            Opcode::Stfld(field) | Opcode::Stsfld(field) => {
                let value = frame.pop()?;
                let receiver = match &instruction.opcode {
                    Opcode::Stfld(_) => Some(frame.pop()?),
                    _ => None,
                };
                let event = StoreEvent {
                    offset,
                    conditions: frame.conditions().to_vec(),
                    field: field.clone(),
                    receiver,
                    rendered: value.to_string(),
                    value,
                };
                observer
                    .on_store(&event)
                    .map_err(|e| Error::from(e).locate(offset))?;
            }
            Opcode::Newarr(element_type) => {
                let length = frame.pop()?;
                let array = match length.as_int().and_then(|n| usize::try_from(n).ok()) {
                    Some(length) => {
                        SymbolicValue::OpenArray(OpenArray::new(&element_type.name, length))
                    }
                    None => {
                        SymbolicValue::Expression(format!("new {}[{length}]", element_type.name))
                    }
                };
                frame.push(array);
            }
            Opcode::Ldelem => {
                let index = frame.pop()?;
                let array = frame.pop()?;
                frame.push(SymbolicValue::Element {
                    array: Box::new(array),
                    index: Box::new(index),
                });
            }
            Opcode::Stelem => {
                let value = frame.pop()?;
                let index = frame.pop()?;
                let array = frame.pop()?;
                let slot = index.as_int().and_then(|i| usize::try_from(i).ok());
                if let (SymbolicValue::OpenArray(array), Some(slot)) = (array, slot) {
                    array.store(slot, value);
                }
            }
            Opcode::Ldlen => {
                let array = frame.pop()?;
                frame.push(SymbolicValue::Expression(format!("{array}.Length")));
            }
            Opcode::Ldtoken(token) => frame.push(SymbolicValue::Token(token.clone())),
            Opcode::Ldftn(method) => frame.push(SymbolicValue::FunctionPointer(method.clone())),
            Opcode::Newobj(method) => {
                let arguments = frame.pop_many(method.parameters.len())?;
                let call = CallExpr {
                    method: method.clone(),
                    receiver: None,
                    arguments,
                    constructor: true,
                };
                let mut event_arguments = vec![SymbolicValue::Argument(ArgumentRef::This)];
                event_arguments.extend(call.arguments.iter().cloned());
                let value = SymbolicValue::Call(Box::new(call));
                Self::report_call(frame, offset, method, event_arguments, &value, observer)?;
                frame.push(value);
            }
            Opcode::Call(method) | Opcode::Callvirt(method) => {
                let arguments = frame.pop_many(method.parameters.len())?;
                let receiver = if method.has_this {
                    Some(frame.pop()?)
                } else {
                    None
                };
                let event_arguments = receiver.iter().chain(arguments.iter()).cloned().collect();
                let value = SymbolicValue::Call(Box::new(CallExpr {
                    method: method.clone(),
                    receiver,
                    arguments,
                    constructor: false,
                }));
                Self::report_call(frame, offset, method, event_arguments, &value, observer)?;
                if !method.return_type.is_void() {
                    frame.push(value);
                }
            }
            Opcode::Br(target) => return Ok(Flow::Jump(*target)),
            Opcode::Brtrue(target) => {
                return Self::branch(frame, offset, BranchKind::Brtrue, *target);
            }
            Opcode::Brfalse(target) => {
                return Self::branch(frame, offset, BranchKind::Brfalse, *target);
            }
            Opcode::Beq(target) => return Self::branch(frame, offset, BranchKind::Beq, *target),
            Opcode::BneUn(target) => return Self::branch(frame, offset, BranchKind::BneUn, *target),
            Opcode::Ble(target) => return Self::branch(frame, offset, BranchKind::Ble, *target),
            Opcode::Bge(target) => return Self::branch(frame, offset, BranchKind::Bge, *target),
            Opcode::Blt(target) => return Self::branch(frame, offset, BranchKind::Blt, *target),
            Opcode::Bgt(target) => return Self::branch(frame, offset, BranchKind::Bgt, *target),
            Opcode::Add | Opcode::Sub | Opcode::Mul => {
                let operator = match instruction.opcode {
                    Opcode::Add => "+",
                    Opcode::Sub => "-",
                    _ => "*",
                };
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                frame.push(SymbolicValue::Expression(format!("{lhs} {operator} {rhs}")));
            }
        }

        Ok(Flow::Next)
    }

    /// Pops the operands of a conditional branch of `kind` and computes the
    /// conditions of its two edges.
    fn branch(frame: &mut Frame, offset: u32, kind: BranchKind, target: u32) -> Result<Flow> {
        let (lhs, rhs) = match kind {
            BranchKind::Brtrue | BranchKind::Brfalse => (frame.pop()?, None),
            _ => {
                let rhs = frame.pop()?;
                (frame.pop()?, Some(rhs))
            }
        };
        let (taken, not_taken) = Condition::for_branch(kind, offset, lhs, rhs);

        Ok(Flow::Fork {
            target,
            taken,
            not_taken,
        })
    }

    /// Reports a call to `method` to the observer.
    fn report_call(
        frame: &mut Frame,
        offset: u32,
        method: &MethodRef,
        arguments: Vec<SymbolicValue>,
        value: &SymbolicValue,
        observer: &mut impl Observer,
    ) -> Result<()> {
        let event = CallEvent {
            offset,
            conditions: frame.conditions().to_vec(),
            method: method.clone(),
            arguments,
            rendered: value.to_string(),
        };
        observer
            .on_call(&event, frame.pending_tags_mut())
            .map_err(|e| Error::from(e).locate(offset))
    }
}

/// Walks `body`, reporting its events to `observer`.
///
/// # Errors
///
/// Returns [`Err`] if the body cannot be interpreted, or if the observer
/// rejects an event.
pub fn walk(body: &MethodBody, observer: &mut impl Observer) -> Result<Statistics> {
    Walker::new(body).walk(observer)
}

#[cfg(test)]
mod test {
    use crate::{
        body,
        error::{inspection, walk::Error as WalkError, Error},
        metadata::{
            instruction::{ArgumentRef, Opcode},
            FieldRef,
            MethodRef,
            TypeSig,
        },
        walker::{
            condition::Comparison,
            value::{Literal, SymbolicValue},
            walk,
        },
    };

    #[test]
    fn walk_terminates_on_backward_branches() -> anyhow::Result<()> {
        let body = body![
            Opcode::Ldarg(ArgumentRef::Index(1)),
            Opcode::Brtrue(0),
            Opcode::Ret,
        ];
        let mut recorder = util::Recorder::default();
        let statistics = walk(&body, &mut recorder)?;

        assert_eq!(statistics.offsets_explored, 3);
        assert_eq!(statistics.frames_popped, 4);

        Ok(())
    }

    #[test]
    fn walk_prunes_conditions_at_join_points() -> anyhow::Result<()> {
        let body = body![
            Opcode::Ldarg(ArgumentRef::Index(1)),
            Opcode::Brfalse(4),
            Opcode::Ldarg(ArgumentRef::Index(1)),
            Opcode::Call(util::sink("Inner")),
            Opcode::Ldarg(ArgumentRef::Index(1)),
            Opcode::Call(util::sink("Outer")),
            Opcode::Ret,
        ];
        let mut recorder = util::Recorder::default();
        let statistics = walk(&body, &mut recorder)?;

        assert_eq!(statistics.joins, 1);
        assert_eq!(recorder.calls.len(), 2);

        let inner = &recorder.calls[0];
        assert_eq!(inner.method.name, "Inner");
        assert_eq!(inner.conditions.len(), 1);
        assert_eq!(inner.conditions[0].comparison, Comparison::IsTrue);
        assert_eq!(inner.conditions[0].origin, 1);

        let outer = &recorder.calls[1];
        assert_eq!(outer.method.name, "Outer");
        assert!(outer.conditions.is_empty());

        Ok(())
    }

    #[test]
    fn calls_render_their_receivers_and_push_results() -> anyhow::Result<()> {
        let getter = MethodRef::new(TypeSig::new("Ns.Foo"), "get_Name")
            .instance()
            .returning(TypeSig::new("System.String"));
        let body = body![
            Opcode::Ldarg(ArgumentRef::This),
            Opcode::Callvirt(getter),
            Opcode::Call(util::sink("Inner")),
            Opcode::Ret,
        ];
        let mut recorder = util::Recorder::default();
        walk(&body, &mut recorder)?;

        assert_eq!(recorder.calls.len(), 2);
        let getter = &recorder.calls[0];
        assert_eq!(getter.arguments, vec![SymbolicValue::Argument(ArgumentRef::This)]);
        assert_eq!(getter.rendered, "this.get_Name()");

        let sink = &recorder.calls[1];
        assert_eq!(sink.argument(0).map(ToString::to_string), Some("this.get_Name()".into()));
        assert_eq!(sink.rendered, "Sink.Inner(this.get_Name())");

        Ok(())
    }

    #[test]
    fn constructions_report_a_receiver_placeholder() -> anyhow::Result<()> {
        let constructor = MethodRef::new(TypeSig::new("Ns.Descriptor"), ".ctor")
            .instance()
            .with_parameter(TypeSig::new("System.String"))
            .with_parameter(TypeSig::new("System.Int32"));
        let body = body![
            Opcode::Ldstr("Ping".into()),
            Opcode::LdcI4(7),
            Opcode::Newobj(constructor),
            Opcode::Pop,
            Opcode::Ret,
        ];
        let mut recorder = util::Recorder::default();
        walk(&body, &mut recorder)?;

        let event = &recorder.calls[0];
        assert_eq!(event.arguments.len(), 3);
        assert_eq!(event.argument(1).and_then(SymbolicValue::as_str), Some("Ping"));
        assert_eq!(event.argument(2).and_then(SymbolicValue::as_int), Some(7));
        assert_eq!(event.parameter_type_name(2), Some("Int32"));
        assert_eq!(event.rendered, "new Descriptor(Ping, 7)");

        Ok(())
    }

    #[test]
    fn stores_into_open_arrays_are_visible_through_duplicates() -> anyhow::Result<()> {
        let names = FieldRef::new(
            TypeSig::new("Ns.Foo"),
            "_fooFieldNames",
            TypeSig::new("System.String[]"),
        );
        let body = body![
            Opcode::LdcI4(2),
            Opcode::Newarr(TypeSig::new("System.String")),
            Opcode::Dup,
            Opcode::LdcI4(0),
            Opcode::Ldstr("id".into()),
            Opcode::Stelem,
            Opcode::Dup,
            Opcode::LdcI4(1),
            Opcode::Ldstr("name".into()),
            Opcode::Stelem,
            Opcode::Stsfld(names),
            Opcode::Ret,
        ];
        let mut recorder = util::Recorder::default();
        walk(&body, &mut recorder)?;

        assert_eq!(recorder.stores.len(), 1);
        let store = &recorder.stores[0];
        assert_eq!(store.field.name, "_fooFieldNames");
        assert!(store.receiver.is_none());

        let SymbolicValue::OpenArray(array) = &store.value else {
            anyhow::bail!("expected an open array but found {}", store.rendered);
        };
        assert_eq!(array.slots(), vec![
            Some(SymbolicValue::string("id")),
            Some(SymbolicValue::string("name")),
        ]);

        Ok(())
    }

    #[test]
    fn instance_stores_report_their_receiver() -> anyhow::Result<()> {
        let field = FieldRef::new(TypeSig::new("Ns.Foo"), "count", TypeSig::new("System.Int32"));
        let body = body![
            Opcode::Ldarg(ArgumentRef::This),
            Opcode::LdcI4(3),
            Opcode::LdcI4(4),
            Opcode::Mul,
            Opcode::Stfld(field),
            Opcode::Ret,
        ];
        let mut recorder = util::Recorder::default();
        walk(&body, &mut recorder)?;

        let store = &recorder.stores[0];
        assert_eq!(store.receiver, Some(SymbolicValue::Argument(ArgumentRef::This)));
        assert_eq!(store.rendered, "3 * 4");

        Ok(())
    }

    #[test]
    fn stack_underflow_is_located() -> anyhow::Result<()> {
        let body = body![Opcode::Nop, Opcode::Pop];
        let mut recorder = util::Recorder::default();
        let error = walk(&body, &mut recorder).unwrap_err();

        assert_eq!(error.location, Some(1));
        assert_eq!(
            error.payload,
            Error::Walk(WalkError::StackUnderflow {
                needed:    1,
                available: 0,
            })
        );

        Ok(())
    }

    #[test]
    fn observer_errors_stop_the_walk_at_the_call() -> anyhow::Result<()> {
        let body = body![
            Opcode::Ldnull,
            Opcode::Call(util::sink("Inner")),
            Opcode::Ldnull,
            Opcode::Call(util::sink("Outer")),
            Opcode::Ret,
        ];
        let mut observer = util::Failing;
        let error = walk(&body, &mut observer).unwrap_err();

        assert_eq!(error.location, Some(1));
        assert_eq!(error.payload, Error::Inspection(inspection::Error::EmptyTagBuffer));

        Ok(())
    }

    #[test]
    fn relational_branches_use_the_flipped_conditions() -> anyhow::Result<()> {
        let body = body![
            Opcode::Ldarg(ArgumentRef::Index(1)),
            Opcode::LdcI4(10),
            Opcode::Ble(5),
            Opcode::Ldnull,
            Opcode::Call(util::sink("Inner")),
            Opcode::Ret,
        ];
        let mut recorder = util::Recorder::default();
        walk(&body, &mut recorder)?;

        let event = &recorder.calls[0];
        let condition = &event.conditions[0];
        assert_eq!(condition.lhs, SymbolicValue::Argument(ArgumentRef::Index(1)));
        assert_eq!(condition.comparison, Comparison::Gt);
        assert_eq!(condition.rhs, Some(SymbolicValue::Literal(Literal::Int(10))));

        Ok(())
    }

    mod util {
        use crate::{
            error::inspection,
            metadata::{MethodRef, TypeSig},
            walker::{
                event::{CallEvent, StoreEvent},
                Observer,
            },
            wire::TagBuffer,
        };

        /// Creates a static, void, single-parameter method on `Sink`.
        pub fn sink(name: &str) -> MethodRef {
            MethodRef::new(TypeSig::new("Sink"), name).with_parameter(TypeSig::new("System.Object"))
        }

        #[derive(Default)]
        pub struct Recorder {
            pub calls:  Vec<CallEvent>,
            pub stores: Vec<StoreEvent>,
        }

        impl Observer for Recorder {
            fn on_call(&mut self, event: &CallEvent, _: &mut TagBuffer) -> inspection::Result<()> {
                self.calls.push(event.clone());
                Ok(())
            }

            fn on_store(&mut self, event: &StoreEvent) -> inspection::Result<()> {
                self.stores.push(event.clone());
                Ok(())
            }
        }

        pub struct Failing;

        impl Observer for Failing {
            fn on_call(&mut self, _: &CallEvent, _: &mut TagBuffer) -> inspection::Result<()> {
                Err(inspection::Error::EmptyTagBuffer)
            }
        }
    }
}
