//! This module contains the typed instructions of a method body, as handed
//! over by the binary reader.
//!
//! The reader is expected to have simplified the macro forms of CIL (such as
//! `ldc.i4.3` or `ldarg.0`) into their general forms, and to have resolved
//! every operand into the identity that it refers to.

use serde::{Deserialize, Serialize};

use crate::metadata::{FieldRef, MethodRef, TypeSig};

/// A reference to a method argument as loaded by `ldarg`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ArgumentRef {
    /// The implicit receiver of an instance method.
    This,

    /// The declared parameter at the given zero-based index.
    Index(u16),
}

/// The instruction kinds understood by the walker, with their resolved
/// operands.
///
/// Branch operands are the offsets of their targets.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "op", content = "operand")]
pub enum Opcode {
    Nop,
    Dup,
    Pop,
    Ldnull,
    LdcI4(i32),
    LdcI8(i64),
    LdcR4(f32),
    LdcR8(f64),
    Ldstr(String),
    Ldloc(u16),
    Ldloca(u16),
    Stloc(u16),
    Ldarg(ArgumentRef),
    Ldfld(FieldRef),
    Ldflda(FieldRef),
    Ldsfld(FieldRef),
    Stfld(FieldRef),
    Stsfld(FieldRef),
    Newarr(TypeSig),
    Ldelem,
    Stelem,
    Ldlen,
    Ldtoken(String),
    Ldftn(MethodRef),
    Newobj(MethodRef),
    Call(MethodRef),
    Callvirt(MethodRef),
    Br(u32),
    Brtrue(u32),
    Brfalse(u32),
    Beq(u32),
    BneUn(u32),
    Ble(u32),
    Bge(u32),
    Blt(u32),
    Bgt(u32),
    Add,
    Sub,
    Mul,
    Conv,
    Ret,
    Throw,

    /// Any instruction that the reader passes through without a dedicated
    /// kind, named by its mnemonic.
    Other(String),
}

impl Opcode {
    /// Checks whether the instruction ends the path through the method that
    /// reaches it.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ret | Self::Throw)
    }
}

/// A single instruction at a known offset in a method body.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Instruction {
    /// The offset of the instruction in the method body.
    pub offset: u32,

    /// The instruction itself.
    #[serde(flatten)]
    pub opcode: Opcode,
}

impl Instruction {
    /// Creates a new instruction at `offset`.
    #[must_use]
    pub fn new(offset: u32, opcode: Opcode) -> Self {
        Self { offset, opcode }
    }
}

/// The ordered instructions of a single method.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct MethodBody {
    instructions: Vec<Instruction>,
}

impl MethodBody {
    /// Creates a method body from `instructions`, which must be ordered by
    /// offset.
    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    /// Creates a method body from `opcodes`, giving each instruction its index
    /// as its offset.
    #[must_use]
    pub fn sequential(opcodes: Vec<Opcode>) -> Self {
        let instructions = opcodes
            .into_iter()
            .zip(0u32..)
            .map(|(opcode, offset)| Instruction::new(offset, opcode))
            .collect();
        Self { instructions }
    }

    /// Gets the instructions of the method body.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Gets the offset at which execution of the method begins.
    #[must_use]
    pub fn entry_offset(&self) -> Option<u32> {
        self.instructions.first().map(|i| i.offset)
    }

    /// Gets the number of instructions in the method body.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Checks whether the method body contains no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Constructs a [`MethodBody`] from a list of opcodes, where each instruction
/// gets its position in the list as its offset.
///
/// ```
/// use proto_schema_extractor::{body, metadata::instruction::Opcode::*};
///
/// let body = body![LdcI4(10), Pop, Ret];
/// assert_eq!(body.len(), 3);
/// ```
#[macro_export]
macro_rules! body {
    ($($op:expr),* $(,)?) => {
        $crate::metadata::instruction::MethodBody::sequential(vec![$($op),*])
    };
}
