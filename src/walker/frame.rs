//! This module contains the definition of the [`Frame`] type, representing the
//! divergent paths that the walker takes through a method body.

use crate::{
    error::{
        container::Locatable,
        walk::{Error, Result},
    },
    walker::{
        condition::Condition,
        value::{Detachments, SymbolicValue},
    },
    wire::TagBuffer,
};

/// A `Frame` is the state of a single path through a method body at the
/// instruction it is about to explore.
///
/// Frames are forked at conditional branches, and merged back together when
/// paths reconverge. They never outlive the walk that created them.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// The offset of the next instruction on this path.
    offset: u32,

    /// The symbolic evaluation stack.
    stack: Vec<SymbolicValue>,

    /// The conditions that hold on this path, in the order they were
    /// encountered.
    conditions: Vec<Condition>,

    /// The tag bytes written on this path since the last field write.
    pending_tags: TagBuffer,
}

impl Frame {
    /// Creates an empty frame at `offset`.
    #[must_use]
    pub fn new(offset: u32) -> Self {
        Self {
            offset,
            stack: vec![],
            conditions: vec![],
            pending_tags: TagBuffer::new(),
        }
    }

    /// Gets the offset of the next instruction on this path.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Moves the frame to the instruction at `offset`.
    pub fn at(&mut self, offset: u32) {
        self.offset = offset;
    }

    /// Gets the stack of the frame, with the top of the stack last.
    #[must_use]
    pub fn stack(&self) -> &[SymbolicValue] {
        &self.stack
    }

    /// Gets the conditions that hold on this path.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Gets the tag bytes pending on this path.
    #[must_use]
    pub fn pending_tags(&self) -> &TagBuffer {
        &self.pending_tags
    }

    /// Gets the tag bytes pending on this path mutably.
    pub fn pending_tags_mut(&mut self) -> &mut TagBuffer {
        &mut self.pending_tags
    }

    /// Pushes `value` onto the stack.
    pub fn push(&mut self, value: SymbolicValue) {
        self.stack.push(value);
    }

    /// Pops the top value off the stack.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the stack is empty.
    pub fn pop(&mut self) -> Result<SymbolicValue> {
        self.stack
            .pop()
            .ok_or(Error::StackUnderflow {
                needed:    1,
                available: 0,
            })
            .locate(self.offset)
    }

    /// Pops the top `count` values off the stack, returning them in the order
    /// they were pushed.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if fewer than `count` values are on the stack.
    pub fn pop_many(&mut self, count: usize) -> Result<Vec<SymbolicValue>> {
        let available = self.stack.len();
        if available < count {
            return Err(Error::StackUnderflow {
                needed: count,
                available,
            })
            .locate(self.offset);
        }

        Ok(self.stack.split_off(available - count))
    }

    /// Gets the value on top of the stack.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the stack is empty.
    pub fn peek(&self) -> Result<&SymbolicValue> {
        self.stack
            .last()
            .ok_or(Error::StackUnderflow {
                needed:    1,
                available: 0,
            })
            .locate(self.offset)
    }

    /// Records that `condition` holds on this path.
    pub fn add_condition(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    /// Forks the frame at a branch, returning a new frame at `target` on
    /// which `condition` additionally holds.
    ///
    /// The new frame shares nothing with this one, but stack slots that held
    /// the same array still hold the same array in the new frame.
    #[must_use]
    pub fn fork(&self, target: u32, condition: Condition) -> Self {
        let mut copies = Detachments::new();
        let stack = self.stack.iter().map(|value| value.deep_clone(&mut copies)).collect();
        let mut conditions = self.conditions.clone();
        conditions.push(condition);
        let pending_tags = self.pending_tags.clone();

        Self {
            offset: target,
            stack,
            conditions,
            pending_tags,
        }
    }

    /// Merges `sibling`, a frame that reached the same offset by another path,
    /// into this one.
    ///
    /// Every condition whose originating branch also contributed a condition
    /// to `sibling` is removed, as that branch no longer distinguishes the
    /// paths. The rest of `sibling` is discarded.
    pub fn prune_against(&mut self, sibling: &Frame) {
        self.conditions
            .retain(|c| !sibling.conditions.iter().any(|s| s.origin == c.origin));
    }
}
