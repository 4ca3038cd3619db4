//! This module contains the path conditions that the walker accumulates as it
//! forks at conditional branches.

use std::fmt::{Display, Formatter};

use crate::walker::value::{Literal, SymbolicValue};

/// The comparison performed by a condition.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Comparison {
    Eq,
    NotEq,
    Gt,
    GtEq,
    IsTrue,
    IsFalse,
}

impl Comparison {
    /// Gets the operator text for the comparison.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::IsTrue => "== true",
            Self::IsFalse => "== false",
        }
    }
}

/// The kinds of conditional branch, named after the instructions that perform
/// them.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BranchKind {
    Brtrue,
    Brfalse,
    Beq,
    BneUn,
    Ble,
    Bge,
    Blt,
    Bgt,
}

/// A single comparison that holds on a path through a method, tagged with the
/// offset of the branch that introduced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    /// The offset of the branch instruction that produced the condition.
    pub origin: u32,

    pub lhs:        SymbolicValue,
    pub comparison: Comparison,

    /// The right-hand side, absent for truth tests.
    pub rhs: Option<SymbolicValue>,
}

impl Condition {
    /// Creates a truth test of `value`.
    #[must_use]
    pub fn truth(origin: u32, value: SymbolicValue, holds: bool) -> Self {
        let comparison = if holds {
            Comparison::IsTrue
        } else {
            Comparison::IsFalse
        };
        Self {
            origin,
            lhs: value,
            comparison,
            rhs: None,
        }
    }

    /// Creates a binary comparison between `lhs` and `rhs`.
    #[must_use]
    pub fn compare(
        origin: u32,
        lhs: SymbolicValue,
        comparison: Comparison,
        rhs: SymbolicValue,
    ) -> Self {
        Self {
            origin,
            lhs,
            comparison,
            rhs: Some(rhs),
        }
    }

    /// Computes the conditions that hold on the taken and the not-taken edges
    /// of a branch of `kind` at `origin`, in that order.
    ///
    /// Truth tests only use `lhs`. Relational branches are expressed using
    /// only `>` and `>=`, swapping operands where necessary.
    #[must_use]
    pub fn for_branch(
        kind: BranchKind,
        origin: u32,
        lhs: SymbolicValue,
        rhs: Option<SymbolicValue>,
    ) -> (Self, Self) {
        use Comparison::{Eq, Gt, GtEq, NotEq};

        let rhs = rhs.unwrap_or(SymbolicValue::Literal(Literal::Null));
        let binary = |l: &SymbolicValue, c, r: &SymbolicValue| {
            Self::compare(origin, l.clone(), c, r.clone())
        };

        match kind {
            BranchKind::Brtrue => (
                Self::truth(origin, lhs.clone(), true),
                Self::truth(origin, lhs, false),
            ),
            BranchKind::Brfalse => (
                Self::truth(origin, lhs.clone(), false),
                Self::truth(origin, lhs, true),
            ),
            BranchKind::Beq => (binary(&lhs, Eq, &rhs), binary(&lhs, NotEq, &rhs)),
            BranchKind::BneUn => (binary(&lhs, NotEq, &rhs), binary(&lhs, Eq, &rhs)),
            BranchKind::Ble => (binary(&rhs, GtEq, &lhs), binary(&lhs, Gt, &rhs)),
            BranchKind::Bge => (binary(&lhs, GtEq, &rhs), binary(&rhs, Gt, &lhs)),
            BranchKind::Blt => (binary(&rhs, Gt, &lhs), binary(&lhs, GtEq, &rhs)),
            BranchKind::Bgt => (binary(&lhs, Gt, &rhs), binary(&rhs, GtEq, &lhs)),
        }
    }

    /// Computes the exact logical negation of the condition.
    ///
    /// The negation of a relational comparison swaps its operands, so that
    /// `!(a > b)` becomes `b >= a`.
    #[must_use]
    pub fn negate(&self) -> Self {
        let origin = self.origin;
        match (self.comparison, &self.rhs) {
            (Comparison::IsTrue, _) => Self::truth(origin, self.lhs.clone(), false),
            (Comparison::IsFalse, _) => Self::truth(origin, self.lhs.clone(), true),
            (Comparison::Eq, Some(rhs)) => {
                Self::compare(origin, self.lhs.clone(), Comparison::NotEq, rhs.clone())
            }
            (Comparison::NotEq, Some(rhs)) => {
                Self::compare(origin, self.lhs.clone(), Comparison::Eq, rhs.clone())
            }
            (Comparison::Gt, Some(rhs)) => {
                Self::compare(origin, rhs.clone(), Comparison::GtEq, self.lhs.clone())
            }
            (Comparison::GtEq, Some(rhs)) => {
                Self::compare(origin, rhs.clone(), Comparison::Gt, self.lhs.clone())
            }
            (comparison, None) => Self {
                origin,
                lhs: self.lhs.clone(),
                comparison,
                rhs: None,
            },
        }
    }

    /// Checks whether `other` is the exact negation of this condition.
    #[must_use]
    pub fn is_complement_of(&self, other: &Condition) -> bool {
        self.negate() == *other
    }

    /// Checks whether this is a truth test that holds when its value is
    /// `holds`.
    #[must_use]
    pub fn tests_truth(&self, holds: bool) -> bool {
        match self.comparison {
            Comparison::IsTrue => holds,
            Comparison::IsFalse => !holds,
            _ => false,
        }
    }

    /// Checks whether either side of the condition satisfies `predicate`.
    pub fn mentions(&self, predicate: &impl Fn(&SymbolicValue) -> bool) -> bool {
        self.lhs.any(predicate) || self.rhs.as_ref().is_some_and(|r| r.any(predicate))
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.lhs, self.comparison.as_str())?;
        if let Some(rhs) = &self.rhs {
            write!(f, " {rhs}")?;
        }
        Ok(())
    }
}
