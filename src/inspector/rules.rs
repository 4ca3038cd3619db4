//! This module contains the rules, shared between dialects, that interpret
//! the path conditions of a field write.
//!
//! Generated serializers guard each field write with the conditions that
//! reveal its cardinality. Repeated fields are written inside a loop over an
//! enumerator, optional fields behind a presence check, and required fields
//! unconditionally.

use crate::{
    schema::Label,
    walker::{
        condition::Condition,
        value::{CallExpr, SymbolicValue},
    },
};

/// The name of the method that advances a collection enumerator.
const ITERATOR_ADVANCE: &str = "MoveNext";

/// The name of the getter that reads the length of a collection.
const COLLECTION_LENGTH: &str = "get_Count";

/// The name of the method that encodes a string to UTF-8 bytes.
const ENCODE_UTF8: &str = "GetBytes";

/// The facts about enclosing loops that hold at a field write.
#[derive(Clone, Debug)]
pub struct LoopFacts<'a> {
    /// The conditions on an enumerator advancing.
    iterators: Vec<&'a Condition>,

    /// The conditions on the length of a collection.
    lengths: Vec<&'a Condition>,
}

impl<'a> LoopFacts<'a> {
    /// Collects the loop facts from the `conditions` of a write.
    #[must_use]
    pub fn new(conditions: &'a [Condition]) -> Self {
        let iterators = conditions
            .iter()
            .filter(|c| c.mentions(&|v| v.is_call_to(ITERATOR_ADVANCE)))
            .collect();
        let lengths = conditions
            .iter()
            .filter(|c| c.mentions(&|v| v.is_call_to(COLLECTION_LENGTH)))
            .collect();

        Self { iterators, lengths }
    }

    /// Checks if the write is inside any enumerator loop.
    #[must_use]
    pub fn is_repeated(&self) -> bool {
        !self.iterators.is_empty()
    }

    /// Checks if the write is the length prefix that precedes the elements of
    /// a packed field, rather than a write of an element.
    ///
    /// Such a write is guarded by the collection being non-empty, but not by
    /// an enumerator having produced an element.
    #[must_use]
    pub fn is_size_prewrite(&self) -> bool {
        !self.lengths.is_empty() && !self.iterators.iter().any(|c| c.tests_truth(true))
    }

    /// Checks if the write is of an element of a packed field.
    ///
    /// The elements of a packed field are written after a loop that measured
    /// them has finished, so an enumerator has been seen to be exhausted.
    #[must_use]
    pub fn is_packed(&self) -> bool {
        self.iterators.iter().any(|c| c.tests_truth(false))
    }

    /// Gets the name of the property whose length guards the write.
    #[must_use]
    pub fn collection_property(&self) -> Option<&'a str> {
        self.lengths.iter().find_map(|&condition| {
            std::iter::once(&condition.lhs)
                .chain(condition.rhs.as_ref())
                .find_map(|side| side.find_call(COLLECTION_LENGTH))
                .and_then(|count| count.receiver.as_ref())
                .and_then(SymbolicValue::accessor_name)
        })
    }

    /// Checks if any condition tests the length of a collection.
    #[must_use]
    pub fn has_length_test(&self) -> bool {
        !self.lengths.is_empty()
    }
}

/// Checks if any of `conditions` tests whether a field has been set.
///
/// Generators test presence through a `HasX` property or a `hasX` backing
/// field.
#[must_use]
pub fn has_presence_check(conditions: &[Condition]) -> bool {
    conditions.iter().any(|c| {
        c.mentions(&|v| {
            v.accessor_name()
                .is_some_and(|name| name.starts_with("Has") || name.starts_with("has"))
        })
    })
}

/// Works out the label of a write from its loop facts and `conditions`,
/// falling back to `default` for an unguarded write.
#[must_use]
pub fn label_for(facts: &LoopFacts, conditions: &[Condition], default: Label) -> Label {
    if facts.is_repeated() {
        Label::Repeated
    } else if has_presence_check(conditions) {
        Label::Optional
    } else {
        default
    }
}

/// Gets the value that was encoded by a write, looking through the UTF-8
/// encoding that some generators wrap string values in.
#[must_use]
pub fn unwrap_encoding(value: &SymbolicValue) -> &SymbolicValue {
    match value.as_call() {
        Some(CallExpr {
            method, arguments, ..
        }) if method.name == ENCODE_UTF8 => arguments.first().unwrap_or(value),
        _ => value,
    }
}

/// Gets the name of the property or field that `value` reads, after looking
/// through any encoding wrapper.
#[must_use]
pub fn written_member(value: &SymbolicValue) -> Option<&str> {
    unwrap_encoding(value).accessor_name()
}

#[cfg(test)]
mod test {
    use crate::{
        inspector::rules::{has_presence_check, label_for, written_member, LoopFacts},
        metadata::{instruction::ArgumentRef, MethodRef, TypeSig},
        schema::Label,
        walker::{
            condition::{BranchKind, Condition},
            value::{CallExpr, SymbolicValue},
        },
    };

    fn call(
        declaring: &str,
        name: &str,
        receiver: Option<SymbolicValue>,
        arguments: Vec<SymbolicValue>,
    ) -> SymbolicValue {
        let mut method = MethodRef::new(TypeSig::new(declaring), name);
        method.has_this = receiver.is_some();
        SymbolicValue::Call(Box::new(CallExpr {
            method,
            receiver,
            arguments,
            constructor: false,
        }))
    }

    fn instance() -> SymbolicValue {
        SymbolicValue::Argument(ArgumentRef::Index(1))
    }

    fn count_of(property: &str) -> SymbolicValue {
        let list = call("Ns.Foo", &format!("get_{property}"), Some(instance()), vec![]);
        call("System.Collections.Generic.List`1", "get_Count", Some(list), vec![])
    }

    fn advance(local: u16) -> SymbolicValue {
        call(
            "System.Collections.Generic.List`1/Enumerator",
            "MoveNext",
            Some(SymbolicValue::VariableAddress(local)),
            vec![],
        )
    }

    fn non_empty(property: &str) -> Condition {
        // `ble` on `count, 0` falls through when the list is non-empty.
        Condition::for_branch(BranchKind::Ble, 4, count_of(property), Some(SymbolicValue::int(0))).1
    }

    #[test]
    fn packed_writes_are_told_apart_from_their_size_prefix() -> anyhow::Result<()> {
        let size = vec![
            non_empty("Entities"),
            Condition::truth(30, advance(2), false),
        ];
        let element = vec![
            non_empty("Entities"),
            Condition::truth(30, advance(2), false),
            Condition::truth(60, advance(4), true),
        ];

        let size_facts = LoopFacts::new(&size);
        assert!(size_facts.is_size_prewrite());

        let element_facts = LoopFacts::new(&element);
        assert!(!element_facts.is_size_prewrite());
        assert!(element_facts.is_packed());
        assert!(element_facts.is_repeated());
        assert_eq!(element_facts.collection_property(), Some("Entities"));

        Ok(())
    }

    #[test]
    fn unpacked_elements_are_not_packed() -> anyhow::Result<()> {
        let conditions = vec![
            non_empty("Tokens"),
            Condition::truth(12, advance(1), true),
        ];
        let facts = LoopFacts::new(&conditions);

        assert!(!facts.is_size_prewrite());
        assert!(!facts.is_packed());
        assert_eq!(label_for(&facts, &conditions, Label::Required), Label::Repeated);

        Ok(())
    }

    #[test]
    fn presence_checks_make_fields_optional() -> anyhow::Result<()> {
        let has = call("Ns.Foo", "get_HasName", Some(instance()), vec![]);
        let conditions = vec![Condition::truth(3, has, false)];
        let facts = LoopFacts::new(&conditions);

        assert!(has_presence_check(&conditions));
        assert_eq!(label_for(&facts, &conditions, Label::Required), Label::Optional);
        assert_eq!(label_for(&LoopFacts::new(&[]), &[], Label::Required), Label::Required);

        Ok(())
    }

    #[test]
    fn written_members_look_through_utf8_encoding() -> anyhow::Result<()> {
        let name = call("Ns.Foo", "get_Name", Some(instance()), vec![]);
        let utf8 = call("System.Text.Encoding", "get_UTF8", None, vec![]);
        let bytes = call("System.Text.Encoding", "GetBytes", Some(utf8), vec![name.clone()]);

        assert_eq!(written_member(&name), Some("Name"));
        assert_eq!(written_member(&bytes), Some("Name"));
        assert_eq!(written_member(&SymbolicValue::int(3)), None);

        Ok(())
    }
}
