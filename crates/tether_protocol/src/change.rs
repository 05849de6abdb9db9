//! Change-request value types.
//!
//! A change request is a partial tree mirroring the synchronized state,
//! restricted to the affected subtrees. Deletion and targeted array mutation
//! are explicit variants rather than reserved in-band values, so no scalar a
//! caller stores can ever collide with a directive.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A partial change to apply against the synchronized state.
///
/// Mappings merge key-wise and never replace wholesale; sequences replace
/// wholesale or are mutated through an explicit operation list. Element
/// identity is not tracked across merges.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Assign this value directly, replacing whatever is at the slot.
    Scalar(Value),
    /// Merge key-wise into the mapping at the slot. Keys of the subject
    /// absent from the change are preserved untouched.
    Mapping(BTreeMap<String, Change>),
    /// Replace the sequence at the slot wholesale.
    Sequence(Vec<Value>),
    /// Mutate the sequence at the slot through an ordered operation list.
    SequenceOps(Vec<SequenceOp>),
    /// Remove the key from the parent mapping. Only meaningful inside a
    /// [`Change::Mapping`]; a no-op anywhere else.
    Delete,
}

impl Change {
    /// Builds a mapping change from `(key, change)` pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Change)>,
    {
        Change::Mapping(
            entries
                .into_iter()
                .map(|(k, c)| (k.into(), c))
                .collect(),
        )
    }

    /// Builds a sequence-operation change from an operation list.
    pub fn operations<I>(ops: I) -> Self
    where
        I: IntoIterator<Item = SequenceOp>,
    {
        Change::SequenceOps(ops.into_iter().collect())
    }

    /// Returns true if this change removes its slot.
    pub fn is_delete(&self) -> bool {
        matches!(self, Change::Delete)
    }
}

/// Structural conversion from a plain partial JSON tree: objects become
/// mappings, arrays become wholesale sequence replacements, everything else
/// is a direct assignment. Deletion markers and operation lists never come
/// from this conversion; they are always written explicitly.
impl From<Value> for Change {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Change::Mapping(
                map.into_iter().map(|(k, v)| (k, Change::from(v))).collect(),
            ),
            Value::Array(items) => Change::Sequence(items),
            scalar => Change::Scalar(scalar),
        }
    }
}

/// A single mutation against a sequence.
///
/// Operations apply in list order, each against the sequence's length at
/// that point. The wire shape matches the `{"op": "push", ...}` form used by
/// the HTTP-family peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum SequenceOp {
    /// Append the value to the end of the sequence.
    Push {
        /// Value to append.
        value: Value,
    },
    /// Prepend the value to the front of the sequence.
    Unshift {
        /// Value to prepend.
        value: Value,
    },
    /// Insert the value before `index`.
    Splice {
        /// Position to insert before; clamped to the current length.
        index: usize,
        /// Value to insert.
        value: Value,
    },
    /// Delete the element at `index`.
    Remove {
        /// Position to delete; out-of-range indices are ignored.
        index: usize,
    },
}
