//! Deep merge of partial change requests into a state tree.
//!
//! The merge is structural and key-preserving: mappings are merged key-wise
//! and never replaced wholesale, sequences are replaced wholesale or mutated
//! through an explicit operation list, and element identity is not tracked
//! across merges. A change whose shape does not match the subject degrades
//! to best-effort replacement instead of raising.

use serde_json::{Map, Value};
use tether_protocol::{Change, SequenceOp};
use tracing::debug;

/// Applies a change request to `subject` in place.
///
/// Keys of `subject` absent from the change are always preserved. A
/// [`Change::Delete`] is only meaningful inside a mapping slot; at the top
/// level it is a no-op.
pub fn apply(subject: &mut Value, change: &Change) {
    match change {
        Change::Scalar(value) => *subject = value.clone(),
        Change::Sequence(items) => *subject = Value::Array(items.clone()),
        Change::SequenceOps(ops) => {
            if !subject.is_array() {
                debug!("sequence operations against a non-sequence subject, rebuilding");
                *subject = Value::Array(Vec::new());
            }
            if let Value::Array(seq) = subject {
                apply_sequence_ops(seq, ops);
            }
        }
        Change::Mapping(entries) => {
            if !subject.is_object() {
                debug!("mapping change against a non-mapping subject, rebuilding");
                *subject = Value::Object(Map::new());
            }
            if let Value::Object(map) = subject {
                for (key, entry) in entries {
                    if entry.is_delete() {
                        map.remove(key);
                        continue;
                    }
                    let slot = map.entry(key.clone()).or_insert(Value::Null);
                    apply(slot, entry);
                }
            }
        }
        Change::Delete => {}
    }
}

/// Applies each operation in list order, against the sequence's current
/// length at that point.
fn apply_sequence_ops(seq: &mut Vec<Value>, ops: &[SequenceOp]) {
    for op in ops {
        match op {
            SequenceOp::Push { value } => seq.push(value.clone()),
            SequenceOp::Unshift { value } => seq.insert(0, value.clone()),
            SequenceOp::Splice { index, value } => {
                let at = (*index).min(seq.len());
                if at != *index {
                    debug!(index, len = seq.len(), "splice index clamped");
                }
                seq.insert(at, value.clone());
            }
            SequenceOp::Remove { index } => {
                if *index < seq.len() {
                    seq.remove(*index);
                } else {
                    debug!(index, len = seq.len(), "remove index out of range, ignored");
                }
            }
        }
    }
}
