//! Append-only ledger of applied patch documents.

use parking_lot::RwLock;
use tether_protocol::PatchDocument;

/// An append-only, ordered log of patch documents. Index 0 is the oldest.
///
/// A patch is appended the moment the local merge's diff is computed, before
/// the remote round-trip resolves, so the ledger always records
/// client-intended patches even when the remote later amends state further.
/// Growth is unbounded; compaction is out of scope.
pub struct HistoryLedger {
    entries: RwLock<Vec<PatchDocument>>,
}

impl HistoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Appends a patch document. O(1) amortized.
    pub fn append(&self, patch: PatchDocument) {
        self.entries.write().push(patch);
    }

    /// Returns the number of recorded patches.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns the whole ledger, oldest first.
    pub fn all(&self) -> Vec<PatchDocument> {
        self.entries.read().clone()
    }

    /// Returns the `n` most recent patches, oldest first. `n = 0` returns
    /// nothing; `n >= len` returns everything.
    pub fn recent(&self, n: usize) -> Vec<PatchDocument> {
        let entries = self.entries.read();
        let start = entries.len().saturating_sub(n);
        entries[start..].to_vec()
    }
}

impl Default for HistoryLedger {
    fn default() -> Self {
        Self::new()
    }
}
