use std::collections::BTreeMap;

use super::PrefValue;

/// A single queued mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    Put { key: String, value: PrefValue },
    Remove { key: String },
}

/// Batched set of mutations committed to a backend in one step.
///
/// When `clear` is set it is applied before any queued operation, so
/// `edit().clear().put("a", 1)` leaves exactly one entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrefsEdit {
    clear: bool,
    ops: Vec<EditOp>,
}

impl PrefsEdit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, key: impl Into<String>, value: impl Into<PrefValue>) -> Self {
        self.ops.push(EditOp::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.ops.push(EditOp::Remove { key: key.into() });
        self
    }

    pub fn clear(mut self) -> Self {
        self.clear = true;
        self
    }

    pub fn clears(&self) -> bool {
        self.clear
    }

    pub fn ops(&self) -> &[EditOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        !self.clear && self.ops.is_empty()
    }

    /// Apply this edit to a cleartext map. Backends call this under their own lock.
    pub fn apply_to(&self, entries: &mut BTreeMap<String, PrefValue>) {
        if self.clear {
            entries.clear();
        }
        for op in &self.ops {
            match op {
                EditOp::Put { key, value } => {
                    entries.insert(key.clone(), value.clone());
                }
                EditOp::Remove { key } => {
                    entries.remove(key);
                }
            }
        }
    }
}
