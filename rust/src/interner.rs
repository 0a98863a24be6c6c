//! Label interning for graph fragments.
//!
//! Fragments of one graph share many formula and ionization labels (every
//! color carries alternative explanations of the same peak). A graph stores
//! each label once and fragments refer to it by a dense integer id.

use rustc_hash::FxHashMap;

/// Dense id of an interned label.
pub type FormulaId = u32;

/// Label table of one graph. Ids are handed out in insertion order.
#[derive(Debug, Clone)]
pub struct FormulaInterner {
    ids: FxHashMap<Box<str>, FormulaId>,
    labels: Vec<Box<str>>,
}

impl FormulaInterner {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            labels: Vec::with_capacity(capacity),
        }
    }

    /// Id of `label`, adding it on first sight.
    pub fn intern(&mut self, label: &str) -> FormulaId {
        if let Some(&id) = self.ids.get(label) {
            return id;
        }
        let id = self.labels.len() as FormulaId;
        self.labels.push(label.into());
        self.ids.insert(label.into(), id);
        id
    }

    #[inline]
    pub fn resolve(&self, id: FormulaId) -> Option<&str> {
        self.labels.get(id as usize).map(|s| &**s)
    }
}
