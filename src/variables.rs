use rustc_hash::FxHashMap;
use serde::Serialize;

/// Dense, first-seen-order numbering of variable names.
///
/// Compilers fill the table while generating code; executors only read it to
/// map addresses back to names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariableTable {
    names: Vec<String>,
    #[serde(skip)]
    indices: FxHashMap<String, usize>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `name`, allocating the next free one on first sight.
    pub fn address_of(&mut self, name: &str) -> usize {
        if let Some(&index) = self.indices.get(name) {
            return index;
        }
        let index = self.names.len();
        self.names.push(name.to_string());
        self.indices.insert(name.to_string(), index);
        index
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.indices.get(name).copied()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in index order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
