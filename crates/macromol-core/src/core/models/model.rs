use super::entity::{Annotations, Children, FullIdCache};
use super::ids::ChainKey;

/// A model: one coordinate set of the structure.
///
/// X-ray structures usually carry a single model; NMR ensembles carry many.
/// The `id` is positional (0..N-1, assigned at parse time), while
/// `serial_num` preserves the serial the source file used, which can differ
/// after reordering or model extraction.
#[derive(Debug, Clone)]
pub struct Model {
    pub id: i32,
    pub serial_num: i32,
    pub annotations: Annotations,
    pub(crate) children: Children<String, ChainKey>,
    pub(crate) full_id: FullIdCache,
}

impl Model {
    /// Creates a model whose serial number equals its id.
    pub fn new(id: i32) -> Self {
        Self::with_serial(id, id)
    }

    pub fn with_serial(id: i32, serial_num: i32) -> Self {
        Self {
            id,
            serial_num,
            annotations: Annotations::new(),
            children: Children::new(),
            full_id: FullIdCache::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = &str> {
        self.children.ids().map(String::as_str)
    }

    pub fn chain_key(&self, id: &str) -> Option<ChainKey> {
        self.children.get(&id.to_string()).copied()
    }

    /// Chain keys in insertion order.
    pub fn chain_keys(&self) -> impl Iterator<Item = ChainKey> + '_ {
        self.children.values().copied()
    }
}
