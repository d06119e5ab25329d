use slotmap::new_key_type;

new_key_type! {
    pub struct ModelKey;
    pub struct ChainKey;
    pub struct ResidueKey;
    pub struct AtomKey;
}
