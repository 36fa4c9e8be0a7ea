//! The tree's metadata page: root page id plus the fanout parameters, so
//! `Tree::open` can reconstruct a `NodeLayout` without trusting the caller
//! to pass back the exact same `Config` used at `init` time.
//!
//! Grounded in the teacher's `storage-engine::index::metadata::IndexMetadata`,
//! trimmed of the teacher's `KeyType` enum (this workspace only has
//! fixed-size byte keys) and extended with the variant tag.

use common::{PageId, Variant};

pub const METADATA_PAGE_ID: PageId = 0;

#[derive(Debug, Clone, Copy)]
pub struct Metadata {
    pub root_page_id: PageId,
    pub variant: Variant,
    pub key_size: u16,
    pub data_size: u16,
    pub max_leaf_records: u16,
    pub max_interior_keys: u16,
}

impl Metadata {
    pub fn serialize(&self, buf: &mut [u8]) {
        buf.fill(0);
        buf[0..4].copy_from_slice(&self.root_page_id.to_le_bytes());
        buf[4] = match self.variant {
            Variant::A => 0,
            Variant::B => 1,
        };
        buf[6..8].copy_from_slice(&self.key_size.to_le_bytes());
        buf[8..10].copy_from_slice(&self.data_size.to_le_bytes());
        buf[10..12].copy_from_slice(&self.max_leaf_records.to_le_bytes());
        buf[12..14].copy_from_slice(&self.max_interior_keys.to_le_bytes());
    }

    pub fn deserialize(buf: &[u8]) -> Self {
        let root_page_id = PageId::from_le_bytes(buf[0..4].try_into().unwrap());
        let variant = if buf[4] == 0 { Variant::A } else { Variant::B };
        let key_size = u16::from_le_bytes(buf[6..8].try_into().unwrap());
        let data_size = u16::from_le_bytes(buf[8..10].try_into().unwrap());
        let max_leaf_records = u16::from_le_bytes(buf[10..12].try_into().unwrap());
        let max_interior_keys = u16::from_le_bytes(buf[12..14].try_into().unwrap());
        Self { root_page_id, variant, key_size, data_size, max_leaf_records, max_interior_keys }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_roundtrips() {
        let md = Metadata {
            root_page_id: 42,
            variant: Variant::B,
            key_size: 4,
            data_size: 8,
            max_leaf_records: 30,
            max_interior_keys: 29,
        };
        let mut buf = [0u8; 64];
        md.serialize(&mut buf);
        let back = Metadata::deserialize(&buf);
        assert_eq!(back.root_page_id, 42);
        assert_eq!(back.variant, Variant::B);
        assert_eq!(back.key_size, 4);
        assert_eq!(back.data_size, 8);
        assert_eq!(back.max_leaf_records, 30);
        assert_eq!(back.max_interior_keys, 29);
    }
}
