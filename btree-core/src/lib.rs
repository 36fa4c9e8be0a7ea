//! The tree layer: node layout/accessors, metadata page, the tree itself
//! (init/open/get/put/range/validate), and the recycler client glue that
//! lets `buffer-manager`'s GC call back into the tree's remap table.

pub mod iterator;
pub mod layout;
pub mod metadata;
pub mod node;
pub mod tree;

pub use iterator::RangeIter;
pub use layout::{HeaderLayout, NodeLayout};
pub use metadata::Metadata;
pub use tree::Tree;
