//! Search over network action combinations.

pub mod bloomer;
pub mod leaf;
pub mod tree;

pub use bloomer::Bloomer;
pub use leaf::{Leaf, LeafStatus};
pub use tree::{SearchTree, SearchTreeResult};
