//! XML access layer: owned tree, addressing, XPath-subset evaluation,
//! lookup caching, and structural diff.

pub mod cache;
pub mod diff;
pub mod node;
pub mod path;
pub mod tree;

pub use cache::{CacheConfig, CacheStats, LookupCache};
pub use diff::{compare, format_text, similarity_score, DiffItem, DiffType};
pub use node::{merge_element, XmlNode};
pub use path::{ensure_path, find_first, find_paths, matches, select, XPath};
pub use tree::{ConfigTree, NodePath};
