//! Configuration tree ownership and node addressing.

use uuid::Uuid;

use crate::types::EngineError;
use crate::xml::node::XmlNode;

/// Address of a node inside a tree: the child indices walked from the root.
///
/// Paths are positional, so any structural mutation of the tree invalidates
/// previously computed paths; the lookup cache guards against this by
/// checking the tree revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    /// The root path (empty index list).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Extend with one child index.
    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// The parent path and this node's index within it; `None` at the root.
    pub fn parent(&self) -> Option<(NodePath, usize)> {
        let (&last, rest) = self.0.split_last()?;
        Some((Self(rest.to_vec()), last))
    }

    /// Number of steps from the root.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Walk the path from the given root.
    pub fn resolve<'a>(&self, root: &'a XmlNode) -> Option<&'a XmlNode> {
        let mut node = root;
        for &idx in &self.0 {
            node = node.children.get(idx)?;
        }
        Some(node)
    }

    /// Walk the path from the given root, mutable.
    pub fn resolve_mut<'a>(&self, root: &'a mut XmlNode) -> Option<&'a mut XmlNode> {
        let mut node = root;
        for &idx in &self.0 {
            node = node.children.get_mut(idx)?;
        }
        Some(node)
    }
}

/// An owned PAN-OS configuration document.
///
/// Carries a stable identity (for cache keying) and a revision counter that
/// is bumped on every mutable access, which is what invalidates cached
/// lookups and reference-graph snapshots.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    root: XmlNode,
    id: Uuid,
    revision: u64,
}

impl ConfigTree {
    /// Parse a configuration document. The root element must be `config`.
    pub fn parse(xml: &str) -> Result<Self, EngineError> {
        Self::from_root(XmlNode::parse_str(xml)?)
    }

    /// Wrap an already-built node tree. The root element must be `config`.
    pub fn from_root(root: XmlNode) -> Result<Self, EngineError> {
        if root.tag != "config" {
            return Err(EngineError::ParseError(format!(
                "root element is '{}', not 'config' - not a PAN-OS configuration",
                root.tag
            )));
        }
        Ok(Self {
            root,
            id: Uuid::new_v4(),
            revision: 0,
        })
    }

    /// The root element.
    pub fn root(&self) -> &XmlNode {
        &self.root
    }

    /// Mutable access to the root element. Bumps the revision: every cached
    /// lookup against this tree becomes stale.
    pub fn root_mut(&mut self) -> &mut XmlNode {
        self.revision += 1;
        &mut self.root
    }

    /// Stable tree identity for cache keying.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Mutation counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Resolve a node path.
    pub fn node(&self, path: &NodePath) -> Option<&XmlNode> {
        path.resolve(&self.root)
    }

    /// Resolve a node path mutably. Bumps the revision.
    pub fn node_mut(&mut self, path: &NodePath) -> Option<&mut XmlNode> {
        self.revision += 1;
        path.resolve_mut(&mut self.root)
    }

    /// Serialize as a pretty-printed UTF-8 document with XML declaration.
    pub fn to_xml_string(&self) -> String {
        self.root.to_pretty_xml()
    }
}
