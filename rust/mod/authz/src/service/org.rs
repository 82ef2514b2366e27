//! Organizational hierarchy: company code → plant → storage location.
//!
//! Loaded once into an arena. Parent links are resolved against the level
//! above only, so the structure is acyclic by construction.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{DomainSource, DomainValue, FieldDomain};
use crate::service::domain::{DomainResolver, EntityKind, ReferenceRow, entity_schema};
use crate::service::{AuthzError, AuthzService};

/// Levels of the hierarchy, top first.
const LEVELS: [EntityKind; 3] = [
    EntityKind::CompanyCode,
    EntityKind::Plant,
    EntityKind::StorageLocation,
];

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrgNode {
    pub kind: EntityKind,
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
}

/// Arena of organizational units with adjacency by parent.
#[derive(Debug, Default)]
pub struct OrgTree {
    nodes: Vec<OrgNode>,
    by_key: HashMap<(EntityKind, String), NodeId>,
    children: HashMap<NodeId, Vec<NodeId>>,
    roots: Vec<NodeId>,
    orphans: Vec<NodeId>,
}

impl OrgTree {
    /// Read every level from the reference-data collaborator.
    pub fn load(resolver: &dyn DomainResolver) -> Result<Self, AuthzError> {
        let mut levels = Vec::with_capacity(LEVELS.len());
        for kind in LEVELS {
            levels.push((kind, resolver.reference_rows(kind)?));
        }
        Ok(Self::build(levels))
    }

    /// Build from rows grouped by level, top level first.
    pub fn build(levels: Vec<(EntityKind, Vec<ReferenceRow>)>) -> Self {
        let mut tree = Self::default();
        let mut previous: Option<EntityKind> = None;

        for (kind, rows) in levels {
            for row in rows {
                let parent = match (previous, row.parent.as_deref()) {
                    (Some(parent_kind), Some(parent_code)) => {
                        tree.find(parent_kind, parent_code)
                    }
                    _ => None,
                };
                let id = tree.nodes.len();
                tree.by_key.insert((kind, row.code.clone()), id);
                tree.nodes.push(OrgNode {
                    kind,
                    code: row.code,
                    name: row.name,
                    parent,
                });
                match parent {
                    Some(p) => tree.children.entry(p).or_default().push(id),
                    None if previous.is_none() => tree.roots.push(id),
                    None => tree.orphans.push(id),
                }
            }
            previous = Some(kind);
        }

        if !tree.orphans.is_empty() {
            warn!(orphans = tree.orphans.len(), "organizational units without a known parent");
        }
        debug!(nodes = tree.nodes.len(), roots = tree.roots.len(), "org tree built");
        tree
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&OrgNode> {
        self.nodes.get(id)
    }

    pub fn find(&self, kind: EntityKind, code: &str) -> Option<NodeId> {
        self.by_key.get(&(kind, code.to_string())).copied()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Units whose parent was not found on the level above.
    pub fn orphans(&self) -> &[NodeId] {
        &self.orphans
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All units below `id`, depth first, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// `id` and its ancestors, nearest first.
    pub fn path_to_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut cursor = self.nodes.get(id).map(|_| id);
        while let Some(current) = cursor {
            path.push(current);
            cursor = self.nodes[current].parent;
        }
        path
    }

    /// Domain of a hierarchical field narrowed to the children of one unit.
    ///
    /// `field_code` must map to a level with a parent (plant, storage
    /// location); `parent_code` is a unit of the level above.
    pub fn scoped_domain(&self, field_code: &str, parent_code: &str) -> Result<FieldDomain, AuthzError> {
        let schema = entity_schema(field_code)
            .ok_or_else(|| AuthzError::NotFound(format!("unknown field: {field_code}")))?;
        let parent_kind = schema.parent_kind.ok_or_else(|| {
            AuthzError::Validation(format!("field '{field_code}' has no parent level"))
        })?;
        let parent = self.find(parent_kind, parent_code).ok_or_else(|| {
            AuthzError::NotFound(format!("{} '{parent_code}'", parent_kind.as_str()))
        })?;

        let values = self
            .children(parent)
            .iter()
            .map(|&id| &self.nodes[id])
            .filter(|node| node.kind == schema.kind)
            .map(|node| DomainValue {
                value: node.code.clone(),
                label: format!("{} - {}", node.code, node.name),
            })
            .collect();
        Ok(FieldDomain::new(
            field_code,
            values,
            DomainSource::Reference {
                table: schema.table.to_string(),
            },
        ))
    }
}

impl AuthzService {
    /// Load the organizational hierarchy from reference data.
    pub fn org_tree(&self) -> Result<OrgTree, AuthzError> {
        OrgTree::load(self.domains.as_ref())
    }
}
