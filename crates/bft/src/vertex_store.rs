//! Vertex store and the three-chain commit rule.

use chainbft_types::{Hash, QuorumCertificate, Vertex, View};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Errors inserting a vertex.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VertexStoreError {
    /// The parent is not stored. The caller fetches it and retries.
    #[error("vertex {vertex:?} references unknown parent {parent:?}")]
    MissingParent { vertex: Hash, parent: Hash },

    #[error("vertex view {view} is not above parent view {parent_view}")]
    NonIncreasingView { view: View, parent_view: View },

    #[error("parent QC claims {qc_view} but parent vertex is at {parent_view}")]
    ParentViewMismatch { qc_view: View, parent_view: View },
}

/// Comparable summary of the store contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexStoreSnapshot {
    pub vertices: BTreeSet<Hash>,
    pub certified: BTreeSet<Hash>,
    pub root: Hash,
}

/// Arena of uncommitted vertices rooted at the last committed vertex.
///
/// Parent links are ids looked up in the arena. Every stored vertex descends
/// from the root; when the root moves, everything that does not descend from
/// the new root is dropped.
#[derive(Debug)]
pub struct VertexStore {
    vertices: HashMap<Hash, Arc<Vertex>>,
    children: HashMap<Hash, Vec<Hash>>,
    certified: HashMap<Hash, QuorumCertificate>,
    root: Arc<Vertex>,
}

impl VertexStore {
    /// Create a store rooted at `genesis`.
    pub fn new(genesis: Vertex) -> Self {
        let root = Arc::new(genesis);
        let genesis_qc = QuorumCertificate::genesis(root.id());
        let mut vertices = HashMap::new();
        vertices.insert(root.id(), Arc::clone(&root));
        let mut certified = HashMap::new();
        certified.insert(root.id(), genesis_qc);

        Self {
            vertices,
            children: HashMap::new(),
            certified,
            root,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn contains(&self, id: &Hash) -> bool {
        self.vertices.contains_key(id)
    }

    pub fn get(&self, id: &Hash) -> Option<&Arc<Vertex>> {
        self.vertices.get(id)
    }

    /// Last committed vertex.
    pub fn root(&self) -> &Arc<Vertex> {
        &self.root
    }

    pub fn committed_view(&self) -> View {
        self.root.view()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Whether a QC for `id` has been recorded.
    pub fn is_certified(&self, id: &Hash) -> bool {
        self.certified.contains_key(id)
    }

    /// The recorded QC for `id`.
    pub fn certificate(&self, id: &Hash) -> Option<&QuorumCertificate> {
        self.certified.get(id)
    }

    pub fn snapshot(&self) -> VertexStoreSnapshot {
        VertexStoreSnapshot {
            vertices: self.vertices.keys().copied().collect(),
            certified: self.certified.keys().copied().collect(),
            root: self.root.id(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Insertion
    // ═══════════════════════════════════════════════════════════════════════════

    /// Insert a vertex whose parent is already stored.
    ///
    /// Applies the vertex's parent QC and returns the vertices that committed
    /// as a result, in view order. Vertices already stored, or at or below the
    /// committed view, are accepted as no-ops.
    pub fn insert_vertex(&mut self, vertex: Vertex) -> Result<Vec<Arc<Vertex>>, VertexStoreError> {
        let id = vertex.id();
        if self.vertices.contains_key(&id) {
            trace!(vertex = ?id, "Vertex already stored");
            return Ok(vec![]);
        }
        if vertex.view() <= self.committed_view() {
            debug!(
                vertex = ?id,
                view = vertex.view().0,
                committed_view = self.committed_view().0,
                "Ignoring vertex at or below committed view"
            );
            return Ok(vec![]);
        }
        let Some(parent_qc) = vertex.parent_qc().cloned() else {
            return Ok(vec![]);
        };

        let parent = self
            .vertices
            .get(&parent_qc.vertex_id)
            .ok_or(VertexStoreError::MissingParent {
                vertex: id,
                parent: parent_qc.vertex_id,
            })?;
        if vertex.view() <= parent.view() {
            return Err(VertexStoreError::NonIncreasingView {
                view: vertex.view(),
                parent_view: parent.view(),
            });
        }
        if parent_qc.view != parent.view() {
            return Err(VertexStoreError::ParentViewMismatch {
                qc_view: parent_qc.view,
                parent_view: parent.view(),
            });
        }

        debug!(vertex = ?id, view = vertex.view().0, "Inserted vertex");
        self.children
            .entry(parent_qc.vertex_id)
            .or_default()
            .push(id);
        self.vertices.insert(id, Arc::new(vertex));

        Ok(self.add_qc(parent_qc))
    }

    /// Record a QC and apply the three-chain commit rule.
    ///
    /// If the certified vertex and its parent and grandparent sit at three
    /// consecutive views, the grandparent commits together with every
    /// uncommitted ancestor. Returns the newly committed vertices in view
    /// order; a replayed QC commits nothing.
    pub fn add_qc(&mut self, qc: QuorumCertificate) -> Vec<Arc<Vertex>> {
        let certified_id = qc.vertex_id;
        let Some(certified) = self.vertices.get(&certified_id) else {
            trace!(vertex = ?certified_id, "QC for vertex not in store");
            return vec![];
        };
        if certified.view() != qc.view {
            warn!(
                vertex = ?certified_id,
                vertex_view = certified.view().0,
                qc_view = qc.view.0,
                "Ignoring QC with mismatched view"
            );
            return vec![];
        }
        self.certified.entry(certified_id).or_insert(qc);

        let Some(commit_id) = self.three_chain_head(&certified_id) else {
            return vec![];
        };
        self.commit(commit_id)
    }

    /// The grandparent of `certified_id` if the three form a consecutive
    /// chain above the committed view.
    fn three_chain_head(&self, certified_id: &Hash) -> Option<Hash> {
        let certified = self.vertices.get(certified_id)?;
        let parent = self.vertices.get(&certified.parent_id()?)?;
        let grandparent = self.vertices.get(&parent.parent_id()?)?;

        let consecutive = certified.view().0 == parent.view().0 + 1
            && parent.view().0 == grandparent.view().0 + 1;
        if !consecutive || grandparent.view() <= self.committed_view() {
            return None;
        }
        Some(grandparent.id())
    }

    fn commit(&mut self, head: Hash) -> Vec<Arc<Vertex>> {
        let mut path = Vec::new();
        let mut cursor = head;
        while cursor != self.root.id() {
            let Some(vertex) = self.vertices.get(&cursor) else {
                warn!(vertex = ?head, "Commit head does not descend from root");
                return vec![];
            };
            path.push(Arc::clone(vertex));
            let Some(parent) = vertex.parent_id() else {
                warn!(vertex = ?head, "Commit head does not descend from root");
                return vec![];
            };
            cursor = parent;
        }
        path.reverse();

        let Some(new_root) = path.last().cloned() else {
            return vec![];
        };
        info!(
            vertex = ?new_root.id(),
            view = new_root.view().0,
            count = path.len(),
            "Committed vertices"
        );
        self.root = new_root;
        self.prune();
        path
    }

    /// Drop every vertex that does not descend from the root.
    fn prune(&mut self) {
        let mut keep = HashSet::new();
        let mut stack = vec![self.root.id()];
        while let Some(id) = stack.pop() {
            if keep.insert(id) {
                if let Some(children) = self.children.get(&id) {
                    stack.extend(children.iter().copied());
                }
            }
        }

        let before = self.vertices.len();
        self.vertices.retain(|id, _| keep.contains(id));
        self.children.retain(|id, _| keep.contains(id));
        self.certified.retain(|id, _| keep.contains(id));
        debug!(
            pruned = before - self.vertices.len(),
            remaining = self.vertices.len(),
            "Pruned vertex store"
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════════

    /// Command ids on the path from `from` back to the root, root excluded.
    pub fn uncommitted_command_ids(&self, from: &Hash) -> HashSet<Hash> {
        let mut ids = HashSet::new();
        let mut cursor = *from;
        while cursor != self.root.id() {
            let Some(vertex) = self.vertices.get(&cursor) else {
                break;
            };
            ids.extend(vertex.commands().iter().map(|c| c.id()));
            let Some(parent) = vertex.parent_id() else {
                break;
            };
            cursor = parent;
        }
        ids
    }
}
