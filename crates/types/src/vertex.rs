//! Vertex: a proposed unit of work in the consensus chain.

use crate::{signing, Command, Hash, QuorumCertificate, View};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A proposed vertex.
///
/// The identifier is computed once at construction from the view, the parent
/// QC reference and the command ids; fields are private so it can never go
/// stale. A vertex without a parent QC is the genesis vertex.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "VertexFields", into = "VertexFields")]
pub struct Vertex {
    id: Hash,
    view: View,
    parent_qc: Option<QuorumCertificate>,
    commands: Vec<Command>,
}

/// Serialized form; the id is recomputed on decode.
#[derive(Serialize, Deserialize)]
struct VertexFields {
    view: View,
    parent_qc: Option<QuorumCertificate>,
    commands: Vec<Command>,
}

impl Vertex {
    /// Create a vertex extending the vertex certified by `parent_qc`.
    pub fn new(view: View, parent_qc: QuorumCertificate, commands: Vec<Command>) -> Self {
        Self::build(view, Some(parent_qc), commands)
    }

    /// The genesis vertex: view 0, no parent, no commands.
    pub fn genesis() -> Self {
        Self::build(View::GENESIS, None, Vec::new())
    }

    fn build(view: View, parent_qc: Option<QuorumCertificate>, commands: Vec<Command>) -> Self {
        let command_ids: Vec<Hash> = commands.iter().map(Command::id).collect();
        let id = signing::vertex_id(
            view,
            parent_qc.as_ref().map(|qc| (&qc.vertex_id, qc.view)),
            &command_ids,
        );
        Self {
            id,
            view,
            parent_qc,
            commands,
        }
    }

    pub fn id(&self) -> Hash {
        self.id
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// QC certifying the parent; `None` only for genesis.
    pub fn parent_qc(&self) -> Option<&QuorumCertificate> {
        self.parent_qc.as_ref()
    }

    /// Identifier of the parent vertex; `None` only for genesis.
    pub fn parent_id(&self) -> Option<Hash> {
        self.parent_qc.as_ref().map(|qc| qc.vertex_id)
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_genesis(&self) -> bool {
        self.parent_qc.is_none()
    }
}

impl From<VertexFields> for Vertex {
    fn from(fields: VertexFields) -> Self {
        Self::build(fields.view, fields.parent_qc, fields.commands)
    }
}

impl From<Vertex> for VertexFields {
    fn from(vertex: Vertex) -> Self {
        Self {
            view: vertex.view,
            parent_qc: vertex.parent_qc,
            commands: vertex.commands,
        }
    }
}

impl fmt::Debug for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vertex")
            .field("id", &self.id)
            .field("view", &self.view)
            .field("parent", &self.parent_id())
            .field("commands", &self.commands.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis() {
        let genesis = Vertex::genesis();
        assert!(genesis.is_genesis());
        assert_eq!(genesis.view(), View::GENESIS);
        assert_eq!(genesis.parent_id(), None);
        assert_eq!(genesis.id(), Vertex::genesis().id());
    }

    #[test]
    fn test_id_computed_at_construction() {
        let genesis = Vertex::genesis();
        let qc = QuorumCertificate::genesis(genesis.id());

        let a = Vertex::new(View(1), qc.clone(), vec![Command::new(b"a".to_vec())]);
        let b = Vertex::new(View(1), qc.clone(), vec![Command::new(b"b".to_vec())]);
        let c = Vertex::new(View(2), qc, vec![Command::new(b"a".to_vec())]);

        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(a.parent_id(), Some(genesis.id()));
    }

    #[test]
    fn test_deserialize_recomputes_id() {
        let genesis = Vertex::genesis();
        let vertex = Vertex::new(
            View(1),
            QuorumCertificate::genesis(genesis.id()),
            vec![Command::new(b"payload".to_vec())],
        );

        let json = serde_json::to_string(&vertex).unwrap();
        let decoded: Vertex = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, vertex);
        assert_eq!(decoded.id(), vertex.id());
    }
}
