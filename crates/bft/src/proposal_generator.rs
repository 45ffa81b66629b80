//! Builds vertices from mempool commands.

use crate::VertexStore;
use chainbft_core::Mempool;
use chainbft_types::{Hash, QuorumCertificate, Vertex, View};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Draws commands for a new vertex, skipping any already carried by an
/// uncommitted ancestor.
pub struct ProposalGenerator {
    mempool: Arc<dyn Mempool>,
    max_commands: usize,

    /// Commands committed while handling the current event. The runner
    /// clears them from the mempool only after the event's actions run.
    committing: HashSet<Hash>,
}

impl std::fmt::Debug for ProposalGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProposalGenerator")
            .field("max_commands", &self.max_commands)
            .field("committing", &self.committing.len())
            .finish_non_exhaustive()
    }
}

impl ProposalGenerator {
    pub fn new(mempool: Arc<dyn Mempool>, max_commands: usize) -> Self {
        Self {
            mempool,
            max_commands,
            committing: HashSet::new(),
        }
    }

    /// Forget commands committed by the previous event; its actions have run.
    pub fn begin_event(&mut self) {
        self.committing.clear();
    }

    /// Exclude `vertex`'s commands until the next event.
    pub fn mark_committed(&mut self, vertex: &Vertex) {
        self.committing
            .extend(vertex.commands().iter().map(|c| c.id()));
    }

    /// Build the vertex for `view` extending the vertex `parent_qc` certifies.
    pub fn generate(
        &self,
        view: View,
        parent_qc: &QuorumCertificate,
        vertices: &VertexStore,
    ) -> Vertex {
        let mut exclude = vertices.uncommitted_command_ids(&parent_qc.vertex_id);
        exclude.extend(self.committing.iter().copied());
        let commands = self.mempool.get_commands(self.max_commands, &exclude);
        debug!(
            view = view.0,
            commands = commands.len(),
            excluded = exclude.len(),
            "Generated vertex"
        );
        Vertex::new(view, parent_qc.clone(), commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainbft_test_helpers::{child_of, RecordingMempool, TestValidators};
    use chainbft_types::Command;

    #[test]
    fn test_excludes_uncommitted_ancestors() {
        let validators = TestValidators::new(4);
        let a = Command::new(b"a".to_vec());
        let b = Command::new(b"b".to_vec());
        let mempool = Arc::new(RecordingMempool::with_commands(vec![a.clone(), b.clone()]));
        let generator = ProposalGenerator::new(mempool, 10);

        let mut vertices = VertexStore::new(Vertex::genesis());
        let parent = child_of(&validators, &Vertex::genesis(), View(1), vec![a]);
        vertices.insert_vertex(parent.clone()).unwrap();

        let parent_qc = chainbft_test_helpers::certify(&validators, &parent);
        let vertex = generator.generate(View(2), &parent_qc, &vertices);

        assert_eq!(vertex.view(), View(2));
        assert_eq!(vertex.parent_id(), Some(parent.id()));
        assert_eq!(vertex.commands(), &[b]);
    }

    #[test]
    fn test_excludes_commands_committed_this_event() {
        let validators = TestValidators::new(4);
        let a = Command::new(b"a".to_vec());
        let b = Command::new(b"b".to_vec());
        let mempool = Arc::new(RecordingMempool::with_commands(vec![a.clone(), b.clone()]));
        let mut generator = ProposalGenerator::new(mempool, 10);
        let vertices = VertexStore::new(Vertex::genesis());
        let genesis_qc = QuorumCertificate::genesis(Vertex::genesis().id());

        let committed = child_of(&validators, &Vertex::genesis(), View(1), vec![a]);
        generator.mark_committed(&committed);
        assert_eq!(generator.generate(View(2), &genesis_qc, &vertices).commands(), &[b.clone()]);

        generator.begin_event();
        assert_eq!(generator.generate(View(2), &genesis_qc, &vertices).commands().len(), 2);
    }

    #[test]
    fn test_respects_max_commands() {
        let commands: Vec<Command> = (0..5u8).map(|i| Command::new(vec![i])).collect();
        let generator = ProposalGenerator::new(
            Arc::new(RecordingMempool::with_commands(commands.clone())),
            2,
        );
        let vertices = VertexStore::new(Vertex::genesis());
        let genesis_qc = QuorumCertificate::genesis(Vertex::genesis().id());

        let vertex = generator.generate(View(1), &genesis_qc, &vertices);
        assert_eq!(vertex.commands(), &commands[..2]);
    }
}
