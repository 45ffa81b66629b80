//! In-memory collaborators that record every call.

use chainbft_core::{Ledger, Mempool, NetworkSender, OutboundMessage};
use chainbft_messages::{NewViewMessage, Proposal, VoteMessage};
use chainbft_types::{Command, Hash, PublicKey, Vertex};
use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Debug, Default)]
struct MempoolInner {
    pending: Vec<Command>,
    committed: Vec<Hash>,
    rejected: Vec<Hash>,
}

/// FIFO mempool.
#[derive(Debug, Default)]
pub struct RecordingMempool {
    inner: Mutex<MempoolInner>,
}

impl RecordingMempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commands(commands: Vec<Command>) -> Self {
        let mempool = Self::default();
        mempool.inner.lock().pending = commands;
        mempool
    }

    pub fn add(&self, command: Command) {
        self.inner.lock().pending.push(command);
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn committed(&self) -> Vec<Hash> {
        self.inner.lock().committed.clone()
    }

    pub fn rejected(&self) -> Vec<Hash> {
        self.inner.lock().rejected.clone()
    }
}

impl Mempool for RecordingMempool {
    fn get_commands(&self, count: usize, exclude: &HashSet<Hash>) -> Vec<Command> {
        self.inner
            .lock()
            .pending
            .iter()
            .filter(|c| !exclude.contains(&c.id()))
            .take(count)
            .cloned()
            .collect()
    }

    fn remove_committed(&self, id: &Hash) {
        let mut inner = self.inner.lock();
        inner.pending.retain(|c| &c.id() != id);
        inner.committed.push(*id);
    }

    fn remove_rejected(&self, id: &Hash) {
        let mut inner = self.inner.lock();
        inner.pending.retain(|c| &c.id() != id);
        inner.rejected.push(*id);
    }
}

/// Records every message handed to the network.
#[derive(Debug, Default)]
pub struct RecordingNetwork {
    sent: Mutex<Vec<(PublicKey, OutboundMessage)>>,
}

impl RecordingNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far, with their targets.
    pub fn sent(&self) -> Vec<(PublicKey, OutboundMessage)> {
        self.sent.lock().clone()
    }

    /// Remove and return the recorded messages.
    pub fn take(&self) -> Vec<(PublicKey, OutboundMessage)> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl NetworkSender for RecordingNetwork {
    fn send_proposal(&self, target: &PublicKey, message: &Proposal) {
        self.sent
            .lock()
            .push((*target, OutboundMessage::Proposal(Box::new(message.clone()))));
    }

    fn send_vote(&self, target: &PublicKey, message: &VoteMessage) {
        self.sent
            .lock()
            .push((*target, OutboundMessage::Vote(message.clone())));
    }

    fn send_new_view(&self, target: &PublicKey, message: &NewViewMessage) {
        self.sent
            .lock()
            .push((*target, OutboundMessage::NewView(Box::new(message.clone()))));
    }
}

#[derive(Debug, Default)]
struct LedgerInner {
    delivered: Vec<Hash>,
    reject: HashSet<Hash>,
}

/// Records delivered vertices; rejects commands registered via
/// [`RecordingLedger::reject`].
#[derive(Debug, Default)]
pub struct RecordingLedger {
    inner: Mutex<LedgerInner>,
}

impl RecordingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject `command_id` whenever it is delivered.
    pub fn reject(&self, command_id: Hash) {
        self.inner.lock().reject.insert(command_id);
    }

    /// Ids of delivered vertices, in delivery order.
    pub fn delivered(&self) -> Vec<Hash> {
        self.inner.lock().delivered.clone()
    }
}

impl Ledger for RecordingLedger {
    fn deliver(&self, vertex: &Vertex) -> Vec<Hash> {
        let mut inner = self.inner.lock();
        inner.delivered.push(vertex.id());
        vertex
            .commands()
            .iter()
            .map(Command::id)
            .filter(|id| inner.reject.contains(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mempool_excludes_and_removes() {
        let a = Command::new(b"a".to_vec());
        let b = Command::new(b"b".to_vec());
        let c = Command::new(b"c".to_vec());
        let mempool = RecordingMempool::with_commands(vec![a.clone(), b.clone(), c.clone()]);

        let exclude = HashSet::from([a.id()]);
        assert_eq!(mempool.get_commands(1, &exclude), vec![b.clone()]);

        mempool.remove_committed(&b.id());
        mempool.remove_rejected(&c.id());
        assert_eq!(mempool.pending_len(), 1);
        assert_eq!(mempool.committed(), vec![b.id()]);
        assert_eq!(mempool.rejected(), vec![c.id()]);
    }
}
