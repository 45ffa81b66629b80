//! Domain-separated signing for consensus messages.
//!
//! Every signed or hashed consensus structure starts with its own domain tag,
//! so a signature produced for one message type can never be replayed as
//! another.
//!
//! | Tag | Purpose |
//! |-----|---------|
//! | `bft_vertex:` | Vertex identifiers |
//! | `bft_vote:` | Votes, and QC signature verification |
//! | `bft_proposal:` | Proposer signature over a vertex |
//! | `bft_new_view:` | NewView messages |

use crate::{Hash, View};

/// Domain tag for vertex identifiers.
///
/// Format: `bft_vertex:` || view || parent_vertex_id || parent_view || command_ids
pub const DOMAIN_VERTEX: &[u8] = b"bft_vertex:";

/// Domain tag for votes.
///
/// Format: `bft_vote:` || view || vertex_id
pub const DOMAIN_VOTE: &[u8] = b"bft_vote:";

/// Domain tag for proposals.
///
/// Format: `bft_proposal:` || view || vertex_id
pub const DOMAIN_PROPOSAL: &[u8] = b"bft_proposal:";

/// Domain tag for NewView messages.
///
/// Format: `bft_new_view:` || view || qc_vertex_id || qc_view
pub const DOMAIN_NEW_VIEW: &[u8] = b"bft_new_view:";

/// Build the signing message for a vote.
///
/// Used both for individual vote signatures and for verifying every signature
/// collected in a quorum certificate.
pub fn vote_message(view: View, vertex_id: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_VOTE.len() + 40);
    message.extend_from_slice(DOMAIN_VOTE);
    message.extend_from_slice(&view.0.to_le_bytes());
    message.extend_from_slice(vertex_id.as_bytes());
    message
}

/// Build the signing message for a proposal.
pub fn proposal_message(view: View, vertex_id: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_PROPOSAL.len() + 40);
    message.extend_from_slice(DOMAIN_PROPOSAL);
    message.extend_from_slice(&view.0.to_le_bytes());
    message.extend_from_slice(vertex_id.as_bytes());
    message
}

/// Build the signing message for a NewView.
///
/// Binds the view being entered to the QC the sender hands over, so the QC
/// cannot be swapped in transit.
pub fn new_view_message(view: View, qc_vertex_id: &Hash, qc_view: View) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_NEW_VIEW.len() + 48);
    message.extend_from_slice(DOMAIN_NEW_VIEW);
    message.extend_from_slice(&view.0.to_le_bytes());
    message.extend_from_slice(qc_vertex_id.as_bytes());
    message.extend_from_slice(&qc_view.0.to_le_bytes());
    message
}

/// Compute a vertex identifier.
///
/// The genesis vertex has no parent; it hashes the zero id at view 0 in the
/// parent slot.
pub fn vertex_id(view: View, parent: Option<(&Hash, View)>, command_ids: &[Hash]) -> Hash {
    let (parent_id, parent_view) = parent.unwrap_or((&Hash::ZERO, View::GENESIS));
    let view_bytes = view.0.to_le_bytes();
    let parent_view_bytes = parent_view.0.to_le_bytes();
    let header: [&[u8]; 4] = [
        DOMAIN_VERTEX,
        &view_bytes,
        parent_id.as_bytes(),
        &parent_view_bytes,
    ];
    Hash::from_part_iter(
        header
            .into_iter()
            .chain(command_ids.iter().map(|id| id.as_bytes().as_slice())),
    )
}
