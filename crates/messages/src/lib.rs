//! Network messages for the consensus protocol.
//!
//! Payload encoding belongs to the transport; these types only derive serde
//! so any codec can carry them.

mod new_view;
mod proposal;
mod vote;

pub use new_view::NewViewMessage;
pub use proposal::Proposal;
pub use vote::VoteMessage;

/// A message that travels over the consensus network.
pub trait NetworkMessage {
    /// Stable identifier the transport uses to route and decode the message.
    fn message_type_id() -> &'static str;
}
