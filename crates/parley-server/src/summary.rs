//! Per-peer inbox rows, derived on demand from the message store.

use tracing::debug;

use parley_shared::protocol::ThreadSummary;
use parley_shared::UserId;

use crate::store::Store;

/// Summary of the thread between `owner` and `peer`, from `owner`'s side.
///
/// Never fails: if either account cannot be resolved, or the store errors,
/// the neutral [`ThreadSummary::empty`] is returned.
pub async fn summarize(store: &Store, owner: UserId, peer: UserId) -> ThreadSummary {
    let result = store
        .run(move |db| {
            let owner = db.get_user(owner)?;
            let peer = db.get_user(peer)?;
            let (last, unread_count) = db.last_and_unread(owner.id, peer.id)?;

            Ok(ThreadSummary {
                user: Some(peer.public()),
                unread_count,
                last_message: last.map(|m| m.last_message_for(&owner, &peer)),
            })
        })
        .await;

    match result {
        Ok(summary) => summary,
        Err(e) => {
            debug!(%owner, %peer, error = %e, "thread summary unavailable");
            ThreadSummary::empty()
        }
    }
}
