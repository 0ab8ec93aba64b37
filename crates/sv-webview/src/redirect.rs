//! State that survives an external redirect (payment checkout, login):
//! the page to come back to and a share purchase to resume.

use crate::deeplink::{DeepLink, is_local_path};
use sv_storage::{KeyValueStore, session_keys};
use tracing::debug;

pub fn remember_return_url(session: &dyn KeyValueStore, path: &str) -> bool {
    if !is_local_path(path) {
        debug!(%path, "not remembering a return url outside this origin");
        return false;
    }
    sv_storage::soft_set(session, session_keys::RETURN_URL, path)
}

/// One-shot: the stored path is removed on read.
pub fn take_return_url(session: &dyn KeyValueStore) -> Option<String> {
    sv_storage::soft_take(session, session_keys::RETURN_URL).filter(|path| is_local_path(path))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPurchase {
    pub share_id: String,
    pub quantity: u32,
}

impl PendingPurchase {
    /// `?share_id=..&quantity=..`; quantity defaults to 1 and must be positive.
    pub fn from_query(query: &str) -> Option<Self> {
        let link = DeepLink::parse(query);
        let share_id = link.share_id.filter(|id| is_share_id(id))?;
        let quantity = match link.quantity {
            None => 1,
            Some(raw) => raw.parse::<u32>().ok().filter(|q| *q > 0)?,
        };
        Some(Self { share_id, quantity })
    }

    pub fn resume_path(&self) -> String {
        format!("/shares/{}/buy?quantity={}", self.share_id, self.quantity)
    }
}

/// Ids end up as a path segment, so only `[A-Za-z0-9_-]` is accepted.
fn is_share_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
