//! Embedder policy hooks.

use async_trait::async_trait;

use crate::error::AgentError;
use crate::key::manager::PubKeyItem;
use crate::key::KeyInfo;
use crate::proto::extension::MatchInfo;
use crate::proto::Extension;

/// Policy decisions a [`Session`](super::Session) delegates to the embedder.
///
/// All hooks have permissive defaults, so a unit struct is a valid
/// implementation for an agent without interactive policy. The confirmation
/// and selection hooks may block for as long as the user takes; the session
/// suspends on them and resumes when they resolve.
#[async_trait]
pub trait SessionHooks: Send + Sync {
    /// Ask the user to approve a signature with `key`.
    ///
    /// `match_info` carries the destination-constraint hop that matched, for
    /// display; its fields are empty for unconstrained keys. Only invoked
    /// when the key (or [`requires_confirmation`](Self::requires_confirmation))
    /// demands it.
    async fn confirm(&self, _key: &KeyInfo, _match_info: &MatchInfo) -> bool {
        true
    }

    /// Session-level confirmation policy, OR-ed with the per-key flag.
    async fn requires_confirmation(&self, _key: &KeyInfo) -> bool {
        false
    }

    /// Let the user narrow an identity listing before it is sent.
    async fn select_identities(&self, items: Vec<PubKeyItem>) -> Vec<PubKeyItem> {
        items
    }

    /// Handle an embedder-defined protocol extension.
    ///
    /// Return `Ok(true)` when handled (the session replies SUCCESS);
    /// `Ok(false)` passes the extension on to the built-in handlers.
    async fn process_extension(&self, _extension: &Extension) -> Result<bool, AgentError> {
        Ok(false)
    }
}

/// Hook set with every default left in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveHooks;

#[async_trait]
impl SessionHooks for PermissiveHooks {}
