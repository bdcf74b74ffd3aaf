//! Applying "new configuration observed" events to a version chain.
//!
//! A mutation is all-or-nothing. Every check and every fallible step (payload
//! validation, key allocation, edge typing) happens against locals first; the
//! chain is only touched by [`AssetChain::commit_successor`], which cannot
//! fail. A rejected mutation therefore leaves the chain exactly as it was.

use crate::arena::KeyArena;
use crate::chain::{allocate_version, link_version, AssetChain, AssetHandle};
use crate::error::{Result, TimegraphError};
use crate::payload::Payload;
use crate::time::Timestamp;
use crate::ttl::TtlPolicyEngine;

#[derive(Debug, Clone, Copy)]
pub struct TemporalMutationEngine {
    ttl: TtlPolicyEngine,
}

impl TemporalMutationEngine {
    pub fn new(ttl: TtlPolicyEngine) -> Self {
        Self { ttl }
    }

    /// Retire the current version at `observed_at` and open a successor
    /// carrying `payload`, linked to the same anchors.
    ///
    /// `&mut AssetChain` is the exclusive section: one writer per asset.
    pub fn observe_new_configuration(
        &self,
        chain: &mut AssetChain,
        arena: &mut KeyArena,
        payload: Payload,
        observed_at: Timestamp,
        now: Timestamp,
    ) -> Result<AssetHandle> {
        let asset = chain.asset_key().clone();
        payload.validate(chain.kind())?;

        let current = chain
            .current()
            .ok_or_else(|| TimegraphError::NoCurrentVersion {
                asset: asset.clone(),
            })?;
        // A successor created at the same instant would leave the retired
        // version with an empty window.
        if observed_at <= current.validity.created_at {
            return Err(TimegraphError::StaleMutation {
                asset,
                observed_at,
                current_created_at: current.validity.created_at,
            });
        }
        // NEVER is the open-window sentinel, not an instant.
        if observed_at.is_never() || observed_at > now {
            return Err(TimegraphError::FutureObservation {
                asset,
                observed_at,
                now,
            });
        }
        let retiring = current.key.clone();

        let next = allocate_version(arena, chain.kind(), payload, observed_at);
        let edges = link_version(arena, chain.proxy_in(), &next, chain.proxy_out())?;

        tracing::debug!(
            asset = %asset,
            retired = %retiring,
            current = %next.key,
            at = %observed_at,
            "observed new configuration"
        );
        chain.commit_successor(&retiring, observed_at, &self.ttl, next, edges);
        chain.handle()
    }
}
