use crate::tip::TipWindow;
use crate::traits::FetchOperator;
use crate::types::Result;
use tracing::{debug, info, warn};

/// Outcome of validating the tip against the remote site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TipStatus {
    /// The cursor still resolves, or there was nothing to check.
    Valid,
    /// The cursor no longer resolved and was evicted; the next entry is now
    /// the cursor.
    Repaired { evicted: String },
    /// The cursor was evicted and nothing was left behind it. The next fetch
    /// will be broad.
    Exhausted { evicted: String },
}

impl TipStatus {
    pub fn was_broken(&self) -> bool {
        !matches!(self, TipStatus::Valid)
    }
}

/// Heals the tip when the post it points at has been deleted upstream.
pub struct TipRepairer;

impl TipRepairer {
    /// Check that the cursor still exists and evict it if it does not.
    ///
    /// Evicts at most one entry per call; callers that want to walk further
    /// back call again.
    pub async fn fix_tip(tip: &mut TipWindow, operator: &dyn FetchOperator) -> Result<TipStatus> {
        let ids = tip.ids();
        if ids.is_empty() {
            debug!("Tip holds only the placeholder, nothing to validate");
            return Ok(TipStatus::Valid);
        }

        let posts = operator.resolve_by_ids(&ids).await?;
        let front = tip.front().to_owned();
        if posts.iter().any(|post| post.name == front) {
            debug!("Tip {} still resolves", front);
            return Ok(TipStatus::Valid);
        }

        let evicted = tip.evict_front().unwrap_or(front);
        if tip.is_placeholder() {
            warn!("Tip {} is gone and no fallback remains; next fetch will be broad", evicted);
            Ok(TipStatus::Exhausted { evicted })
        } else {
            info!("Tip {} is gone, falling back to {}", evicted, tip.front());
            Ok(TipStatus::Repaired { evicted })
        }
    }
}
