//! Partner search and claim
//!
//! Each waiting user has exactly one search loop. The loop polls
//! `find_oldest_compatible` every `search_interval` and exits as soon as the
//! user is no longer waiting or its token is cancelled.

use types::ids::UserId;
use types::request::{MatchRequest, RequestStatus};

use super::tasks::Slot;
use super::{Coordinator, CoordinatorError};
use crate::criteria;
use crate::protocol::ServerMessage;

#[derive(Debug, PartialEq, Eq)]
enum SearchOutcome {
    /// A pair was claimed (or the claim was handed back to fresh loops)
    Claimed,
    /// The candidate was taken first; search again right away
    Lost,
    NoCandidate,
    /// The request is gone or no longer waiting
    Done,
}

impl Coordinator {
    /// Start the search loop for `user`, replacing any running one
    pub(super) fn spawn_search(&self, user: UserId) {
        let slot = self.inner.searches.arm(user.clone());
        let this = self.clone();
        tokio::spawn(async move {
            this.search_loop(&user, &slot).await;
            this.inner.searches.finish(&user, slot.generation);
        });
    }

    async fn search_loop(&self, user: &UserId, slot: &Slot) {
        let interval = self.inner.config.search_interval;
        let mut lost_in_a_row = 0;

        loop {
            if slot.token.is_cancelled() {
                return;
            }

            match self.search_once(user).await {
                Ok(SearchOutcome::Claimed) | Ok(SearchOutcome::Done) => return,
                Ok(SearchOutcome::Lost) if lost_in_a_row < self.inner.config.max_transition_attempts => {
                    lost_in_a_row += 1;
                    tokio::task::yield_now().await;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    self.note_failure(&e);
                    if matches!(e, CoordinatorError::StoreUnavailable(_)) {
                        self.inner
                            .registry
                            .send(user, ServerMessage::error("matchmaking is temporarily unavailable"));
                        return;
                    }
                    tracing::warn!(user = %user, error = %e, "search attempt failed");
                }
            }
            lost_in_a_row = 0;

            tokio::select! {
                _ = slot.token.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn search_once(&self, user: &UserId) -> Result<SearchOutcome, CoordinatorError> {
        let requests = &self.inner.stores.requests;

        let Some(request) = requests.get(user).await? else {
            return Ok(SearchOutcome::Done);
        };
        if !request.is_waiting() {
            return Ok(SearchOutcome::Done);
        }

        let Some(candidate) = requests.find_oldest_compatible(user, &request.criteria).await? else {
            return Ok(SearchOutcome::NoCandidate);
        };

        let claimed = self
            .with_retry("claim", || {
                requests.atomic_transition(
                    user,
                    &candidate.user_id,
                    RequestStatus::Waiting,
                    RequestStatus::Pending,
                )
            })
            .await;

        match claimed {
            Ok(true) => {
                self.finalize_claim(user, &candidate.user_id).await?;
                Ok(SearchOutcome::Claimed)
            }
            Ok(false) => {
                tracing::debug!(user = %user, candidate = %candidate.user_id, "candidate claimed elsewhere");
                Ok(SearchOutcome::Lost)
            }
            Err(e) if e.is_transient() => {
                tracing::debug!(user = %user, error = %e, "claim contention persisted, retrying next cycle");
                Ok(SearchOutcome::NoCandidate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write both pair records after a successful claim
    ///
    /// Re-reads both requests under the pair lock: if either side left
    /// between the claim and now, the remaining side goes back to waiting.
    async fn finalize_claim(&self, a: &UserId, b: &UserId) -> Result<(), CoordinatorError> {
        let requests = &self.inner.stores.requests;
        let pairs = &self.inner.stores.pairs;
        let _guards = self.inner.locks.lock_all(&[a, b]).await;

        let ra = pending(requests.get(a).await?);
        let rb = pending(requests.get(b).await?);

        let (ra, rb) = match (ra, rb) {
            (Some(ra), Some(rb)) => (ra, rb),
            (ra, rb) => {
                for survivor in [ra, rb].into_iter().flatten() {
                    self.return_to_waiting(&survivor.user_id).await?;
                }
                tracing::info!(a = %a, b = %b, "claim abandoned, a participant left");
                return Ok(());
            }
        };

        let Some(agreed) = criteria::pick_common(&ra.criteria, &rb.criteria) else {
            tracing::error!(a = %a, b = %b, "claimed requests share no criterion, disposing both");
            self.force_dispose(a, b, "match could not be established").await?;
            return Ok(());
        };

        pairs.store(a, b, &agreed).await?;
        pairs.store(b, a, &agreed).await?;
        self.arm_timer(a, b, self.inner.config.acceptance_timeout);

        tracing::info!(a = %a, b = %b, criteria = %agreed, "pair claimed, awaiting acceptance");
        Ok(())
    }

    /// Put a pending request back into the search pool
    pub(super) async fn return_to_waiting(&self, user: &UserId) -> Result<bool, CoordinatorError> {
        let updated = self
            .inner
            .stores
            .requests
            .set_status(user, RequestStatus::Waiting)
            .await?;
        if updated {
            self.spawn_search(user.clone());
        }
        Ok(updated)
    }
}

fn pending(request: Option<MatchRequest>) -> Option<MatchRequest> {
    request.filter(|r| r.status == RequestStatus::Pending)
}
