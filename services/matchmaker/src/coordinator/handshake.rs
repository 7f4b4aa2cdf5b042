//! Acceptance handshake
//!
//! Covers everything after a claim: accept/reject, the acceptance timer,
//! resolution into a collaboration session, and withdrawal of a user at any
//! point. Timer fires and early resolutions re-check the stored pair before
//! acting, so a stale fire is a no-op.

use std::time::Duration;
use types::errors::StoreError;
use types::ids::{PairKey, UserId};
use types::request::RequestStatus;
use types::session::MatchedPair;

use super::{Coordinator, CoordinatorError, Departure};
use crate::protocol::ServerMessage;

const PARTNER_GONE: &str = "partner is no longer available";

impl Coordinator {
    /// (Re)start the resolution timer for the pair
    pub(super) fn arm_timer(&self, a: &UserId, b: &UserId, delay: Duration) {
        let key = PairKey::new(a, b);
        let slot = self.inner.timers.arm(key.clone());
        let this = self.clone();
        let (a, b) = (a.clone(), b.clone());

        tokio::spawn(async move {
            tokio::select! {
                _ = slot.token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    tracing::debug!(pair = %key, "acceptance timer fired");
                    if let Err(e) = this.resolve(&a, &b).await {
                        this.note_failure(&e);
                        tracing::warn!(pair = %key, error = %e, "pair resolution failed");
                    }
                }
            }
            this.inner.timers.finish(&key, slot.generation);
        });
    }

    pub(super) async fn accept_inner(&self, user: &UserId) -> Result<(), CoordinatorError> {
        let pairs = &self.inner.stores.pairs;

        let Some(partner) = pairs.get(user).await?.map(|p| p.partner) else {
            return Err(CoordinatorError::NoActiveMatch);
        };

        let resolve_now = {
            let _guards = self.inner.locks.lock_all(&[user, &partner]).await;

            // Re-check under the lock: the pair may have resolved meanwhile
            match pairs.get(user).await? {
                Some(mine) if mine.partner == partner => {}
                _ => return Err(CoordinatorError::NoActiveMatch),
            }
            pairs.update_acceptance(user).await?;
            tracing::info!(user = %user, partner = %partner, "match accepted");

            match pairs.get(&partner).await? {
                Some(theirs) if &theirs.partner == user => theirs.accepted,
                _ => {
                    // Partner vanished mid-handshake: back to the pool now
                    self.inner.timers.cancel(&PairKey::new(user, &partner));
                    pairs.remove(user).await?;
                    self.inner.registry.send(
                        user,
                        ServerMessage::MatchRejected {
                            reason: PARTNER_GONE.to_string(),
                        },
                    );
                    self.return_to_waiting(user).await?;
                    false
                }
            }
        };

        if resolve_now {
            self.resolve(user, &partner).await?;
        }
        Ok(())
    }

    pub(super) async fn reject_inner(&self, user: &UserId) -> Result<(), CoordinatorError> {
        if self.inner.stores.pairs.get(user).await?.is_none() {
            return Err(CoordinatorError::NoActiveMatch);
        }
        self.withdraw(user, Departure::Rejected).await
    }

    /// Remove `user` from matchmaking entirely
    ///
    /// If the user was part of a pair, the partner is told why and returns to
    /// waiting with its original criteria and submission time. Idempotent.
    pub(super) async fn withdraw(&self, user: &UserId, departure: Departure) -> Result<(), CoordinatorError> {
        let requests = &self.inner.stores.requests;
        let pairs = &self.inner.stores.pairs;

        loop {
            let partner = pairs.get(user).await?.map(|p| p.partner);

            let mut keys = vec![user];
            keys.extend(partner.as_ref());
            let guards = self.inner.locks.lock_all(&keys).await;

            if pairs.get(user).await?.map(|p| p.partner) != partner {
                // Paired or unpaired while we waited for the locks
                drop(guards);
                continue;
            }

            self.inner.searches.cancel(user);
            let had_request = requests.remove(user).await?;
            pairs.remove(user).await?;
            self.unwatch_pair(user);

            if let Some(partner) = &partner {
                let key = PairKey::new(user, partner);
                self.inner.timers.cancel(&key);
                self.inner.session_attempts.remove(&key);

                let linked = pairs.get(partner).await?.is_some_and(|p| &p.partner == user);
                if linked {
                    pairs.remove(partner).await?;
                    if self.return_to_waiting(partner).await? {
                        self.inner.registry.send(
                            partner,
                            ServerMessage::MatchRejected {
                                reason: departure.partner_reason().to_string(),
                            },
                        );
                    }
                }
            }

            if had_request || partner.is_some() {
                tracing::info!(user = %user, ?departure, partner = ?partner, "left matchmaking");
            }
            return Ok(());
        }
    }

    /// Settle a pair: session on mutual accept, timeout otherwise
    pub(super) async fn resolve(&self, a: &UserId, b: &UserId) -> Result<(), CoordinatorError> {
        let key = PairKey::new(a, b);
        self.inner.timers.cancel(&key);

        let pairs = &self.inner.stores.pairs;
        let _guards = self.inner.locks.lock_all(&[a, b]).await;

        let pa = pairs.get(a).await?.filter(|p| &p.partner == b);
        let pb = pairs.get(b).await?.filter(|p| &p.partner == a);

        match (pa, pb) {
            (Some(pa), Some(pb)) if pa.accepted && pb.accepted => self.confirm(a, b, &pa).await,
            (Some(pa), Some(pb)) => self.expire(&[(a, pa), (b, pb)]).await,
            (None, None) => {
                tracing::debug!(pair = %key, "stale resolution, pair already settled");
                Ok(())
            }
            (pa, pb) => {
                // Half a pair: the missing side is gone, the other goes back to the pool
                tracing::warn!(pair = %key, "pair record missing on one side");
                for (user, record) in [(a, pa), (b, pb)] {
                    if record.is_some() {
                        pairs.remove(user).await?;
                        self.inner.registry.send(
                            user,
                            ServerMessage::MatchRejected {
                                reason: PARTNER_GONE.to_string(),
                            },
                        );
                        self.return_to_waiting(user).await?;
                    } else if pairs.get(user).await?.is_none() {
                        // Record lost outright; a pending request would otherwise sit unsearched
                        self.return_to_waiting(user).await?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Both accepted: move to matched and create the session exactly once
    async fn confirm(&self, a: &UserId, b: &UserId, pair: &MatchedPair) -> Result<(), CoordinatorError> {
        let key = PairKey::new(a, b);
        let requests = &self.inner.stores.requests;
        let sessions = &self.inner.stores.sessions;

        let moved = self
            .with_retry("confirm", || {
                requests.atomic_transition(a, b, RequestStatus::Pending, RequestStatus::Matched)
            })
            .await;

        match moved {
            Ok(true) => {}
            Ok(false) => {
                tracing::error!(pair = %key, "requests not pending at confirmation, disposing both");
                return self.force_dispose(a, b, "match could not be confirmed").await;
            }
            Err(e) if e.is_transient() => {
                tracing::debug!(pair = %key, error = %e, "confirmation contended, retrying shortly");
                self.arm_timer(a, b, self.inner.config.session_retry_delay);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let created = self
            .with_retry("create_session", || sessions.create(a, b, &pair.criteria))
            .await;

        match created {
            Ok(session) => {
                for (user, partner) in [(a, b), (b, a)] {
                    self.inner.registry.send(
                        user,
                        ServerMessage::SessionCreated {
                            session_id: session.session_id.clone(),
                            partner: partner.clone(),
                        },
                    );
                }
                self.inner.session_attempts.remove(&key);
                self.dispose(a).await?;
                self.dispose(b).await?;
                tracing::info!(pair = %key, session = %session.session_id, "match confirmed");
                Ok(())
            }
            Err(e @ StoreError::Unavailable(_)) => Err(e.into()),
            Err(e) => {
                self.session_failed(a, b, &e).await?;
                Ok(())
            }
        }
    }

    /// Session allocation failed: keep the pair pending and retry, bounded
    async fn session_failed(&self, a: &UserId, b: &UserId, err: &StoreError) -> Result<(), CoordinatorError> {
        let key = PairKey::new(a, b);
        self.inner
            .stores
            .requests
            .atomic_transition(a, b, RequestStatus::Matched, RequestStatus::Pending)
            .await?;

        let attempts = {
            let mut entry = self.inner.session_attempts.entry(key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        tracing::warn!(pair = %key, attempts, error = %err, "session creation failed");

        if attempts < self.inner.config.max_session_attempts {
            for user in [a, b] {
                self.inner.registry.send(
                    user,
                    ServerMessage::error("could not create a collaboration session, retrying"),
                );
            }
            self.arm_timer(a, b, self.inner.config.session_retry_delay);
            return Ok(());
        }

        // Out of attempts: dissolve the pair, both keep searching
        self.inner.session_attempts.remove(&key);
        for user in [a, b] {
            self.inner.stores.pairs.remove(user).await?;
            self.inner.registry.send(
                user,
                ServerMessage::error("could not create a collaboration session, searching again"),
            );
            self.return_to_waiting(user).await?;
        }
        Ok(())
    }

    /// Not everyone accepted in time
    ///
    /// Accepting sides go back to waiting; the others are removed and their
    /// connection closed.
    async fn expire(&self, sides: &[(&UserId, MatchedPair)]) -> Result<(), CoordinatorError> {
        for (user, record) in sides {
            self.inner.stores.pairs.remove(user).await?;

            if record.accepted {
                self.inner.registry.send(
                    user,
                    ServerMessage::MatchTimeout {
                        reason: "partner did not accept in time".to_string(),
                    },
                );
                self.return_to_waiting(user).await?;
            } else {
                self.inner.registry.send(
                    user,
                    ServerMessage::MatchTimeout {
                        reason: "match was not accepted in time".to_string(),
                    },
                );
                self.dispose(user).await?;
                self.inner.registry.close(user, "acceptance timeout");
            }
            tracing::info!(user = %user, accepted = record.accepted, "handshake timed out");
        }
        Ok(())
    }

    /// Drop every trace of both users after an inconsistency
    pub(super) async fn force_dispose(&self, a: &UserId, b: &UserId, reason: &str) -> Result<(), CoordinatorError> {
        self.inner.timers.cancel(&PairKey::new(a, b));
        for user in [a, b] {
            self.dispose(user).await?;
            self.inner.registry.send(user, ServerMessage::error(reason));
        }
        Ok(())
    }

    /// Remove a user's request, pair record, search loop and subscription
    async fn dispose(&self, user: &UserId) -> Result<(), CoordinatorError> {
        self.inner.searches.cancel(user);
        self.inner.stores.requests.remove(user).await?;
        self.inner.stores.pairs.remove(user).await?;
        self.unwatch_pair(user);
        Ok(())
    }
}
