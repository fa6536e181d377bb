//! Capture-to-decision flow: match a fresh capture against the store, or
//! hand back an enrollment with the descriptor staged.

use crate::capture::{CaptureFailure, CaptureOutcome};
use crate::enrollment::{Enrollment, PendingDescriptor};
use crate::matcher::{FirstMatchMatcher, Matcher};
use crate::store::{IdentityStore, Roster};
use crate::types::Identity;
use chrono::Utc;

/// Decision for one capture attempt.
#[derive(Debug)]
pub enum ScanOutcome {
    /// No descriptor this attempt; nothing was matched.
    CaptureFailed(CaptureFailure),
    /// The capture matched an enrolled identity. `lastSeenAt` has been refreshed.
    Authenticated(Identity),
    /// No enrolled identity matched. The descriptor is staged in a fresh enrollment.
    Unrecognized(Enrollment),
}

/// Matches captures against an identity store.
pub struct Authenticator<'a, S: ?Sized, M = FirstMatchMatcher> {
    store: &'a S,
    matcher: M,
}

impl<'a, S: IdentityStore + ?Sized> Authenticator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            matcher: FirstMatchMatcher,
        }
    }
}

impl<'a, S: IdentityStore + ?Sized, M: Matcher> Authenticator<'a, S, M> {
    pub fn with_matcher(store: &'a S, matcher: M) -> Self {
        Self { store, matcher }
    }

    pub fn scan(&self, capture: CaptureOutcome) -> ScanOutcome {
        let (descriptor, preview) = match capture {
            CaptureOutcome::Failed(reason) => {
                tracing::info!(?reason, "capture failed");
                return ScanOutcome::CaptureFailed(reason);
            }
            CaptureOutcome::Captured { descriptor, preview } => (descriptor, preview),
        };

        if let Err(err) = descriptor.validate() {
            tracing::warn!(error = %err, "captured descriptor is malformed");
            return ScanOutcome::CaptureFailed(CaptureFailure::AnalysisFailed);
        }

        let roster = match self.store.load() {
            Ok(roster) => roster,
            Err(err) => {
                tracing::warn!(error = %err, "identity store unreadable; matching against empty gallery");
                Roster::default()
            }
        };
        if roster.rejected > 0 {
            tracing::warn!(rejected = roster.rejected, "stored records failed schema check");
        }

        let result = self.matcher.find(&descriptor, &roster.identities);
        if result.skipped > 0 {
            tracing::warn!(skipped = result.skipped, "identities skipped during matching");
        }

        match result.identity {
            Some(identity) => {
                let seen = identity.seen_at(Utc::now());
                if let Err(err) = self.store.update(&seen) {
                    tracing::warn!(id = seen.id(), error = %err, "failed to refresh last seen time");
                }
                tracing::info!(id = seen.id(), distance = result.distance, "authenticated");
                ScanOutcome::Authenticated(seen)
            }
            None => {
                let mut enrollment = Enrollment::new();
                let staged = enrollment.stage(PendingDescriptor::new(descriptor, preview));
                match staged {
                    Ok(()) => {
                        tracing::info!(gallery = roster.identities.len(), "no match; enrollment pending");
                        ScanOutcome::Unrecognized(enrollment)
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "could not stage descriptor");
                        ScanOutcome::CaptureFailed(CaptureFailure::AnalysisFailed)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::FakeStore;
    use crate::types::{Descriptor, DESCRIPTOR_DIM};
    use crate::validation::Registration;
    use chrono::TimeZone;

    fn descriptor(first: f32) -> Descriptor {
        let mut values = vec![0.1; DESCRIPTOR_DIM];
        values[0] = first;
        Descriptor::from_raw(values)
    }

    fn captured(first: f32) -> CaptureOutcome {
        CaptureOutcome::Captured {
            descriptor: descriptor(first),
            preview: None,
        }
    }

    #[test]
    fn test_capture_failure_skips_matching() {
        let store = FakeStore::default();
        store.fail_reads.set(true);
        let outcome = Authenticator::new(&store)
            .scan(CaptureOutcome::Failed(CaptureFailure::NoFaceDetected));
        assert!(matches!(
            outcome,
            ScanOutcome::CaptureFailed(CaptureFailure::NoFaceDetected)
        ));
    }

    #[test]
    fn test_malformed_capture_is_analysis_failure() {
        let store = FakeStore::default();
        let outcome = Authenticator::new(&store).scan(CaptureOutcome::Captured {
            descriptor: Descriptor::from_raw(vec![0.0; 5]),
            preview: None,
        });
        assert!(matches!(
            outcome,
            ScanOutcome::CaptureFailed(CaptureFailure::AnalysisFailed)
        ));
    }

    #[test]
    fn test_match_refreshes_last_seen() {
        let enrolled_at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let alice = Identity::enroll_at("alice", "alice@x.com", descriptor(0.0), enrolled_at);
        let store = FakeStore::with(vec![alice.clone()]);

        let outcome = Authenticator::new(&store).scan(captured(0.3));
        let ScanOutcome::Authenticated(identity) = outcome else {
            panic!("expected authentication");
        };

        assert_eq!(identity.id(), alice.id());
        assert!(identity.last_seen_at() > enrolled_at);
        assert_eq!(identity.registered_at(), enrolled_at);
        assert_eq!(store.records.borrow()[0].last_seen_at(), identity.last_seen_at());
    }

    #[test]
    fn test_match_survives_update_failure() {
        let store = FakeStore::with(vec![Identity::enroll("alice", "alice@x.com", descriptor(0.0))]);
        store.fail_writes.set(true);
        let outcome = Authenticator::new(&store).scan(captured(0.0));
        assert!(matches!(outcome, ScanOutcome::Authenticated(_)));
    }

    #[test]
    fn test_unknown_face_then_enroll() {
        let store = FakeStore::with(vec![Identity::enroll("alice", "alice@x.com", descriptor(0.0))]);

        let outcome = Authenticator::new(&store).scan(captured(5.0));
        let ScanOutcome::Unrecognized(mut enrollment) = outcome else {
            panic!("expected enrollment");
        };
        assert_eq!(enrollment.state().name(), "pending_descriptor");

        let bob = enrollment
            .submit(&store, &Registration::new("bob", "bob@x.com"))
            .unwrap();

        let again = Authenticator::new(&store).scan(captured(5.1));
        let ScanOutcome::Authenticated(identity) = again else {
            panic!("expected new identity to match");
        };
        assert_eq!(identity.id(), bob.id());
    }

    #[test]
    fn test_empty_store_never_matches() {
        let store = FakeStore::default();
        let outcome = Authenticator::new(&store).scan(captured(0.0));
        assert!(matches!(outcome, ScanOutcome::Unrecognized(_)));
    }

    #[test]
    fn test_unreadable_store_degrades_to_enrollment() {
        let store = FakeStore::with(vec![Identity::enroll("alice", "alice@x.com", descriptor(0.0))]);
        store.fail_reads.set(true);
        let outcome = Authenticator::new(&store).scan(captured(0.0));
        assert!(matches!(outcome, ScanOutcome::Unrecognized(_)));
    }
}
