//! Descriptor matching against the enrolled gallery.

use crate::types::{Descriptor, Identity};

/// Euclidean distance below which two descriptors belong to the same person.
///
/// Fixed for compatibility with descriptors enrolled by earlier releases;
/// not configurable.
pub const MATCH_THRESHOLD: f64 = 0.6;

/// Result of matching a probe descriptor against a gallery.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// The matched identity, if any.
    pub identity: Option<Identity>,
    /// Position of the matched identity in the gallery.
    pub position: Option<usize>,
    /// Distance to the matched identity.
    pub distance: Option<f64>,
    /// Gallery entries that could not be compared (wrong dimensionality or
    /// corrupt values) and were passed over.
    pub skipped: usize,
    /// The probe itself was malformed; no comparison was attempted.
    pub probe_rejected: bool,
}

impl MatchResult {
    pub fn matched(&self) -> bool {
        self.identity.is_some()
    }
}

/// Strategy for comparing a probe descriptor against a gallery of enrolled identities.
pub trait Matcher {
    fn find(&self, probe: &Descriptor, gallery: &[Identity]) -> MatchResult;
}

/// First-match Euclidean matcher.
///
/// Walks the gallery in order and returns the first identity whose distance
/// is strictly below [`MATCH_THRESHOLD`]. This is not a nearest-neighbour
/// search: when several entries qualify, the earliest one wins, even if a
/// later one is closer. `skipped` only counts entries visited before the
/// walk stopped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstMatchMatcher;

impl Matcher for FirstMatchMatcher {
    fn find(&self, probe: &Descriptor, gallery: &[Identity]) -> MatchResult {
        if let Err(err) = probe.validate() {
            tracing::warn!(error = %err, "probe descriptor rejected; reporting no match");
            return MatchResult {
                probe_rejected: true,
                ..MatchResult::default()
            };
        }

        let mut skipped = 0usize;

        for (i, identity) in gallery.iter().enumerate() {
            let stored = identity.descriptor();
            let distance = match stored.validate().and_then(|()| probe.euclidean_distance(stored)) {
                Ok(d) => d,
                Err(err) => {
                    skipped += 1;
                    tracing::warn!(
                        id = identity.id(),
                        error = %err,
                        "skipping identity with unusable descriptor"
                    );
                    continue;
                }
            };

            if distance < MATCH_THRESHOLD {
                tracing::debug!(id = identity.id(), position = i, distance, "descriptor matched");
                return MatchResult {
                    identity: Some(identity.clone()),
                    position: Some(i),
                    distance: Some(distance),
                    skipped,
                    probe_rejected: false,
                };
            }
        }

        MatchResult {
            skipped,
            ..MatchResult::default()
        }
    }
}
