//! Route ordering policies.
//!
//! Filtering decides *which* routes a locomotive may take; this module only
//! decides the *order* in which the already-valid candidates are offered.
//!
//! | Approach | Order |
//! |----------|-------|
//! | [`DoNotCare`](SelectRouteApproach::DoNotCare) | discovery order |
//! | [`Random`](SelectRouteApproach::Random) | uniform shuffle |
//! | [`MinTrackLength`](SelectRouteApproach::MinTrackLength) | shortest destination first |
//! | [`LongestUnused`](SelectRouteApproach::LongestUnused) | least recently taken first |
//! | [`SystemDefault`](SelectRouteApproach::SystemDefault) | configured default |
//!
//! All sorts are stable, so ties keep discovery order.
//!
//! ```rust
//! use rs_railcontrol::selector::{order_candidates, Candidate, SelectRouteApproach};
//! use rs_railcontrol::RouteId;
//!
//! let mut candidates = vec![
//!     Candidate { route: RouteId(1), destination_length: 5, last_used: 0 },
//!     Candidate { route: RouteId(2), destination_length: 2, last_used: 0 },
//!     Candidate { route: RouteId(3), destination_length: 8, last_used: 0 },
//! ];
//! order_candidates(SelectRouteApproach::MinTrackLength, &mut candidates, &mut rand::thread_rng());
//! let order: Vec<_> = candidates.iter().map(|c| c.route).collect();
//! assert_eq!(order, vec![RouteId(2), RouteId(1), RouteId(3)]);
//! ```

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::RouteId;

/// How candidate routes are ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectRouteApproach {
    /// Defer to the segment override, then to the configured default.
    #[default]
    SystemDefault,
    /// Keep discovery order.
    DoNotCare,
    /// Shuffle uniformly.
    Random,
    /// Shortest destination segment first.
    MinTrackLength,
    /// Route taken longest ago (or never) first.
    LongestUnused,
}

impl SelectRouteApproach {
    /// Numeric form used in persisted fields.
    pub const fn as_u8(self) -> u8 {
        match self {
            SelectRouteApproach::SystemDefault => 0,
            SelectRouteApproach::DoNotCare => 1,
            SelectRouteApproach::Random => 2,
            SelectRouteApproach::MinTrackLength => 3,
            SelectRouteApproach::LongestUnused => 4,
        }
    }

    /// Inverse of [`as_u8`](Self::as_u8); unknown values mean system default.
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SelectRouteApproach::DoNotCare,
            2 => SelectRouteApproach::Random,
            3 => SelectRouteApproach::MinTrackLength,
            4 => SelectRouteApproach::LongestUnused,
            _ => SelectRouteApproach::SystemDefault,
        }
    }

    /// Parse from text (`snake_case` names or the numeric form).
    pub fn from_text(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system_default" | "default" | "0" => Some(SelectRouteApproach::SystemDefault),
            "do_not_care" | "dont_care" | "1" => Some(SelectRouteApproach::DoNotCare),
            "random" | "2" => Some(SelectRouteApproach::Random),
            "min_track_length" | "shortest" | "3" => Some(SelectRouteApproach::MinTrackLength),
            "longest_unused" | "4" => Some(SelectRouteApproach::LongestUnused),
            _ => None,
        }
    }

    /// Resolve `SystemDefault` through a chain of fallbacks.
    ///
    /// The first non-default entry of `self`, `fallbacks...` wins; if all are
    /// `SystemDefault` the result is `DoNotCare`.
    pub fn resolve(self, fallbacks: &[SelectRouteApproach]) -> SelectRouteApproach {
        core::iter::once(self)
            .chain(fallbacks.iter().copied())
            .find(|a| *a != SelectRouteApproach::SystemDefault)
            .unwrap_or(SelectRouteApproach::DoNotCare)
    }
}

/// A route that passed validation, with the keys the policies sort on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// The route.
    pub route: RouteId,
    /// Length of the route's destination segment.
    pub destination_length: u16,
    /// Use counter at the last time the route was taken (0 = never).
    pub last_used: u64,
}

/// Order `candidates` in place according to `approach`.
///
/// `SystemDefault` must be resolved by the caller; it is treated as
/// `DoNotCare` here.
pub fn order_candidates<R: Rng + ?Sized>(
    approach: SelectRouteApproach,
    candidates: &mut [Candidate],
    rng: &mut R,
) {
    match approach {
        SelectRouteApproach::SystemDefault | SelectRouteApproach::DoNotCare => {}
        SelectRouteApproach::Random => candidates.shuffle(rng),
        SelectRouteApproach::MinTrackLength => {
            candidates.sort_by_key(|c| c.destination_length);
        }
        SelectRouteApproach::LongestUnused => {
            candidates.sort_by_key(|c| c.last_used);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn candidates(rows: &[(u32, u16, u64)]) -> Vec<Candidate> {
        rows.iter()
            .map(|&(route, destination_length, last_used)| Candidate {
                route: RouteId(route),
                destination_length,
                last_used,
            })
            .collect()
    }

    fn ids(candidates: &[Candidate]) -> Vec<u32> {
        candidates.iter().map(|c| c.route.0).collect()
    }

    #[test]
    fn do_not_care_keeps_order() {
        let mut c = candidates(&[(3, 9, 0), (1, 1, 0), (2, 5, 0)]);
        order_candidates(SelectRouteApproach::DoNotCare, &mut c, &mut StdRng::seed_from_u64(1));
        assert_eq!(ids(&c), vec![3, 1, 2]);
    }

    #[test]
    fn min_track_length_stable_on_ties() {
        let mut c = candidates(&[(1, 5, 0), (2, 2, 0), (3, 5, 0), (4, 2, 0)]);
        order_candidates(
            SelectRouteApproach::MinTrackLength,
            &mut c,
            &mut StdRng::seed_from_u64(1),
        );
        assert_eq!(ids(&c), vec![2, 4, 1, 3]);
    }

    #[test]
    fn longest_unused_puts_never_used_first() {
        let mut c = candidates(&[(1, 1, 30), (2, 1, 0), (3, 1, 10), (4, 1, 0)]);
        order_candidates(
            SelectRouteApproach::LongestUnused,
            &mut c,
            &mut StdRng::seed_from_u64(1),
        );
        assert_eq!(ids(&c), vec![2, 4, 3, 1]);
    }

    #[test]
    fn random_is_a_permutation() {
        let mut c = candidates(&[(1, 1, 0), (2, 1, 0), (3, 1, 0), (4, 1, 0), (5, 1, 0)]);
        order_candidates(SelectRouteApproach::Random, &mut c, &mut StdRng::seed_from_u64(7));
        let mut sorted = ids(&c);
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn resolve_chain() {
        use SelectRouteApproach::*;
        assert_eq!(Random.resolve(&[MinTrackLength]), Random);
        assert_eq!(SystemDefault.resolve(&[SystemDefault, LongestUnused]), LongestUnused);
        assert_eq!(SystemDefault.resolve(&[SystemDefault]), DoNotCare);
    }

    #[test]
    fn approach_text_and_numeric_forms() {
        assert_eq!(
            SelectRouteApproach::from_text("min_track_length"),
            Some(SelectRouteApproach::MinTrackLength)
        );
        assert_eq!(SelectRouteApproach::from_text("4"), Some(SelectRouteApproach::LongestUnused));
        assert_eq!(SelectRouteApproach::from_text("fastest"), None);
        for raw in 0..5 {
            assert_eq!(SelectRouteApproach::from_u8(raw).as_u8(), raw);
        }
    }
}
