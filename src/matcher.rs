//! Platform-qualified metadata matching.
//!
//! A method can carry several directives of the same kind, each optionally qualified with an
//! OS and/or architecture. The best one for the running platform is picked by score.

use crate::platform::{Arch, Os};

/// Score of a candidate whose OS and architecture both match.
pub const MAX_SCORE: i32 = 3;
/// Score of a candidate that must never be selected.
pub const NO_MATCH: i32 = -1;

/// A directive that may be restricted to an OS and/or architecture.
pub trait Qualified {
    fn os(&self) -> Option<Os>;
    fn arch(&self) -> Option<Arch>;
}

/// Scores one candidate against the expected platform. `None` means unspecified.
///
/// OS takes priority: an OS-only match outranks an architecture-only match, and any
/// declared field that mismatches disqualifies the candidate.
pub fn score(expected_os: Os, expected_arch: Arch, os: Option<Os>, arch: Option<Arch>) -> i32 {
    match (os, arch) {
        (Some(os), Some(arch)) if os == expected_os && arch == expected_arch => MAX_SCORE,
        (Some(os), None) if os == expected_os => MAX_SCORE - 1,
        (None, Some(arch)) if arch == expected_arch => MAX_SCORE - 2,
        (None, None) => MAX_SCORE - 3,
        _ => NO_MATCH,
    }
}

/// Picks the highest scoring candidate. Ties go to the first declared.
pub fn select_best<T: Qualified>(candidates: &[T], expected_os: Os, expected_arch: Arch) -> Option<&T> {
    let mut best = None;
    let mut best_score = NO_MATCH;
    for candidate in candidates {
        let s = score(expected_os, expected_arch, candidate.os(), candidate.arch());
        if s > best_score {
            best = Some(candidate);
            best_score = s;
            if s >= MAX_SCORE {
                break;
            }
        }
    }
    best
}
