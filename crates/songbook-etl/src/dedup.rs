//! Duplicate collapsing by recency.
//!
//! One rule everywhere: the candidate with the later `updated_at`
//! (falling back to `created_at`) wins, and on an exact tie the one seen
//! later in input order wins. A candidate with no timestamp at all is
//! older than any timestamped one.

use songbook_core::{Candidate, SongKey};
use std::collections::HashMap;

/// One candidate per key, in first-seen key order.
#[derive(Debug, Default)]
pub struct Deduplicated {
    pub candidates: Vec<Candidate>,
    /// Candidates dropped because a winner for their key was kept.
    pub collapsed: usize,
}

/// Whether `incoming` (seen later) replaces `current` for the same key.
#[must_use]
pub fn supersedes(incoming: &Candidate, current: &Candidate) -> bool {
    incoming.recency() >= current.recency()
}

/// Collapse candidates sharing a key.
///
/// Output order follows the first occurrence of each key, so corpus order
/// still decides the display order of new entries.
pub fn deduplicate(candidates: impl IntoIterator<Item = Candidate>) -> Deduplicated {
    let mut out = Deduplicated::default();
    let mut index: HashMap<SongKey, usize> = HashMap::new();

    for candidate in candidates {
        if let Some(&i) = index.get(&candidate.key) {
            out.collapsed += 1;
            if supersedes(&candidate, &out.candidates[i]) {
                log::debug!(
                    "Duplicate {}: later {} candidate wins",
                    candidate.key,
                    candidate.source
                );
                out.candidates[i] = candidate;
            } else {
                log::debug!("Duplicate {}: kept earlier candidate", candidate.key);
            }
        } else {
            index.insert(candidate.key.clone(), out.candidates.len());
            out.candidates.push(candidate);
        }
    }
    out
}

/// Order candidates for one key from different sources: the one that
/// would win deduplication comes first, and so on down.
#[must_use]
pub fn precedence_order(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut indexed: Vec<(usize, Candidate)> = candidates.into_iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| b.recency().cmp(&a.recency()).then(ib.cmp(ia)));
    indexed.into_iter().map(|(_, c)| c).collect()
}
