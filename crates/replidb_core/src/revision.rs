//! Document revisions encoded as vector clocks.
//!
//! A revision string has the form `origin:counter[|origin:counter...]`.
//! Each origin is a replica uid and each counter the number of writes that
//! replica has contributed to the document's history. Origins are rendered
//! in sorted order, so two equal clocks always produce the same string.
//!
//! Comparison is the pointwise partial order, with a missing origin
//! counting as zero:
//!
//! | relation | meaning |
//! |----------|---------|
//! | `Newer` | every counter `>=`, at least one `>` |
//! | `Older` | the reverse |
//! | `Same` | all counters equal |
//! | `Conflicted` | neither dominates |

use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Result of comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RevisionOrdering {
    /// The left clock dominates the right one.
    Newer,
    /// The right clock dominates the left one.
    Older,
    /// Both clocks are equal.
    Same,
    /// The clocks are concurrent.
    Conflicted,
}

/// A parsed revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VectorClock {
    counters: BTreeMap<String, u64>,
}

impl VectorClock {
    /// Creates an empty clock (the revision of a document that does not
    /// exist yet).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a revision string. The empty string is the empty clock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRevision`] if an entry is not
    /// `origin:counter` with a non-empty origin and a decimal counter.
    pub fn parse(revision: &str) -> CoreResult<Self> {
        let mut counters = BTreeMap::new();
        if revision.is_empty() {
            return Ok(Self { counters });
        }
        for entry in revision.split('|') {
            let (origin, counter) = entry
                .rsplit_once(':')
                .ok_or_else(|| CoreError::invalid_revision(revision))?;
            if origin.is_empty() {
                return Err(CoreError::invalid_revision(revision));
            }
            let counter: u64 = counter
                .parse()
                .map_err(|_| CoreError::invalid_revision(revision))?;
            if counters.insert(origin.to_string(), counter).is_some() {
                return Err(CoreError::invalid_revision(revision));
            }
        }
        Ok(Self { counters })
    }

    /// Returns the counter recorded for `origin` (zero if absent).
    #[must_use]
    pub fn counter(&self, origin: &str) -> u64 {
        self.counters.get(origin).copied().unwrap_or(0)
    }

    /// Returns true if the clock has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Compares `self` against `other`.
    #[must_use]
    pub fn compare(&self, other: &Self) -> RevisionOrdering {
        let mut greater = false;
        let mut less = false;
        for origin in self.counters.keys().chain(other.counters.keys()) {
            let mine = self.counter(origin);
            let theirs = other.counter(origin);
            if mine > theirs {
                greater = true;
            } else if mine < theirs {
                less = true;
            }
        }
        match (greater, less) {
            (true, false) => RevisionOrdering::Newer,
            (false, true) => RevisionOrdering::Older,
            (false, false) => RevisionOrdering::Same,
            (true, true) => RevisionOrdering::Conflicted,
        }
    }

    /// Returns true if `self` strictly dominates `other`.
    #[must_use]
    pub fn is_newer(&self, other: &Self) -> bool {
        self.compare(other) == RevisionOrdering::Newer
    }

    /// Bumps the counter of `replica_uid` by one.
    pub fn increment(&mut self, replica_uid: &str) {
        *self.counters.entry(replica_uid.to_string()).or_insert(0) += 1;
    }

    /// Raises every counter to at least the one in `other`.
    pub fn maximize(&mut self, other: &Self) {
        for (origin, &counter) in &other.counters {
            let entry = self.counters.entry(origin.clone()).or_insert(0);
            *entry = (*entry).max(counter);
        }
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (origin, counter) in &self.counters {
            if !first {
                f.write_str("|")?;
            }
            write!(f, "{origin}:{counter}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for VectorClock {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Compares two revision strings.
///
/// # Errors
///
/// Returns [`CoreError::InvalidRevision`] if either string does not parse.
pub fn compare_revisions(a: &str, b: &str) -> CoreResult<RevisionOrdering> {
    Ok(VectorClock::parse(a)?.compare(&VectorClock::parse(b)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vc(s: &str) -> VectorClock {
        VectorClock::parse(s).unwrap()
    }

    #[test]
    fn parse_and_render_sorted() {
        let clock = vc("b:2|a:1");
        assert_eq!(clock.counter("a"), 1);
        assert_eq!(clock.counter("b"), 2);
        assert_eq!(clock.counter("c"), 0);
        assert_eq!(clock.to_string(), "a:1|b:2");
    }

    #[test]
    fn empty_revision_is_empty_clock() {
        let clock = vc("");
        assert!(clock.is_empty());
        assert_eq!(clock.to_string(), "");
    }

    #[test]
    fn origin_may_contain_colons() {
        let clock = vc("host:port:3");
        assert_eq!(clock.counter("host:port"), 3);
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["a", "a:", ":1", "a:x", "a:1|", "a:1|a:2", "a:-1"] {
            assert!(
                matches!(VectorClock::parse(bad), Err(CoreError::InvalidRevision { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn compare_cases() {
        assert_eq!(vc("a:2").compare(&vc("a:1")), RevisionOrdering::Newer);
        assert_eq!(vc("a:1").compare(&vc("a:2")), RevisionOrdering::Older);
        assert_eq!(vc("a:1|b:1").compare(&vc("b:1|a:1")), RevisionOrdering::Same);
        assert_eq!(vc("a:1|b:1").compare(&vc("a:1")), RevisionOrdering::Newer);
        assert_eq!(vc("a:2").compare(&vc("a:1|b:1")), RevisionOrdering::Conflicted);
        assert_eq!(vc("a:1").compare(&vc("")), RevisionOrdering::Newer);
    }

    #[test]
    fn increment_keeps_other_origins() {
        let mut clock = vc("a:1|b:4");
        clock.increment("a");
        clock.increment("c");
        assert_eq!(clock.to_string(), "a:2|b:4|c:1");
    }

    #[test]
    fn maximize_then_increment_dominates_both() {
        let left = vc("a:3|b:1");
        let right = vc("a:1|b:2|c:5");
        let mut merged = left.clone();
        merged.maximize(&right);
        assert_eq!(merged.to_string(), "a:3|b:2|c:5");
        merged.increment("b");
        assert!(merged.is_newer(&left));
        assert!(merged.is_newer(&right));
    }

    #[test]
    fn compare_revision_strings() {
        assert_eq!(
            compare_revisions("x:1|y:2", "x:1").unwrap(),
            RevisionOrdering::Newer
        );
        assert!(compare_revisions("bogus", "x:1").is_err());
    }

    fn clock_strategy() -> impl Strategy<Value = VectorClock> {
        prop::collection::btree_map("[a-d]", 1u64..5, 0..4)
            .prop_map(|counters| VectorClock { counters })
    }

    proptest! {
        #[test]
        fn exactly_one_relation_holds(a in clock_strategy(), b in clock_strategy()) {
            let forward = a.compare(&b);
            let backward = b.compare(&a);
            let expected = match forward {
                RevisionOrdering::Newer => RevisionOrdering::Older,
                RevisionOrdering::Older => RevisionOrdering::Newer,
                RevisionOrdering::Same => RevisionOrdering::Same,
                RevisionOrdering::Conflicted => RevisionOrdering::Conflicted,
            };
            prop_assert_eq!(backward, expected);
            prop_assert_eq!(forward == RevisionOrdering::Same, a == b);
        }

        #[test]
        fn render_parse_is_identity(a in clock_strategy()) {
            prop_assert_eq!(VectorClock::parse(&a.to_string()).unwrap(), a);
        }

        #[test]
        fn increment_is_newer(a in clock_strategy(), origin in "[a-e]") {
            let mut bumped = a.clone();
            bumped.increment(&origin);
            prop_assert_eq!(bumped.compare(&a), RevisionOrdering::Newer);
        }
    }
}
