//! Soft failures collected while building trees.
//!
//! Production data is not always consistent. Builders keep going when a
//! reference cannot be resolved and report what they skipped as a
//! [`Problem`] attached to the record that caused it.

use serde::Serialize;

/// A data problem found while building a derived structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Problem {
    /// A connection record references a feature that is not in the lookup map.
    UnresolvedReference {
        /// URN of the connection record.
        record: String,
        /// The URN that could not be resolved.
        urn: String,
    },
    /// A feature names a housing that is not part of the content being built.
    UnresolvedHousing {
        /// URN of the housed feature.
        feature: String,
        /// The housing URN that could not be found.
        housing: String,
    },
    /// A segment names a cable that is not part of the content being built.
    MissingCable {
        /// URN of the segment.
        segment: String,
        /// The cable URN that could not be found.
        cable: String,
    },
    /// Sibling segments of a cable could not all be placed in one chain.
    BrokenSegmentChain {
        /// URN of the owning cable.
        cable: String,
        /// Segments appended after the chained ones.
        unchained: Vec<String>,
    },
}

impl Problem {
    /// URN of the record the problem is attributed to.
    pub fn record_urn(&self) -> &str {
        match self {
            Problem::UnresolvedReference { record, .. } => record,
            Problem::UnresolvedHousing { feature, .. } => feature,
            Problem::MissingCable { segment, .. } => segment,
            Problem::BrokenSegmentChain { cable, .. } => cable,
        }
    }
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Problem::UnresolvedReference { record, urn } => {
                write!(f, "{}: cannot resolve {}", record, urn)
            }
            Problem::UnresolvedHousing { feature, housing } => {
                write!(f, "{}: cannot find housing {}", feature, housing)
            }
            Problem::MissingCable { segment, cable } => {
                write!(f, "{}: cannot find cable {}", segment, cable)
            }
            Problem::BrokenSegmentChain { cable, unchained } => {
                write!(f, "{}: unchained segments {}", cable, unchained.join(", "))
            }
        }
    }
}

/// A built value together with the problems found while building it.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    /// The built value (best effort when problems are present).
    pub value: T,
    /// Problems found, in discovery order.
    pub problems: Vec<Problem>,
}

impl<T> Outcome<T> {
    /// Wrap a value with a problem list.
    pub fn new(value: T, problems: Vec<Problem>) -> Self {
        Self { value, problems }
    }

    /// Wrap a value that was built without problems.
    pub fn clean(value: T) -> Self {
        Self::new(value, Vec::new())
    }

    /// True when nothing was skipped or degraded.
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }

    /// Transform the value, keeping the problems.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            problems: self.problems,
        }
    }

    /// Split into value and problems.
    pub fn into_parts(self) -> (T, Vec<Problem>) {
        (self.value, self.problems)
    }
}

/// Append `problem` unless an identical one is already recorded.
pub(crate) fn push_unique(problems: &mut Vec<Problem>, problem: Problem) {
    if !problems.contains(&problem) {
        problems.push(problem);
    }
}
