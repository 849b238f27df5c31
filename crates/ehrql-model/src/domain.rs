//! Domains: every series has at most one row per patient (the distinguished
//! *patient domain*) or many rows per patient (an *event domain*, uniquely
//! identified by its derivation chain — spec §3).

use std::fmt;

use crate::node::NodeRef;

/// The row-granularity a series belongs to.
///
/// `Event` wraps the node that *defines* the event domain (a `SelectTable`,
/// `Filter`, or `Sort`): because [`NodeRef`] is an `Arc<Node>` and [`Node`]
/// derives structural `PartialEq`/`Hash`, two `Domain::Event` values compare
/// equal exactly when they were produced by an identical derivation chain —
/// which is precisely spec §3's definition of event-domain identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Domain {
    /// At most one row per patient.
    Patient,
    /// Many rows per patient, identified by the node that introduced this
    /// domain (the source table, or the filter/sort that narrowed it).
    Event(NodeRef),
}

impl Domain {
    /// Whether this is the patient domain.
    pub fn is_patient(&self) -> bool {
        matches!(self, Self::Patient)
    }

    /// Spec §3: "Two series may be combined with a binary operator only if
    /// their domains are equal or one is the patient domain."
    pub fn compatible_with(&self, other: &Domain) -> bool {
        self == other || self.is_patient() || other.is_patient()
    }

    /// The domain that results from combining `self` with `other`, once
    /// they have been checked as [`Domain::compatible_with`]: the more
    /// specific (non-patient) domain wins.
    pub fn combine(&self, other: &Domain) -> Domain {
        match (self, other) {
            (Domain::Event(_), _) => self.clone(),
            (_, Domain::Event(_)) => other.clone(),
            _ => Domain::Patient,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patient => write!(f, "patient domain"),
            Self::Event(node) => write!(f, "event domain ({})", node.kind_name()),
        }
    }
}
