#![deny(unsafe_code)]
//! The ehrQL surface builder (spec §4.3): frames, typed series, and
//! dataset construction, compiling down to Query Model nodes through
//! `ehrql-model`'s validating smart constructors.
//!
//! Boolean combination goes through `&`/`|`/`!`
//! ([`std::ops::BitAnd`]/[`std::ops::BitOr`]/[`std::ops::Not`]) rather
//! than `&&`/`||`/`if`: Rust has no way to overload short-circuiting
//! control flow, so there is no path to the silently-wrong truthiness
//! spec §7 warns against — a [`series::Series`] simply cannot be used
//! as a native `bool` condition.

pub mod case;
pub mod dataset;
pub mod duration;
pub mod error;
pub mod frame;
pub mod series;

pub use case::{CaseBuilder, WhenAppend, WhenPending, case, when};
pub use dataset::Dataset;
pub use duration::Duration;
pub use error::{BuilderError, Result};
pub use frame::{EventFrame, PatientFrame, SortedEventFrame};
pub use series::{
    BoolT, CodeT, DateDifference, DateT, ElementType, FloatT, IntT, Numeric, Orderable, Series, SeriesSet, StrT,
    maximum_of, minimum_of,
};
