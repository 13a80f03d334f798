//! Cost-function implementations.
//!
//! This module contains the dissimilarity measures used by the registration
//! drivers, plus the weighted list that composes them.

pub mod trait_;
pub mod ssd;
pub mod lncc;
pub mod tagged_ssd;
pub mod list;

pub use trait_::Cost2;
pub use ssd::SsdCost;
pub use lncc::LnccCost;
pub use tagged_ssd::{TagAxis, TaggedSsdCost};
pub use list::CostList;
