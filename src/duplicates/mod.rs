//! Duplicate detection and resolution.
//!
//! This module provides functionality for:
//! - Bucketed near-duplicate lookup ([`finder`])
//! - Survivor selection and merging of duplicate records ([`resolve`])

pub mod finder;
pub mod resolve;

pub use finder::{MatchFinder, DEFAULT_MATCH_THRESHOLD};
pub use resolve::{choose_survivor, merge, reclaim, resolve, MergeOutcome, Resolution};
