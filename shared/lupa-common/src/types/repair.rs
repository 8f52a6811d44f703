//! Header Repair Results

use std::iter::Sum;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Counts produced by one header repair pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobFixResult {
    /// Objects inspected.
    pub scanned_count: u64,
    /// Objects whose headers were rewritten.
    pub fixed_count: u64,
    /// Objects skipped because they had no content-disposition header.
    pub warning_count: u64,
    /// Objects that could not be repaired.
    pub error_count: u64,
}

impl Add for BlobFixResult {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            scanned_count: self.scanned_count + rhs.scanned_count,
            fixed_count: self.fixed_count + rhs.fixed_count,
            warning_count: self.warning_count + rhs.warning_count,
            error_count: self.error_count + rhs.error_count,
        }
    }
}

impl Sum for BlobFixResult {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}
