//! Optimistic concurrency expectations.

use serde::{Deserialize, Serialize};

/// Version a decision was based on.
///
/// Every committed mutation of a lot bumps its version by one, starting at 1
/// when the lot is inserted. A commit whose expectation no longer matches the
/// stored version is rejected as a concurrent update.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpectedVersion(u64);

impl ExpectedVersion {
    pub const fn exact(version: u64) -> Self {
        Self(version)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub fn matches(self, actual: u64) -> bool {
        self.0 == actual
    }
}

impl core::fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_version_only_matches_itself() {
        assert!(ExpectedVersion::exact(3).matches(3));
        assert!(!ExpectedVersion::exact(3).matches(4));
    }

    #[test]
    fn serializes_as_bare_number() {
        let json = serde_json::to_string(&ExpectedVersion::exact(7)).unwrap();
        assert_eq!(json, "7");
        let back: ExpectedVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ExpectedVersion::exact(7));
    }
}
