// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

/// Identifies a tier within a cache chain.
///
/// Tier chains are written fastest first, so `[Memory, Distributed]` reads the
/// in-process tier before falling through to the external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TierKind {
    /// Bounded in-process storage.
    Memory,
    /// External key/value service shared between processes.
    Distributed,
}

impl TierKind {
    /// Returns the lowercase tier name used in logs, metrics and configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Distributed => "distributed",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
