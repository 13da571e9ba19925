//! Tri-state permission setting.

use serde::{Deserialize, Serialize};

/// A single option setting as stored in grant and role rows.
///
/// Only `Yes` survives into the packed bitstring as a set bit; `No` and
/// `Never` both encode as a cleared bit. The difference matters during
/// aggregation, where `Never` is sticky against later group grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Setting {
    /// Explicitly withheld (default when unset).
    No,
    /// Explicitly revoked; wins over later group grants.
    Never,
    /// Explicitly granted.
    Yes,
}

impl Setting {
    /// Numeric value stored in the database.
    pub const fn to_raw(self) -> i32 {
        match self {
            Self::No => -1,
            Self::Never => 0,
            Self::Yes => 1,
        }
    }

    /// Interpret a stored numeric value.
    pub const fn from_raw(raw: i32) -> Self {
        if raw > 0 {
            Self::Yes
        } else if raw == 0 {
            Self::Never
        } else {
            Self::No
        }
    }

    #[inline]
    pub fn is_yes(self) -> bool {
        self == Self::Yes
    }

    #[inline]
    pub fn is_never(self) -> bool {
        self == Self::Never
    }
}

impl From<i32> for Setting {
    fn from(raw: i32) -> Self {
        Self::from_raw(raw)
    }
}

impl From<Setting> for i32 {
    fn from(setting: Setting) -> Self {
        setting.to_raw()
    }
}
