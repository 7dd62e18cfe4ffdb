//! Memory quantity parsing and representation.
//!
//! Used for fields like the shared-memory size of a container:
//! - binary suffixes: "128Ki", "512Mi", "1Gi" (powers of 1024)
//! - decimal suffixes: "128k", "512m"/"512M", "1g"/"1G" (powers of 1000)
//! - plain numbers are bytes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PaddockError, PaddockResult};

/// A memory quantity in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryQuantity(u64);

impl MemoryQuantity {
    /// Create a quantity from bytes.
    #[must_use]
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Get the quantity in bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> u64 {
        self.0
    }

    /// Parse a memory quantity string.
    pub fn parse(s: &str) -> PaddockResult<Self> {
        let s = s.trim();

        let binary_suffixes = [
            ("Ki", 1024u64),
            ("Mi", 1024 * 1024),
            ("Gi", 1024 * 1024 * 1024),
        ];
        for (suffix, multiplier) in binary_suffixes {
            if let Some(stripped) = s.strip_suffix(suffix) {
                return scale(s, stripped, multiplier);
            }
        }

        let decimal_suffixes = [
            ("k", 1000u64),
            ("K", 1000),
            ("m", 1000 * 1000),
            ("M", 1000 * 1000),
            ("g", 1000 * 1000 * 1000),
            ("G", 1000 * 1000 * 1000),
        ];
        for (suffix, multiplier) in decimal_suffixes {
            if let Some(stripped) = s.strip_suffix(suffix) {
                return scale(s, stripped, multiplier);
            }
        }

        let bytes: u64 = s.parse().map_err(|_| invalid(s))?;
        Ok(Self(bytes))
    }
}

fn scale(original: &str, digits: &str, multiplier: u64) -> PaddockResult<MemoryQuantity> {
    let value: u64 = digits.parse().map_err(|_| invalid(original))?;
    value
        .checked_mul(multiplier)
        .map(MemoryQuantity)
        .ok_or_else(|| invalid(original))
}

fn invalid(value: &str) -> PaddockError {
    PaddockError::config(format!(
        "invalid memory quantity \"{value}\" (use formats like \"512m\", \"1Gi\" or plain bytes)"
    ))
}

impl FromStr for MemoryQuantity {
    type Err = PaddockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MemoryQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const GI: u64 = 1024 * 1024 * 1024;
        const MI: u64 = 1024 * 1024;
        const KI: u64 = 1024;

        if self.0 >= GI && self.0 % GI == 0 {
            write!(f, "{}Gi", self.0 / GI)
        } else if self.0 >= MI && self.0 % MI == 0 {
            write!(f, "{}Mi", self.0 / MI)
        } else if self.0 >= KI && self.0 % KI == 0 {
            write!(f, "{}Ki", self.0 / KI)
        } else {
            write!(f, "{}", self.0)
        }
    }
}
