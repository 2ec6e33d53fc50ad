//! Symbolic permission strings (`rwxr-xr-x`)
//!
//! Only the owner triplet carries meaning: it decides the executable flag.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A validated 9-character permission string over `{r, w, x, -}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permissions(String);

impl Permissions {
    /// Parse either 3 octal digits (`755`) or a 9-character symbolic string.
    pub fn parse(mode: &str) -> Result<Self> {
        let bytes = mode.as_bytes();

        if bytes.len() == 3 && bytes.iter().all(u8::is_ascii_digit) {
            let mut out = String::with_capacity(9);
            for digit in bytes {
                let d = digit - b'0';
                if d > 7 {
                    return Err(Error::InvalidPermissionMode(mode.to_string()));
                }
                out.push(if d & 4 != 0 { 'r' } else { '-' });
                out.push(if d & 2 != 0 { 'w' } else { '-' });
                out.push(if d & 1 != 0 { 'x' } else { '-' });
            }
            return Ok(Self(out));
        }

        if bytes.len() == 9 && bytes.iter().all(|b| matches!(b, b'r' | b'w' | b'x' | b'-')) {
            return Ok(Self(mode.to_string()));
        }

        Err(Error::InvalidPermissionMode(mode.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Owner triplet, e.g. `rwx`.
    pub fn owner(&self) -> &str {
        &self.0[..3]
    }

    /// Executable is derived, never stored independently.
    pub fn is_executable(&self) -> bool {
        self.owner().contains('x')
    }
}

impl FromStr for Permissions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
