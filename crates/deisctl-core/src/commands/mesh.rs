use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Number of routers loaded by a whole-platform install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RouterMeshSize(u8);

impl RouterMeshSize {
    pub const DEFAULT: Self = Self(3);

    pub fn new(size: u8) -> Option<Self> {
        (size >= 1).then_some(Self(size))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for RouterMeshSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for RouterMeshSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| Error::InvalidRouterMeshSize(s.to_string()))
    }
}

impl fmt::Display for RouterMeshSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
