//! Common types used across Kepler

use serde::{Deserialize, Serialize};

use crate::error::KeplerError;

/// Access level declared for a submitted resource.
///
/// Restricted layers are served from a separate, authenticated hosting
/// instance; everything else goes to the public one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AccessLevel {
    #[default]
    Public,
    Restricted,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Public => "Public",
            AccessLevel::Restricted => "Restricted",
        }
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self, AccessLevel::Restricted)
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccessLevel {
    type Err = KeplerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(AccessLevel::Public),
            "restricted" => Ok(AccessLevel::Restricted),
            _ => Err(KeplerError::InvalidAccessLevel(s.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_access_level_from_str() {
        assert_eq!("public".parse::<AccessLevel>().unwrap(), AccessLevel::Public);
        assert_eq!("Restricted".parse::<AccessLevel>().unwrap(), AccessLevel::Restricted);
        assert_eq!(" RESTRICTED ".parse::<AccessLevel>().unwrap(), AccessLevel::Restricted);
        assert!(matches!(
            "secret".parse::<AccessLevel>(),
            Err(KeplerError::InvalidAccessLevel(_))
        ));
    }

    #[test]
    fn test_access_level_default_is_public() {
        assert_eq!(AccessLevel::default(), AccessLevel::Public);
        assert!(!AccessLevel::default().is_restricted());
    }

    #[test]
    fn test_access_level_display_round_trips() {
        for level in [AccessLevel::Public, AccessLevel::Restricted] {
            assert_eq!(level.to_string().parse::<AccessLevel>().unwrap(), level);
        }
    }
}
