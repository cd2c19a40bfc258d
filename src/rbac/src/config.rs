//! Configuration for the RBAC binding layer
//!
//! Environment variables:
//! - `RBAC_STRUCTURED_MEMBERS_SINCE` - first API version given structured role members (default: 9.0)
//! - `RBAC_ROLE_TAG_HEADER` - header carrying role-tag lists (default: role-tag)
//! - `RBAC_CROSS_ACCOUNT_CONCURRENCY` - concurrent cross-account lookups per resolution (default: 8)
//! - `DATABASE_URL` - PostgreSQL directory connection string

use crate::error::{RbacError, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::warn;

/// Requested API version, compared on `major.minor`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse `8`, `8.1`, `~9` or `9.0.0`
    pub fn parse(s: &str) -> Result<Self> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"^[~^]?(\d+)(?:\.(\d+|\*|x))?(?:\.(?:\d+|\*|x))?$").expect("static pattern")
        });

        let invalid = || RbacError::InvalidInput(format!("Invalid API version '{}'", s));
        let caps = pattern.captures(s.trim()).ok_or_else(invalid)?;
        let major = caps[1].parse().map_err(|_| invalid())?;
        let minor = match caps.get(2).map(|m| m.as_str()) {
            None | Some("*") | Some("x") => 0,
            Some(digits) => digits.parse().map_err(|_| invalid())?,
        };
        Ok(Self { major, minor })
    }
}

impl FromStr for ApiVersion {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RbacConfig {
    /// Versions at or above this get structured role members
    pub structured_members_since: ApiVersion,

    pub role_tag_header: String,

    /// Upper bound on concurrent cross-account lookups within one role resolution
    pub cross_account_concurrency: usize,

    pub database_url: Option<String>,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            structured_members_since: ApiVersion::new(9, 0),
            role_tag_header: "role-tag".to_string(),
            cross_account_concurrency: 8,
            database_url: None,
        }
    }
}

impl RbacConfig {
    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("RBAC_STRUCTURED_MEMBERS_SINCE") {
            match ApiVersion::parse(&raw) {
                Ok(version) => config.structured_members_since = version,
                Err(e) => warn!("Ignoring RBAC_STRUCTURED_MEMBERS_SINCE: {}", e),
            }
        }

        if let Some(raw) = lookup("RBAC_ROLE_TAG_HEADER") {
            let header = raw.trim().to_ascii_lowercase();
            if header.is_empty() {
                warn!("Ignoring empty RBAC_ROLE_TAG_HEADER");
            } else {
                config.role_tag_header = header;
            }
        }

        if let Some(raw) = lookup("RBAC_CROSS_ACCOUNT_CONCURRENCY") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.cross_account_concurrency = n,
                _ => warn!("Ignoring RBAC_CROSS_ACCOUNT_CONCURRENCY '{}'", raw),
            }
        }

        config.database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        config
    }

    /// Whether `version` receives the structured member shape
    pub fn structured_members(&self, version: ApiVersion) -> bool {
        version >= self.structured_members_since
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_version_parsing() {
        assert_eq!(ApiVersion::parse("8").unwrap(), ApiVersion::new(8, 0));
        assert_eq!(ApiVersion::parse("8.1").unwrap(), ApiVersion::new(8, 1));
        assert_eq!(ApiVersion::parse("~9").unwrap(), ApiVersion::new(9, 0));
        assert_eq!(ApiVersion::parse("9.2.3").unwrap(), ApiVersion::new(9, 2));
        assert_eq!(ApiVersion::parse("7.x").unwrap(), ApiVersion::new(7, 0));
        assert!(ApiVersion::parse("latest").is_err());
        assert!(ApiVersion::parse("").is_err());
    }

    #[test]
    fn test_version_ordering() {
        assert!(ApiVersion::new(8, 5) < ApiVersion::new(9, 0));
        assert!(ApiVersion::new(9, 1) > ApiVersion::new(9, 0));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars = HashMap::from([
            ("RBAC_STRUCTURED_MEMBERS_SINCE", "8.3"),
            ("RBAC_ROLE_TAG_HEADER", " Role-Tag "),
            ("RBAC_CROSS_ACCOUNT_CONCURRENCY", "2"),
        ]);
        let config = RbacConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.structured_members_since, ApiVersion::new(8, 3));
        assert_eq!(config.role_tag_header, "role-tag");
        assert_eq!(config.cross_account_concurrency, 2);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_bad_values_fall_back() {
        let vars = HashMap::from([
            ("RBAC_STRUCTURED_MEMBERS_SINCE", "soon"),
            ("RBAC_CROSS_ACCOUNT_CONCURRENCY", "0"),
        ]);
        let config = RbacConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config, RbacConfig::default());
    }

    #[test]
    fn test_structured_threshold() {
        let config = RbacConfig::default();
        assert!(!config.structured_members(ApiVersion::new(8, 9)));
        assert!(config.structured_members(ApiVersion::new(9, 0)));
    }
}
