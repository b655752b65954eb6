//! Server version-string parsing.
//!
//! openGauss derivatives report a `version()` that embeds the PostgreSQL
//! version they forked from, so product patterns are tried before the
//! plain PostgreSQL one.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// A recognized server version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseVersion {
    pub product: String,
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl DatabaseVersion {
    pub fn new(product: impl Into<String>, major: u64, minor: u64, patch: u64) -> Self {
        Self {
            product: product.into(),
            major,
            minor,
            patch,
        }
    }

    /// `major.minor.patch`
    pub fn short(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::fmt::Display for DatabaseVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.product, self.short())
    }
}

// GaussDB Kernel V500R002C10
static GAUSSDB_RELEASE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(GaussDB|MogDB|Uqbar)\s+Kernel\s+V(\d+)R(\d+)C(\d+)").unwrap());

// GaussDB Kernel 505.1.0
static GAUSSDB_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(GaussDB|MogDB|Uqbar)\s+Kernel\s+(\d+(?:\.\d+){1,2})").unwrap());

// openGauss 3.0.3, MogDB 3.0.1
static OPENGAUSS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(openGauss|MogDB|Uqbar)\s+(\d+(?:\.\d+){1,2})").unwrap());

// Vastbase G100 V2.2
static VASTBASE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(Vastbase\s+G100)\s+V(\d+(?:\.\d+){1,2})").unwrap());

static POSTGRES_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(PostgreSQL)\s+(\d+(?:\.\d+){0,2})").unwrap());

/// Parse a `version()` string. Returns `None` for unknown products.
pub fn parse_version(version: &str) -> Option<DatabaseVersion> {
    let version = version.trim();

    if let Some(caps) = GAUSSDB_RELEASE_REGEX.captures(version) {
        let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
        return Some(DatabaseVersion::new(
            &caps[1],
            part(2)?,
            part(3)?,
            part(4)?,
        ));
    }

    [
        &*GAUSSDB_REGEX,
        &*OPENGAUSS_REGEX,
        &*VASTBASE_REGEX,
        &*POSTGRES_REGEX,
    ]
    .into_iter()
    .find_map(|re| {
        let caps = re.captures(version)?;
        let product = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
        parse_tolerant(&product, &caps[2])
    })
}

/// Parse `1`, `1.2` or `1.2.3`, filling missing parts with zero.
fn parse_tolerant(product: &str, numbers: &str) -> Option<DatabaseVersion> {
    let mut parts = numbers.split('.').map(|p| p.parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().transpose().ok()?.unwrap_or(0);
    let patch = parts.next().transpose().ok()?.unwrap_or(0);
    Some(DatabaseVersion::new(product, major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opengauss() {
        let v = parse_version(
            "(openGauss 3.0.3 build 0e0d5f8e) compiled at 2022-09-23 11:18:38 commit 0 last mr",
        )
        .unwrap();
        assert_eq!(v, DatabaseVersion::new("openGauss", 3, 0, 3));
        assert_eq!(v.short(), "3.0.3");
    }

    #[test]
    fn test_opengauss_embedded_in_postgres_string() {
        let v = parse_version("PostgreSQL 9.2.4 (openGauss 5.0.0 build a07d57c3) compiled at 2023")
            .unwrap();
        assert_eq!(v, DatabaseVersion::new("openGauss", 5, 0, 0));
    }

    #[test]
    fn test_gaussdb_release_version() {
        let v = parse_version("gaussdb (GaussDB Kernel V500R002C10 build 0b5b2a2c) compiled")
            .unwrap();
        assert_eq!(v, DatabaseVersion::new("GaussDB", 500, 2, 10));
    }

    #[test]
    fn test_gaussdb_numeric_version() {
        let v = parse_version("PostgreSQL 9.2.4 (GaussDB Kernel 505.1.0 build 9cbd1f5d)").unwrap();
        assert_eq!(v, DatabaseVersion::new("GaussDB", 505, 1, 0));
    }

    #[test]
    fn test_mogdb() {
        let v = parse_version("(MogDB 3.0.1 build 1a363ea9) compiled at 2022-08-05").unwrap();
        assert_eq!(v, DatabaseVersion::new("MogDB", 3, 0, 1));
    }

    #[test]
    fn test_vastbase() {
        let v = parse_version("PostgreSQL 9.2.4 (Vastbase G100 V2.2 (Build 10)) compiled").unwrap();
        assert_eq!(v, DatabaseVersion::new("Vastbase G100", 2, 2, 0));
        assert_eq!(v.to_string(), "Vastbase G100 2.2.0");
    }

    #[test]
    fn test_postgres() {
        let v = parse_version("PostgreSQL 14.5 (Debian 14.5-1.pgdg110+1) on x86_64-pc-linux-gnu")
            .unwrap();
        assert_eq!(v, DatabaseVersion::new("PostgreSQL", 14, 5, 0));
    }

    #[test]
    fn test_unknown() {
        assert_eq!(parse_version("MySQL 8.0.33"), None);
        assert_eq!(parse_version(""), None);
    }
}
