//! Parsing of fully-qualified object store paths.
//!
//! Every Drover storage operation takes a path of the form
//! `s3://container/key`. [`parse_path`] splits it into a [`Location`]
//! without touching the network.

use std::fmt;

use crate::error::DroverError;
use crate::Result;

/// The only scheme Drover understands.
pub const SCHEME: &str = "s3://";

/// A parsed reference into the object store.
///
/// `full_path` is the input verbatim, so a `Location` always displays as
/// the string it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    full_path: String,
    container: String,
    key: String,
}

impl Location {
    /// The original `s3://...` string.
    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    /// The bucket name.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// The object key, empty for a container-root reference.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// True when the path names the whole container.
    pub fn is_container_root(&self) -> bool {
        self.key.is_empty()
    }

    /// True for container roots and keys ending in `/`.
    pub fn is_directory_like(&self) -> bool {
        self.key.is_empty() || self.key.ends_with('/')
    }

    /// A location in the same container with a different key.
    pub fn with_key(&self, key: &str) -> Location {
        Location {
            full_path: format!("{SCHEME}{}/{}", self.container, key),
            container: self.container.clone(),
            key: key.to_string(),
        }
    }

    /// Append a relative key below this location, inserting a `/` separator
    /// when the current key does not already end with one.
    pub fn join(&self, relative: &str) -> Location {
        let relative = relative.trim_start_matches('/');
        let key = if self.key.is_empty() || self.key.ends_with('/') {
            format!("{}{}", self.key, relative)
        } else {
            format!("{}/{}", self.key, relative)
        };
        self.with_key(&key)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_path)
    }
}

impl std::str::FromStr for Location {
    type Err = DroverError;

    fn from_str(s: &str) -> Result<Self> {
        parse_path(s)
    }
}

/// Parse a fully-qualified object store path.
///
/// `s3://bucket/a/b.csv` → container `bucket`, key `a/b.csv`
/// `s3://bucket` and `s3://bucket/` → container `bucket`, key `""`
pub fn parse_path(path: &str) -> Result<Location> {
    let stripped = path
        .strip_prefix(SCHEME)
        .ok_or_else(|| DroverError::InvalidPath {
            path: path.to_string(),
            reason: format!("path must start with '{SCHEME}'"),
        })?;

    let (container, key) = match stripped.split_once('/') {
        Some((container, key)) => (container, key),
        None => (stripped, ""),
    };

    if container.is_empty() {
        return Err(DroverError::InvalidPath {
            path: path.to_string(),
            reason: "path must include a container name".to_string(),
        });
    }

    Ok(Location {
        full_path: path.to_string(),
        container: container.to_string(),
        key: key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = "s3://some-bucket/some_path_a/some_path_b/some_destination";

    #[test]
    fn test_parse_path() {
        let parsed = parse_path(PATH).unwrap();
        assert_eq!(parsed.full_path(), PATH);
        assert_eq!(parsed.container(), "some-bucket");
        assert_eq!(parsed.key(), "some_path_a/some_path_b/some_destination");
    }

    #[test]
    fn test_parse_round_trip() {
        for input in [
            PATH,
            "s3://b/k",
            "s3://b/dir/",
            "s3://b/a//double",
            "s3://b/with space/and=equals?x",
        ] {
            let loc = parse_path(input).unwrap();
            let rebuilt = format!("{SCHEME}{}/{}", loc.container(), loc.key());
            assert_eq!(rebuilt, input);
            assert_eq!(loc.to_string(), input);
        }
    }

    #[test]
    fn test_parse_container_root() {
        let bare = parse_path("s3://bucket").unwrap();
        assert_eq!(bare.container(), "bucket");
        assert_eq!(bare.key(), "");
        assert!(bare.is_container_root());

        let slash = parse_path("s3://bucket/").unwrap();
        assert_eq!(slash.container(), "bucket");
        assert!(slash.is_container_root());
        assert_eq!(slash.to_string(), "s3://bucket/");
    }

    #[test]
    fn test_parse_invalid() {
        for input in ["", "bucket/key", "http://bucket/key", "s3:/bucket/key", "S3://bucket"] {
            assert!(
                matches!(parse_path(input), Err(DroverError::InvalidPath { .. })),
                "expected InvalidPath for {input:?}"
            );
        }
    }

    #[test]
    fn test_parse_empty_container() {
        assert!(matches!(
            parse_path("s3://"),
            Err(DroverError::InvalidPath { .. })
        ));
        assert!(matches!(
            parse_path("s3:///key"),
            Err(DroverError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_directory_like() {
        assert!(parse_path("s3://b/logs/").unwrap().is_directory_like());
        assert!(!parse_path("s3://b/logs").unwrap().is_directory_like());
    }

    #[test]
    fn test_join() {
        let base = parse_path("s3://b/logs").unwrap();
        assert_eq!(base.join("j-1/steps").to_string(), "s3://b/logs/j-1/steps");
        let dir = parse_path("s3://b/logs/").unwrap();
        assert_eq!(dir.join("/x").to_string(), "s3://b/logs/x");
        let root = parse_path("s3://b").unwrap();
        assert_eq!(root.join("x").key(), "x");
    }

    #[test]
    fn test_from_str() {
        let loc: Location = "s3://b/k".parse().unwrap();
        assert_eq!(loc.key(), "k");
    }
}
