//! URL handling for artifacts in the `ObjectStore`.
//!
//! All URLs must be valid, clean and canonical: no credentials, no query, no
//! fragment, no path traversal. A URL whose path ends with a slash ("/") is a
//! "container" (folder); otherwise the last path component names an artifact
//! inside its container.

use std::{borrow::Cow, path::Path};

use rangeload_common::error::{Error, ErrorKind};
use url::Url;

macro_rules! verify {
    ($expr:expr) => {{
        let result = $expr;
        verify(result, stringify!($expr), None, None)?;
    }};

    ($expr:expr, $url:expr) => {{
        let result = $expr;
        verify(result, stringify!($expr), Some(&*$url), None)?;
    }};

    ($expr:expr, $url:expr, $relative:expr) => {{
        let result = $expr;
        verify(result, stringify!($expr), Some(&*$url), Some(&*$relative))?;
    }};
}

/// A URL that has been parsed and verified according to the `ObjectStore` rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectUrl(Url);

impl ObjectUrl {
    /// Creates a new `ObjectUrl` from a `Url` after verifying it.
    pub fn new(url: Url) -> rangeload_common::Result<ObjectUrl> {
        Self::verify_url(&url)?;
        Ok(Self(url))
    }

    /// Parses a string into an `ObjectUrl`.
    ///
    /// The parsed and reassembled URL must be identical to the input, which
    /// rejects non-canonical forms and path traversals.
    pub fn parse(url_str: &str) -> rangeload_common::Result<ObjectUrl> {
        let url = parse_url(url_str)?;
        Self::verify_url(&url)?;
        verify!(url.as_str() == url_str, url_str);
        Ok(Self(url))
    }

    /// Creates a container URL for a local directory path.
    ///
    /// Relative paths are resolved against the current working directory.
    pub fn from_directory_path(path: &Path) -> rangeload_common::Result<ObjectUrl> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| Error::io("current_dir", e))?
                .join(path)
        };
        let url = Url::from_directory_path(&path).map_err(|()| {
            Error::invalid_arg("path", format!("invalid directory path {path:?}"))
        })?;
        Self::new(url)
    }

    /// Interprets a location string that is either an absolute URL
    /// (`file:///data/import/`) or a local directory path, and returns
    /// the corresponding container URL.
    pub fn container_from_location(location: &str) -> rangeload_common::Result<ObjectUrl> {
        if location.contains("://") {
            let mut url = parse_url(location)?;
            if !url.path().ends_with('/') {
                let path = format!("{}/", url.path());
                url.set_path(&path);
            }
            Self::new(url)
        } else {
            Self::from_directory_path(Path::new(location))
        }
    }

    /// Returns the URL as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Resolves a relative path against the container of this URL and ensures
    /// it does not escape that container.
    pub fn resolve_relative(&self, rel_path: RelativePath) -> rangeload_common::Result<ObjectUrl> {
        verify!(!rel_path.is_empty(), self.as_str(), rel_path);
        let container = self.get_container()?;
        let resolved = container.join(&rel_path).map_err(|_e| {
            make_err(
                "failed to join relative path",
                Some(self.as_str()),
                Some(&rel_path),
            )
        })?;
        verify!(
            resolved.as_str().starts_with(container.as_str()),
            self.as_str(),
            rel_path
        );
        Ok(ObjectUrl(resolved))
    }

    /// Resolves a sequence of path segments (e.g. `["42", "keys", "0.keys"]`)
    /// relative to this URL's container.
    ///
    /// Each segment must be a valid single-component relative path. A trailing
    /// empty segment produces a container URL.
    pub fn join_segments(&self, segments: &[&str]) -> rangeload_common::Result<ObjectUrl> {
        verify!(!segments.is_empty(), self.as_str());
        for (i, segment) in segments.iter().enumerate() {
            let is_last = i + 1 == segments.len();
            verify!(!segment.contains('/'), self.as_str(), *segment);
            verify!(is_last || !segment.is_empty(), self.as_str(), *segment);
        }
        let joined = segments.join("/");
        self.resolve_relative(RelativePath::new(&joined)?)
    }

    /// Attempts to make a given `ObjectUrl` relative to this `ObjectUrl`.
    ///
    /// Returns `None` if the given URL is not within the same container or if
    /// it is a container itself.
    pub fn make_relative(&self, url: &ObjectUrl) -> Option<String> {
        if url.is_container() {
            return None;
        }
        let container = self.get_container().ok()?;
        if url.as_str().starts_with(container.as_str()) {
            container.0.make_relative(url)
        } else {
            None
        }
    }

    /// Returns the container URL for this URL.
    ///
    /// If the URL is already a container, returns a borrowed reference to self.
    pub fn get_container(&self) -> rangeload_common::Result<Cow<'_, ObjectUrl>> {
        if self.is_container() {
            Ok(Cow::Borrowed(self))
        } else {
            let parent_url = self
                .join("./")
                .map_err(|_e| make_err("failed to determine parent", Some(self.as_str()), None))?;
            Ok(Cow::Owned(ObjectUrl(parent_url)))
        }
    }

    /// Checks if the URL represents a container (i.e., ends with a `/`).
    pub fn is_container(&self) -> bool {
        self.path().ends_with('/')
    }

    /// Verifies that the given `Url` is valid according to `ObjectStore` rules.
    fn verify_url(url: &Url) -> rangeload_common::Result<()> {
        verify!(url.username().is_empty());
        verify!(url.password().is_none());
        verify!(url.query().is_none());
        verify!(url.fragment().is_none());
        verify!(url.path_segments().is_some());
        verify!(url.path().starts_with('/'));
        Ok(())
    }
}

impl std::ops::Deref for ObjectUrl {
    type Target = Url;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A relative path that has been verified to not contain any path traversal
/// sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativePath<'a>(&'a str);

impl<'a> RelativePath<'a> {
    /// Creates a new `RelativePath` from a string slice after verifying it.
    pub fn new(path: &'a str) -> rangeload_common::Result<RelativePath<'a>> {
        verify!(Self::is_valid(path), "", path);
        Ok(RelativePath(path))
    }

    pub fn is_valid(s: &str) -> bool {
        !s.starts_with('/')
            && s.split('/').all(Self::is_valid_segment)
            && !Self::starts_with_scheme(s)
    }

    fn is_valid_segment(segment: &str) -> bool {
        let lowered = segment.to_ascii_lowercase();
        !matches!(
            lowered.as_str(),
            ".." | "%2e%2e" | "%2e." | ".%2e" | "." | "%2e"
        )
    }

    fn starts_with_scheme(s: &str) -> bool {
        let mut chars = s.char_indices();
        match chars.next() {
            Some((_, c)) if c.is_ascii_alphabetic() => {}
            _ => return false,
        }
        for (index, c) in chars {
            if c == ':' {
                return index > 0;
            }
            if !c.is_ascii_alphanumeric() && c != '+' && c != '-' && c != '.' {
                return false;
            }
        }
        false
    }
}

impl std::ops::Deref for RelativePath<'_> {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.0
    }
}

fn parse_url(url: &str) -> rangeload_common::Result<Url> {
    Url::parse(url).map_err(|e| {
        ErrorKind::ResolveUrl {
            url: url.to_string(),
            relative: None,
            reason: format!("failed to parse url: {e}"),
        }
        .into()
    })
}

fn verify(
    predicate: bool,
    condition: &str,
    url: Option<&str>,
    relative: Option<&str>,
) -> rangeload_common::Result<()> {
    if predicate {
        Ok(())
    } else {
        Err(make_err(condition, url, relative))
    }
}

fn make_err(reason: &str, url: Option<&str>, relative: Option<&str>) -> Error {
    ErrorKind::ResolveUrl {
        url: url.map(String::from).unwrap_or_default(),
        relative: relative.map(String::from),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_segment_path() {
        let root = ObjectUrl::parse("file:///data/import/").unwrap();
        let url = root
            .resolve_relative(RelativePath::new("1200/a1b2/0.seg").unwrap())
            .unwrap();
        assert_eq!(url.as_str(), "file:///data/import/1200/a1b2/0.seg");
        assert!(!url.is_container());
    }

    #[test]
    fn test_resolve_against_artifact_uses_its_container() {
        let base = ObjectUrl::parse("file:///data/import/1200/cutpoints").unwrap();
        let url = base
            .resolve_relative(RelativePath::new("keys/0.keys").unwrap())
            .unwrap();
        assert_eq!(url.as_str(), "file:///data/import/1200/keys/0.keys");
    }

    #[test]
    fn test_join_segments() {
        let root = ObjectUrl::parse("file:///data/import/").unwrap();
        let url = root.join_segments(&["7", "cutpoints"]).unwrap();
        assert_eq!(url.as_str(), "file:///data/import/7/cutpoints");
        let dir = root.join_segments(&["7", "abc", ""]).unwrap();
        assert!(dir.is_container());
        assert!(root.join_segments(&["7/8"]).is_err());
        assert!(root.join_segments(&["", "x"]).is_err());
        assert!(root.join_segments(&[]).is_err());
        assert!(root.join_segments(&["..", "x"]).is_err());
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let base = ObjectUrl::parse("file:///data/import/").unwrap();
        for relative in [
            "",
            "../x",
            "./x",
            "a/../../x",
            "/etc/passwd",
            "a/%2E%2e/b",
            "https://other/x",
        ] {
            let res = RelativePath::new(relative).and_then(|rel| base.resolve_relative(rel));
            assert!(res.is_err(), "'{relative}' should be rejected");
        }
    }

    #[test]
    fn test_parse_and_verify_url() {
        assert!(ObjectUrl::parse("file:///data/").is_ok());
        assert!(ObjectUrl::parse("s3://bucket/import/part").is_ok());
        assert!(ObjectUrl::parse("file:data").is_err());
        assert!(ObjectUrl::parse("https://foo.com").is_err());
        assert!(ObjectUrl::parse("https://foo.com/aaa/../bcde").is_err());
        assert!(ObjectUrl::parse("https://foo.com/aaa/bcde?x=1").is_err());
        assert!(ObjectUrl::parse("https://user:p1@foo.com/aaa").is_err());
    }

    #[test]
    fn test_container_from_location() {
        let url = ObjectUrl::container_from_location("file:///data/import").unwrap();
        assert_eq!(url.as_str(), "file:///data/import/");
        assert!(url.is_container());

        let dir = tempfile::tempdir().unwrap();
        let url = ObjectUrl::container_from_location(dir.path().to_str().unwrap()).unwrap();
        assert!(url.is_container());
        assert_eq!(url.to_file_path().unwrap(), dir.path());
    }

    #[test]
    fn test_make_relative() {
        let base = ObjectUrl::parse("s3://bucket/import/").unwrap();
        let url = ObjectUrl::parse("s3://bucket/import/7/0.seg").unwrap();
        assert_eq!(base.make_relative(&url), Some("7/0.seg".to_string()));
        let other = ObjectUrl::parse("s3://bucket/other/0.seg").unwrap();
        assert_eq!(base.make_relative(&other), None);
        let container = ObjectUrl::parse("s3://bucket/import/7/").unwrap();
        assert_eq!(base.make_relative(&container), None);
    }
}
