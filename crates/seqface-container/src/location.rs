use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use seqface_core::{IngestError, Result};

/// Storage backend family selected by a location's URI scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Bare path or `file://`.
    Local,
    /// `hdfs://host:port/path`
    Hdfs,
    /// `s3n://bucket/key`
    S3n,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scheme::Local => "local",
            Scheme::Hdfs => "hdfs",
            Scheme::S3n => "s3n",
        };
        f.write_str(name)
    }
}

/// A parsed container or directory location.
///
/// For local locations `uri` is the filesystem path with any `file://`
/// prefix removed; remote locations keep their full URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    scheme: Scheme,
    uri: String,
}

impl Location {
    /// Parse a location, resolving bare absolute paths against `default_fs`
    /// when one is configured.
    pub fn parse(uri: &str, default_fs: Option<&str>) -> Result<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(IngestError::storage(uri, "empty location"));
        }

        if let Some((scheme, rest)) = split_scheme(uri) {
            return match scheme.to_ascii_lowercase().as_str() {
                "hdfs" => Ok(Self::remote(Scheme::Hdfs, uri)),
                "s3n" => Ok(Self::remote(Scheme::S3n, uri)),
                "file" => Ok(Self::local(rest)),
                other => Err(IngestError::storage(
                    uri,
                    format!("unrecognized URI scheme '{other}'"),
                )),
            };
        }

        match default_fs {
            Some(fs) if uri.starts_with('/') && !fs.trim().is_empty() => {
                let base = fs.trim().trim_end_matches('/');
                Self::parse(&format!("{base}{uri}"), None)
            }
            _ => Ok(Self::local(uri)),
        }
    }

    pub fn local(path: impl AsRef<Path>) -> Self {
        Self {
            scheme: Scheme::Local,
            uri: path.as_ref().to_string_lossy().into_owned(),
        }
    }

    fn remote(scheme: Scheme, uri: &str) -> Self {
        Self {
            scheme,
            uri: uri.to_string(),
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn as_str(&self) -> &str {
        &self.uri
    }

    /// Filesystem path for local locations.
    pub fn to_path(&self) -> Option<PathBuf> {
        match self.scheme {
            Scheme::Local => Some(PathBuf::from(&self.uri)),
            _ => None,
        }
    }

    /// Last path segment, e.g. `part-00000.seq`.
    pub fn file_name(&self) -> &str {
        let path = self.uri.trim_end_matches('/');
        path.rsplit('/').next().unwrap_or(path)
    }

    /// Location of `name` inside this (directory) location.
    pub fn join(&self, name: &str) -> Self {
        match self.scheme {
            Scheme::Local => Self::local(Path::new(&self.uri).join(name)),
            scheme => Self::remote(
                scheme,
                &format!("{}/{}", self.uri.trim_end_matches('/'), name),
            ),
        }
    }
}

/// Split `scheme://rest` when the leading part is a URI scheme
/// (`[A-Za-z][A-Za-z0-9+.-]*`). Paths that merely contain `://` are not URIs.
fn split_scheme(uri: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = uri.split_once("://")?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'));
    valid.then_some((scheme, rest))
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}
