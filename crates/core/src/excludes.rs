//! Exclude rules applied while walking a snapshot root
//!
//! Two sources of patterns, both in gitignore syntax:
//! 1. Default excludes for VCS metadata and editor/OS clutter (optional, enabled by default)
//! 2. User supplied patterns
//!
//! Patterns are matched against the path relative to the snapshot root. The
//! root itself is never excluded.

use crate::error::{Result, SnapshotError};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use once_cell::sync::Lazy;
use std::path::Path;
use tracing::warn;

/// Patterns excluded from every directory walk unless disabled
pub const DEFAULT_EXCLUDES: &[&str] = &[
    // Editor backups and lock files
    "**/*~",
    "**/#*#",
    "**/.#*",
    "**/%*%",
    // macOS resource forks and folder metadata
    "**/._*",
    "**/.DS_Store",
    // CVS
    "**/CVS",
    "**/.cvsignore",
    // SCCS
    "**/SCCS",
    "**/vssver.scc",
    // Subversion
    "**/.svn",
    // Git
    "**/.git",
    "**/.gitattributes",
    "**/.gitignore",
    "**/.gitmodules",
    // Mercurial
    "**/.hg",
    "**/.hgignore",
    "**/.hgsub",
    "**/.hgsubstate",
    "**/.hgtags",
    // Bazaar
    "**/.bzr",
    "**/.bzrignore",
];

static DEFAULTS: Lazy<SnapshotExcludes> = Lazy::new(|| {
    SnapshotExcludes::defaults().unwrap_or_else(|err| {
        warn!("Default excludes failed to compile: {}", err);
        SnapshotExcludes::none()
    })
});

/// Compiled exclude rules
///
/// `Default` is the default excludes; use [`SnapshotExcludes::none`] to opt out.
#[derive(Debug, Clone)]
pub struct SnapshotExcludes {
    matcher: Option<Gitignore>,
}

impl SnapshotExcludes {
    /// Rules that exclude nothing
    pub fn none() -> Self {
        Self { matcher: None }
    }

    /// The default excludes only
    pub fn defaults() -> Result<Self> {
        Self::builder().with_defaults(true).build()
    }

    pub fn builder() -> SnapshotExcludesBuilder {
        SnapshotExcludesBuilder::default()
    }

    /// Check whether a path relative to the snapshot root is excluded
    pub fn is_excluded(&self, relative_path: &Path, is_dir: bool) -> bool {
        if relative_path.as_os_str().is_empty() {
            return false;
        }
        match &self.matcher {
            Some(matcher) => matcher.matched(relative_path, is_dir).is_ignore(),
            None => false,
        }
    }
}

impl Default for SnapshotExcludes {
    fn default() -> Self {
        DEFAULTS.clone()
    }
}

/// Collects patterns for a [`SnapshotExcludes`]
#[derive(Debug, Default)]
pub struct SnapshotExcludesBuilder {
    defaults: bool,
    patterns: Vec<String>,
}

impl SnapshotExcludesBuilder {
    pub fn with_defaults(mut self, enabled: bool) -> Self {
        self.defaults = enabled;
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    pub fn patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Compile the collected patterns
    ///
    /// Fails on the first pattern that is not valid gitignore syntax.
    pub fn build(self) -> Result<SnapshotExcludes> {
        let defaults = if self.defaults { DEFAULT_EXCLUDES } else { &[] };
        if defaults.is_empty() && self.patterns.is_empty() {
            return Ok(SnapshotExcludes::none());
        }

        let mut builder = GitignoreBuilder::new("");
        let all = defaults
            .iter()
            .copied()
            .chain(self.patterns.iter().map(String::as_str));
        for pattern in all {
            builder
                .add_line(None, pattern)
                .map_err(|source| SnapshotError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
        }
        let matcher = builder.build().map_err(|source| SnapshotError::InvalidPattern {
            pattern: self.patterns.join(", "),
            source,
        })?;
        Ok(SnapshotExcludes {
            matcher: Some(matcher),
        })
    }
}
