//! Preserve-file pattern matching.
//!
//! During apply, a file whose path (relative to the installation root) matches a
//! preserve pattern is left alone when it already exists, so user configuration and
//! data survive an update.
//!
//! # Match Modes
//!
//! - [`PreserveMatch::Loose`] (default): a path matches when the glob matches the
//!   whole relative path **or** the pattern occurs anywhere in the path as a plain
//!   substring. `config.yaml` therefore protects `config.yaml` and
//!   `conf/config.yaml`, but a pattern such as `log` also protects `catalog.db`.
//! - [`PreserveMatch::Glob`]: only a whole-path glob match counts.
//!
//! # Pattern Syntax
//!
//! Patterns use `glob` syntax against `/`-separated relative paths:
//!
//! - `*` matches any sequence of characters within one path component
//! - `**` matches any number of path components
//! - `?` matches any single character
//! - `[abc]` / `[a-z]` match one character from a set or range
//!
//! # Examples
//!
//! ```rust,no_run
//! use updraft::pattern::{PreserveMatch, PreserveMatcher};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let matcher = PreserveMatcher::new(&["*.conf".to_string()], PreserveMatch::Glob)?;
//! assert!(matcher.is_match(Path::new("app.conf")));
//! assert!(!matcher.is_match(Path::new("etc/app.conf")));
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::trace;

use crate::utils::platform::normalize_path_for_matching;

/// How preserve patterns are matched against relative paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreserveMatch {
    /// Glob match or substring containment.
    #[default]
    Loose,
    /// Glob match only.
    Glob,
}

impl PreserveMatch {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Loose => "loose",
            Self::Glob => "glob",
        }
    }
}

impl fmt::Display for PreserveMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreserveMatch {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "loose" => Ok(Self::Loose),
            "glob" => Ok(Self::Glob),
            other => Err(format!("unknown preserve match mode '{other}' (expected loose or glob)")),
        }
    }
}

/// One compiled preserve pattern.
#[derive(Debug, Clone)]
struct CompiledPattern {
    pattern: Pattern,
    original: String,
}

/// Compiled preserve-pattern set.
#[derive(Debug, Clone)]
pub struct PreserveMatcher {
    patterns: Vec<CompiledPattern>,
    mode: PreserveMatch,
}

impl PreserveMatcher {
    /// `*` must not cross a `/`, matching shell glob semantics for relative paths.
    const OPTIONS: MatchOptions = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    /// Compiles `patterns`. Empty patterns are ignored; invalid glob syntax is an error.
    pub fn new(patterns: &[String], mode: PreserveMatch) -> Result<Self> {
        let patterns = patterns
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| {
                let pattern =
                    Pattern::new(p).with_context(|| format!("Invalid preserve pattern: {p}"))?;
                Ok(CompiledPattern {
                    pattern,
                    original: p.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patterns,
            mode,
        })
    }

    /// A matcher that preserves nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            mode: PreserveMatch::Loose,
        }
    }

    /// Whether `relative_path` (relative to the installation root) is protected.
    #[must_use]
    pub fn is_match(&self, relative_path: &Path) -> bool {
        self.matching_pattern(relative_path).is_some()
    }

    /// The first pattern that protects `relative_path`, if any.
    #[must_use]
    pub fn matching_pattern(&self, relative_path: &Path) -> Option<&str> {
        let rel = normalize_path_for_matching(relative_path);

        self.patterns
            .iter()
            .find(|p| {
                p.pattern.matches_with(&rel, Self::OPTIONS)
                    || (self.mode == PreserveMatch::Loose && rel.contains(p.original.as_str()))
            })
            .map(|p| {
                trace!("Path '{}' matches preserve pattern '{}'", rel, p.original);
                p.original.as_str()
            })
    }

    #[must_use]
    pub const fn mode(&self) -> PreserveMatch {
        self.mode
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
