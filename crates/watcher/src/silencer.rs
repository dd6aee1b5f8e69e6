//! Ignore/only rule engine
//!
//! Decides per relative path and entry type whether a change is noise:
//! 1. Ignore patterns (built-in defaults, unless overridden, plus user patterns)
//! 2. An optional only-list, applied to files only so directories are still
//!    descended into to reach matching files
//!
//! Patterns are regular expressions matched against the `/`-joined path
//! relative to the watched root.

use crate::config::{compile_pattern, Config};
use crate::error::Result;
use crate::event::EntryType;
use lookout_core::RelPath;
use parking_lot::RwLock;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Silencer shared between a listener and its dispatchers
pub type SharedSilencer = Arc<RwLock<Silencer>>;

/// VCS, dependency and build directories at the top of a watched root
const DEFAULT_IGNORED_DIRECTORIES: &str = r"(?x)^(?:
      \.git | \.svn | \.hg | \.jj | \.bzr
    | \.rbx | \.bundle | bundle | vendor/bundle | vendor/ruby
    | log | tmp | node_modules | target
    # Emacs auto-save and lock files
    | \#.+\# | \.\#.+
)(?:/|$)";

/// Editor swap files and other temporaries, anywhere in the tree
const DEFAULT_IGNORED_FILES: &str = r"(?x)(?:
      # Kate
      \..*\d+\.new | \.kate-swp
      # Gedit
    | \.goutputstream-.{6}
      # JetBrains safe-write
    | ___jb_bak___ | ___jb_old___
      # Vim swap files and write test
    | \.sw[px] | \.swpx | (?:^|/)4913
      # Sed in-place temporaries
    | (?:^|/)sed[a-zA-Z0-9]{0,6}
      # Mutagen sync
    | \.mutagen-temp-.{6}
    | \.DS_Store | \.tmp | ~
)$";

/// Ignore/only rule set
#[derive(Debug, Clone)]
pub struct Silencer {
    ignore: Vec<Regex>,
    only: Option<Vec<Regex>>,
}

impl Default for Silencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Silencer {
    /// Rule set with only the built-in defaults
    pub fn new() -> Self {
        Self {
            ignore: default_patterns(),
            only: None,
        }
    }

    /// Rule set described by a listener configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut silencer = Self::new();
        if let Some(overrides) = &config.ignore_override {
            silencer.replace_ignores(overrides)?;
        }
        silencer.append_ignores(&config.ignore)?;
        if let Some(only) = &config.only {
            silencer.replace_only(only)?;
        }
        debug!(
            "Ignoring: {}",
            silencer.ignore_patterns().collect::<Vec<_>>().join(" | ")
        );
        Ok(silencer)
    }

    /// Wrap for sharing with dispatchers
    pub fn shared(self) -> SharedSilencer {
        Arc::new(RwLock::new(self))
    }

    /// Check if a change to `path` should be suppressed
    pub fn is_silenced(&self, path: &RelPath, entry_type: EntryType) -> bool {
        let path = path.to_string();

        if self.ignore.iter().any(|pattern| pattern.is_match(&path)) {
            return true;
        }

        match (&self.only, entry_type) {
            (Some(only), EntryType::File) => !only.iter().any(|pattern| pattern.is_match(&path)),
            _ => false,
        }
    }

    /// Add patterns to the ignore list
    pub fn append_ignores<I>(&mut self, patterns: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let compiled = compile_all(patterns)?;
        self.ignore.extend(compiled);
        Ok(())
    }

    /// Replace the ignore list, defaults included
    pub fn replace_ignores<I>(&mut self, patterns: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.ignore = compile_all(patterns)?;
        Ok(())
    }

    /// Replace the only-list; an empty list removes the restriction
    pub fn replace_only<I>(&mut self, patterns: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let compiled = compile_all(patterns)?;
        self.only = (!compiled.is_empty()).then_some(compiled);
        Ok(())
    }

    /// Active ignore patterns, in match order
    pub fn ignore_patterns(&self) -> impl Iterator<Item = &str> {
        self.ignore.iter().map(Regex::as_str)
    }
}

fn default_patterns() -> Vec<Regex> {
    [DEFAULT_IGNORED_DIRECTORIES, DEFAULT_IGNORED_FILES]
        .into_iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(err) => {
                tracing::error!("Built-in ignore pattern failed to compile: {}", err);
                None
            }
        })
        .collect()
}

fn compile_all<I>(patterns: I) -> Result<Vec<Regex>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|pattern| compile_pattern(pattern.as_ref()))
        .collect()
}
