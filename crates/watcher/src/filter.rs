//! Exclude rules for mirrored trees
//!
//! Patterns come from the configuration's `Exclude` array and use
//! gitignore syntax, rooted at the source tree. They gate what gets
//! mirrored: excluded entries are never copied, and resync scans skip
//! them on both sides.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

/// Config-driven exclude matcher
pub struct ExcludeRules {
    matcher: Option<Gitignore>,
}

impl ExcludeRules {
    /// Build rules from configuration patterns
    pub fn new(source_root: &Path, patterns: &[String]) -> Result<Self, ignore::Error> {
        if patterns.is_empty() {
            return Ok(Self::empty());
        }

        let mut builder = GitignoreBuilder::new(source_root);
        for pattern in patterns {
            builder.add_line(None, pattern)?;
        }

        Ok(Self {
            matcher: Some(builder.build()?),
        })
    }

    /// Rules that exclude nothing
    pub fn empty() -> Self {
        Self { matcher: None }
    }

    /// Check a path relative to the source root
    ///
    /// A path is excluded when it or any of its parents matches a
    /// pattern, so entries inside an excluded directory stay excluded.
    pub fn is_excluded(&self, relative: &Path, is_dir: bool) -> bool {
        match &self.matcher {
            Some(matcher) => matcher
                .matched_path_or_any_parents(relative, is_dir)
                .is_ignore(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rules(patterns: &[&str]) -> ExcludeRules {
        let temp_dir = TempDir::new().unwrap();
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        ExcludeRules::new(temp_dir.path(), &patterns).unwrap()
    }

    #[test]
    fn test_empty_rules_exclude_nothing() {
        let rules = ExcludeRules::empty();
        assert!(!rules.is_excluded(Path::new("a.tmp"), false));
        assert!(!rules.is_excluded(Path::new("build"), true));
    }

    #[test]
    fn test_glob_pattern() {
        let rules = rules(&["*.tmp"]);
        assert!(rules.is_excluded(Path::new("a.tmp"), false));
        assert!(rules.is_excluded(Path::new("sub/b.tmp"), false));
        assert!(!rules.is_excluded(Path::new("a.txt"), false));
    }

    #[test]
    fn test_directory_pattern_covers_children() {
        let rules = rules(&["build/"]);
        assert!(rules.is_excluded(Path::new("build"), true));
        assert!(rules.is_excluded(Path::new("build/out.o"), false));
        assert!(rules.is_excluded(Path::new("build/deep/nested.o"), false));
        assert!(!rules.is_excluded(Path::new("src/main.rs"), false));
    }

    #[test]
    fn test_negation_pattern() {
        let rules = rules(&["*.log", "!keep.log"]);
        assert!(rules.is_excluded(Path::new("debug.log"), false));
        assert!(!rules.is_excluded(Path::new("keep.log"), false));
    }
}
