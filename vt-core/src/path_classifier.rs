//! PathClassifier (§4.1): ignore-rule matching and remote-kind inference
//! for paths with no existing remote counterpart.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::remote_api::Kind;

/// Patterns appended after every `.vtignore` found in the tree, matching
/// gitignore precedence (later rules win). Mirrors the teacher's
/// `resolve_todo_dir` convention of always excluding VCS/tooling
/// directories from its own walks (`vizier-core/src/tools.rs`).
pub const ALWAYS_IGNORE_PATTERNS: &[&str] = &[".vt/", ".git/", "node_modules/", ".DS_Store"];

pub const MAX_WALK_UP_LEVELS: usize = 64;

/// A compiled set of ignore rules for one working tree, built from every
/// `.vtignore` under `root` plus `ALWAYS_IGNORE_PATTERNS`. Built once by
/// `MetaStore::load_ignore_rules` and then reused for an entire diff.
pub struct IgnoreRules {
    matcher: Gitignore,
}

impl IgnoreRules {
    /// `vtignore_files` is an ordered list of `(directory, contents)` pairs
    /// — every `.vtignore` in the tree, in the order they were discovered by
    /// walking down from `root`. Shallower files are added first so that a
    /// deeper, more specific `.vtignore` can override them, matching
    /// gitignore's "closer wins" semantics.
    pub fn build<'a>(root: &Path, vtignore_files: impl IntoIterator<Item = (&'a Path, &'a str)>) -> Self {
        let mut builder = GitignoreBuilder::new(root);
        for (dir, contents) in vtignore_files {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                // GitignoreBuilder::add_line scopes a pattern to the directory
                // the originating .vtignore lives in, same as git does for
                // nested .gitignore files.
                let _ = builder.add_line(Some(dir.to_path_buf()), line);
            }
        }
        for pattern in ALWAYS_IGNORE_PATTERNS {
            let _ = builder.add_line(None, pattern);
        }
        let matcher = builder.build().unwrap_or_else(|_| Gitignore::empty());
        IgnoreRules { matcher }
    }

    pub fn empty() -> Self {
        IgnoreRules {
            matcher: Gitignore::empty(),
        }
    }

    /// True iff `path` (relative to the working-tree root) matches any rule,
    /// honoring negation and last-match-wins per gitignore semantics.
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.matcher.matched_path_or_any_parents(path, is_dir).is_ignore()
    }
}

/// Infer the remote `Kind` for a path with no existing remote entry.
/// `existing_remote_kind` short-circuits the inference — kind is stable
/// across a push (§3 invariants) so an already-known kind is returned
/// unchanged.
pub fn infer_kind(path: &Path, existing_remote_kind: Option<Kind>) -> Kind {
    if let Some(kind) = existing_remote_kind {
        return kind;
    }

    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return Kind::File;
    };
    if !matches!(ext, "ts" | "tsx" | "js" | "jsx") {
        return Kind::File;
    }

    let basename = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let matches = [
        ("cron", Kind::Interval),
        ("http", Kind::Http),
        ("email", Kind::Email),
    ];
    let hits: Vec<Kind> = matches
        .iter()
        .filter(|(needle, _)| basename.contains(needle))
        .map(|(_, kind)| *kind)
        .collect();

    match hits.as_slice() {
        [] => Kind::Script,
        [only] => *only,
        _ => Kind::Script,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn infer_kind_prefers_existing_remote_kind() {
        assert_eq!(
            infer_kind(Path::new("anything.ts"), Some(Kind::File)),
            Kind::File
        );
    }

    #[test]
    fn infer_kind_cron_http_email() {
        assert_eq!(infer_kind(Path::new("myCron.ts"), None), Kind::Interval);
        assert_eq!(infer_kind(Path::new("myHttpHandler.ts"), None), Kind::Http);
        assert_eq!(infer_kind(Path::new("sendEmail.tsx"), None), Kind::Email);
    }

    #[test]
    fn infer_kind_ambiguous_falls_back_to_script() {
        assert_eq!(infer_kind(Path::new("myCronHttpEmail.ts"), None), Kind::Script);
    }

    #[test]
    fn infer_kind_zero_matches_is_script() {
        assert_eq!(infer_kind(Path::new("utils.ts"), None), Kind::Script);
    }

    #[test]
    fn infer_kind_non_val_extension_is_file() {
        assert_eq!(infer_kind(Path::new("readme.md"), None), Kind::File);
        assert_eq!(infer_kind(Path::new("data.json"), None), Kind::File);
    }

    #[test]
    fn ignore_rules_honor_negation_and_always_ignore() {
        let root = PathBuf::from("/tmp/vt-fixture");
        let rules = IgnoreRules::build(
            &root,
            [(root.as_path(), "*.log\n!important.log\n")],
        );
        assert!(rules.is_ignored(Path::new("debug.log"), false));
        assert!(!rules.is_ignored(Path::new("important.log"), false));
        assert!(rules.is_ignored(Path::new(".vt/state"), false));
    }
}
