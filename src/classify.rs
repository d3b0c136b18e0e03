//! Ordered pattern classifiers turning version-control diagnostics into failure kinds.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What a captured diagnostic says happened.
pub enum Diagnosis {
    NothingToStash,
    AlreadyUpToDate,
    Ownership,
    Permission,
    Conflict,
    Network,
    Unclassified,
}

struct Classifier {
    pattern: Regex,
    diagnosis: Diagnosis,
}

fn classifier(pattern: &str, diagnosis: Diagnosis) -> Classifier {
    Classifier {
        pattern: Regex::new(pattern).expect("classifier pattern compiles"),
        diagnosis,
    }
}

// First match wins.
static CLASSIFIERS: LazyLock<Vec<Classifier>> = LazyLock::new(|| {
    vec![
        classifier(r"No local changes to save", Diagnosis::NothingToStash),
        classifier(r"(?i)already up[ -]to[ -]date", Diagnosis::AlreadyUpToDate),
        classifier(r"Permission denied \(publickey", Diagnosis::Network),
        classifier(
            r"(?i)dubious ownership|unsafe repository|safe\.directory",
            Diagnosis::Ownership,
        ),
        classifier(
            r"(?i)permission denied|access is denied|operation not permitted|read-only file system",
            Diagnosis::Permission,
        ),
        classifier(
            r"(?i)conflict|automatic merge failed|not possible to fast-forward|divergent branches|would be overwritten|already exists, no checkout|could not restore untracked files|needs merge|unmerged",
            Diagnosis::Conflict,
        ),
        classifier(
            r"(?i)could not resolve host|unable to access|failed to connect|connection (timed out|refused|reset)|network is unreachable|no route to host|could not read from remote repository|remote end hung up|early eof|\bssl\b|\btls\b|timed out",
            Diagnosis::Network,
        ),
    ]
});

static SAFE_DIRECTORY_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(git config --global --add safe\.directory .+?)\s*$")
        .expect("safe.directory pattern compiles")
});

static DUBIOUS_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"repository at '([^']+)'").expect("dubious path pattern compiles")
});

/// Classify a captured diagnostic.
pub fn classify(text: &str) -> Diagnosis {
    CLASSIFIERS
        .iter()
        .find(|classifier| classifier.pattern.is_match(text))
        .map(|classifier| classifier.diagnosis)
        .unwrap_or(Diagnosis::Unclassified)
}

/// Exact command or action the operator should take for an ownership or permission failure.
pub fn ownership_remedy(text: &str, dir: &Path) -> String {
    if classify(text) == Diagnosis::Permission {
        return format!(
            "make {} writable by the current user, or run this tool elevated",
            dir.display()
        );
    }
    if let Some(hint) = SAFE_DIRECTORY_HINT.captures(text) {
        return hint[1].to_string();
    }
    let path = DUBIOUS_PATH
        .captures(text)
        .map(|captures| captures[1].to_string())
        .unwrap_or_else(|| dir.display().to_string());
    format!("git config --global --add safe.directory \"{}\"", path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_git_messages() {
        let cases = [
            ("No local changes to save", Diagnosis::NothingToStash),
            ("Already up to date.", Diagnosis::AlreadyUpToDate),
            ("Already up-to-date.", Diagnosis::AlreadyUpToDate),
            (
                "fatal: detected dubious ownership in repository at '/srv/app'",
                Diagnosis::Ownership,
            ),
            (
                "error: could not write index: Permission denied",
                Diagnosis::Permission,
            ),
            (
                "git@github.com: Permission denied (publickey).\nfatal: Could not read from remote repository.",
                Diagnosis::Network,
            ),
            (
                "CONFLICT (content): Merge conflict in config.yaml\nThe stash entry is kept in case you need it again.",
                Diagnosis::Conflict,
            ),
            (
                "fatal: Not possible to fast-forward, aborting.",
                Diagnosis::Conflict,
            ),
            (
                "fatal: unable to access 'https://github.com/x/y.git/': Could not resolve host: github.com",
                Diagnosis::Network,
            ),
            ("fatal: couldn't find remote ref staging", Diagnosis::Unclassified),
        ];
        for (text, expected) in cases {
            assert_eq!(classify(text), expected, "classifying {text:?}");
        }
    }

    #[test]
    fn remedy_prefers_gits_own_hint() {
        let text = "fatal: detected dubious ownership in repository at 'C:/ST'\n\
                    To add an exception for this directory, call:\n\n\
                    \tgit config --global --add safe.directory C:/ST\n";
        assert_eq!(
            ownership_remedy(text, Path::new("ignored")),
            "git config --global --add safe.directory C:/ST"
        );
    }

    #[test]
    fn remedy_falls_back_to_reported_or_working_dir() {
        assert_eq!(
            ownership_remedy(
                "fatal: detected dubious ownership in repository at '/srv/st'",
                Path::new("/other")
            ),
            "git config --global --add safe.directory \"/srv/st\""
        );
        assert_eq!(
            ownership_remedy("fatal: unsafe repository", Path::new("/srv/st")),
            "git config --global --add safe.directory \"/srv/st\""
        );
        assert!(
            ownership_remedy("error: Permission denied", Path::new("/srv/st"))
                .contains("writable")
        );
    }
}
