use crate::error::{Error, Result};

/// Program every argv must start with.
pub const PROGRAM: &str = "git";

/// The only subcommands ever executed. Remote URLs and branch names come
/// from configuration and inbound requests, so nothing outside this list may
/// reach a process.
pub const ALLOWED_SUBCOMMANDS: &[&str] = &[
    "status",
    "add",
    "commit",
    "pull",
    "push",
    "reset",
    "checkout",
    "init",
    "remote",
    "fetch",
    "branch",
    "rev-parse",
    "clean",
];

/// A validated `git <subcommand> ...` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommand {
    argv: Vec<String>,
}

impl GitCommand {
    /// Validate `argv` against the allow-list.
    ///
    /// # Errors
    /// [`Error::InvalidCommand`] when the first token is not `git` or the
    /// second is missing or not an allowed subcommand.
    pub fn parse<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let argv: Vec<String> = argv.into_iter().map(|s| s.as_ref().to_string()).collect();
        let program_ok = argv.first().is_some_and(|p| p == PROGRAM);
        let sub_ok = argv
            .get(1)
            .is_some_and(|s| ALLOWED_SUBCOMMANDS.contains(&s.as_str()));
        if !program_ok || !sub_ok {
            return Err(Error::InvalidCommand {
                argv: argv.join(" "),
            });
        }
        Ok(Self { argv })
    }

    pub fn subcommand(&self) -> &str {
        &self.argv[1]
    }

    /// Arguments after the program name.
    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

/// Reject a branch name git could read as an option or that is not a
/// valid ref name.
///
/// # Errors
/// [`Error::InvalidCommand`] naming the rejected branch.
pub fn check_branch(branch: &str) -> Result<()> {
    let bad_char = |c: char| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c);
    let valid = !branch.is_empty()
        && branch != "@"
        && !branch.starts_with('-')
        && !branch.starts_with('/')
        && !branch.ends_with('/')
        && !branch.ends_with('.')
        && !branch.ends_with(".lock")
        && !branch.contains("..")
        && !branch.contains("//")
        && !branch.contains("@{")
        && !branch.chars().any(bad_char)
        && !branch.split('/').any(|part| part.starts_with('.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidCommand {
            argv: format!("branch {branch:?}"),
        })
    }
}

/// Reject a remote git could read as an option.
///
/// # Errors
/// [`Error::InvalidCommand`] naming the rejected remote (redacted).
pub fn check_remote(remote: &str) -> Result<()> {
    if remote.starts_with('-') || remote.chars().any(char::is_control) {
        return Err(Error::InvalidCommand {
            argv: format!("remote {:?}", super::remote::redact(remote)),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_branches_pass() {
        for b in ["main", "live", "release/2024-10", "feature_x", "v1.2"] {
            check_branch(b).unwrap();
        }
    }

    #[test]
    fn option_like_and_malformed_branches_fail() {
        for b in [
            "",
            "-b",
            "--upload-pack=touch /tmp/x;git-upload-pack",
            "a..b",
            "a b",
            "tab\there",
            "nul\0",
            "x~1",
            "x^",
            "a:b",
            "a?",
            "a*",
            "a[",
            "a\\b",
            "/abs",
            "trail/",
            "a//b",
            "end.",
            "ref.lock",
            ".hidden",
            "dir/.hidden",
            "x@{1}",
            "@",
        ] {
            assert!(
                matches!(check_branch(b), Err(Error::InvalidCommand { .. })),
                "{b:?}"
            );
        }
    }

    #[test]
    fn option_like_remotes_fail() {
        check_remote("https://git.example.com/acme/sliders.git").unwrap();
        check_remote("git@github.com:acme/sliders.git").unwrap();
        check_remote("/srv/git/sliders.git").unwrap();
        for r in ["--upload-pack=evil", "-oProxyCommand=x", "https://h/\nx"] {
            assert!(check_remote(r).is_err(), "{r:?}");
        }
    }

    #[test]
    fn accepts_every_allowed_subcommand() {
        for sub in ALLOWED_SUBCOMMANDS {
            let cmd = GitCommand::parse(["git", sub, "--flag"]).unwrap();
            assert_eq!(cmd.subcommand(), *sub);
            assert_eq!(cmd.args().len(), 2);
        }
    }

    #[test]
    fn rejects_other_subcommands() {
        for sub in ["log", "config", "clone", "gc", "submodule", "", "STATUS", "--version"] {
            let err = GitCommand::parse(["git", sub]).unwrap_err();
            assert!(matches!(err, Error::InvalidCommand { .. }), "{sub}");
        }
    }

    #[test]
    fn rejects_other_programs() {
        for argv in [
            vec!["sh", "status"],
            vec!["/usr/bin/git", "status"],
            vec!["gitx", "status"],
            vec!["git"],
            vec![],
        ] {
            assert!(matches!(
                GitCommand::parse(argv.clone()),
                Err(Error::InvalidCommand { .. })
            ));
        }
    }
}
