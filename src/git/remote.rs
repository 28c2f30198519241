use regex::Regex;
use reqwest::Url;

use crate::config::{AuthMode, RepositoryConfig};
use crate::error::{Error, Result};
use crate::secret::SecretBox;

/// `user@host:path`, or bare `host:path`.
const SCP_LIKE: &str = r"^(?:[A-Za-z0-9._-]+@)?([A-Za-z0-9.-]+):(.+)$";

/// Username used when the token alone authenticates (GitHub convention).
const TOKEN_ONLY_USER: &str = "x-oauth-basic";

/// Rewrite `base` into an HTTPS URL carrying `username:token` as user-info.
///
/// `base` may be any URL with a host or an SCP-like `git@host:org/repo.git`.
/// Host, path and query are kept. An http(s) port is kept; non-http schemes
/// (`ssh://`, `git://`) become `https://` on the default port.
///
/// # Errors
/// [`Error::InvalidRepositoryUrl`] if `base` is neither.
pub fn authenticated_remote(base: &str, username: &str, token: &str) -> Result<String> {
    let base = base.trim();
    let invalid = || Error::InvalidRepositoryUrl(base.to_string());

    let mut url = match Url::parse(base) {
        Ok(u) if u.host_str().is_some_and(|h| !h.is_empty()) => u,
        _ => {
            let re = Regex::new(SCP_LIKE).map_err(|_| invalid())?;
            let caps = re.captures(base).ok_or_else(invalid)?;
            let path = caps[2].trim_start_matches('/');
            Url::parse(&format!("https://{}/{}", &caps[1], path)).map_err(|_| invalid())?
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        let host = url.host_str().ok_or_else(invalid)?.to_string();
        let mut rebuilt = format!("https://{}{}", host, url.path());
        if let Some(q) = url.query() {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        url = Url::parse(&rebuilt).map_err(|_| invalid())?;
    }

    let user = if username.trim().is_empty() {
        TOKEN_ONLY_USER
    } else {
        username.trim()
    };
    url.set_username(user).map_err(|_| invalid())?;
    url.set_password(Some(token)).map_err(|_| invalid())?;
    url.set_fragment(None);
    Ok(url.to_string())
}

/// The remote URL to hand to git for `repo`.
///
/// # Errors
/// - [`Error::RepositoryNotConfigured`] when no remote is set
/// - [`Error::MissingCredential`] in token mode without a stored token
/// - [`Error::InvalidRepositoryUrl`] when the remote cannot be rewritten
pub fn resolve_remote(repo: &RepositoryConfig, secrets: &SecretBox) -> Result<String> {
    let remote = repo.remote.trim();
    if remote.is_empty() {
        return Err(Error::RepositoryNotConfigured);
    }
    match repo.auth.mode {
        AuthMode::Ssh => Ok(remote.to_string()),
        AuthMode::HttpsToken => {
            let token = secrets.decrypt(&repo.auth.token);
            if token.is_empty() {
                return Err(Error::MissingCredential);
            }
            authenticated_remote(remote, &repo.auth.username, &token)
        }
    }
}

/// Mask the password part of any `scheme://user:password@` in `text`.
pub fn redact(text: &str) -> String {
    match Regex::new(r"(://[^/\s:@]*):[^@\s/]*@") {
        Ok(re) => re.replace_all(text, "$1:***@").into_owned(),
        Err(_) => text.to_string(),
    }
}
