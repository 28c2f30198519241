use anyhow::Result;
use std::{env, path::PathBuf};

/// Well-known locations under the ssgs home directory.
#[derive(Clone, Debug)]
pub struct Paths {
    pub home: PathBuf,
    pub config: PathBuf,
    pub state: PathBuf,
    pub log: PathBuf,
    pub key: PathBuf,
    pub repo: PathBuf,
    pub store: PathBuf,
    pub lock: PathBuf,
}

/// Resolve the ssgs home directory.
///
/// `$SSGS_HOME` wins; otherwise `$XDG_CONFIG_HOME/ssgs`, falling back to
/// `$HOME/.config/ssgs`.
pub fn ssgs_home() -> Result<PathBuf> {
    if let Some(explicit) = env::var_os("SSGS_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(explicit));
    }
    let xdg = env::var_os("XDG_CONFIG_HOME");
    let base = xdg
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env::var_os("HOME").unwrap_or_default()).join(".config"));
    Ok(base.join("ssgs"))
}

pub fn paths() -> Result<Paths> {
    Ok(paths_in(ssgs_home()?))
}

pub fn paths_in(home: PathBuf) -> Paths {
    Paths {
        config: home.join("config.toml"),
        state: home.join("state.json"),
        log: home.join("ssgs.log"),
        key: home.join("secret.key"),
        repo: home.join("repo"),
        store: home.join("store"),
        lock: home.join("repo.lock"),
        home,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn explicit_home_overrides_xdg() {
        let prev = env::var_os("SSGS_HOME");
        unsafe { env::set_var("SSGS_HOME", "/tmp/ssgs-explicit") };
        let home = ssgs_home().unwrap();
        match prev {
            Some(v) => unsafe { env::set_var("SSGS_HOME", v) },
            None => unsafe { env::remove_var("SSGS_HOME") },
        }
        assert_eq!(home, PathBuf::from("/tmp/ssgs-explicit"));
    }

    #[test]
    fn layout_is_rooted_at_home() {
        let p = paths_in(PathBuf::from("/srv/ssgs"));
        assert_eq!(p.config, PathBuf::from("/srv/ssgs/config.toml"));
        assert_eq!(p.repo, PathBuf::from("/srv/ssgs/repo"));
        assert_eq!(p.lock, PathBuf::from("/srv/ssgs/repo.lock"));
    }
}
