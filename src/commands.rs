//! Command implementations behind the `ssgs` binary.
//!
//! Everything here works on the real home directory (see [`crate::paths`])
//! and reports through `anyhow`.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use colored::Colorize;
use fs2::FileExt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::artifact::DirectoryStore;
use crate::cancel::CancelFlag;
use crate::config::{Config, load_config};
use crate::dispatch::{Action, Coordinator, DispatchReport};
use crate::init::write_template;
use crate::journal::{Channel, FileLog, SharedLog};
use crate::paths::{Paths, paths};
use crate::progress::{finish, spinner};
use crate::receiver::{Endpoint, Receiver};
use crate::secret::SecretBox;
use crate::state::{Outcome, StateStore};
use crate::sync::{ExportReconciler, ImportReconciler, SyncContext};

/// Everything a command needs, loaded from the home directory.
struct Runtime {
    paths: Paths,
    config: Config,
    secrets: SecretBox,
    state: StateStore,
    log: SharedLog,
}

impl Runtime {
    fn load() -> Result<Self> {
        let paths = paths()?;
        let config = load_config(&paths.config)?;
        let secrets = SecretBox::load_or_create(&paths.key)
            .with_context(|| format!("cannot load {}", paths.key.display()))?;
        let state = StateStore::new(&paths.state);
        let log: SharedLog = Arc::new(FileLog::new(&paths.log));
        Ok(Self {
            paths,
            config,
            secrets,
            state,
            log,
        })
    }

    fn context(&self, cancel: CancelFlag) -> SyncContext {
        SyncContext::new(
            self.config.clone(),
            self.config.working_directory(&self.paths),
            self.secrets.clone(),
            self.state.clone(),
            self.log.clone(),
        )
        .with_cancel(cancel)
    }

    fn store(&self) -> Result<DirectoryStore> {
        let dir = self.config.store_directory(&self.paths);
        DirectoryStore::open(&dir).with_context(|| format!("cannot open store {}", dir.display()))
    }

    /// Exclusive lock on the working directory, released when the returned
    /// file is dropped.
    fn lock_repository(&self) -> Result<File> {
        fs::create_dir_all(&self.paths.home)?;
        let file = File::create(&self.paths.lock)
            .with_context(|| format!("cannot create {}", self.paths.lock.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("cannot lock {}", self.paths.lock.display()))?;
        Ok(file)
    }

    fn coordinator(&self, cancel: CancelFlag) -> Coordinator {
        Coordinator::new(
            &self.config,
            self.secrets.clone(),
            self.state.clone(),
            self.log.clone(),
        )
        .with_cancel(cancel)
    }
}

fn ctrlc_flag() -> Result<CancelFlag> {
    let flag = CancelFlag::new();
    let handle = flag.clone();
    ctrlc::set_handler(move || handle.cancel()).context("cannot install Ctrl-C handler")?;
    Ok(flag)
}

pub fn cmd_init() -> Result<()> {
    let p = paths()?;
    if write_template(&p.config)? {
        println!("wrote {}", p.config.display());
    } else {
        println!("config already exists: {}", p.config.display());
    }
    Ok(())
}

pub fn cmd_home() -> Result<()> {
    println!("{}", paths()?.home.display());
    Ok(())
}

/// Export every mapped artifact and push the result.
pub fn cmd_export() -> Result<()> {
    let rt = Runtime::load()?;
    let _lock = rt.lock_repository()?;
    let store = rt.store()?;
    let ctx = rt.context(ctrlc_flag()?);

    let pb = spinner(format!("exporting {} artifact(s)", rt.config.artifacts.len()));
    match ExportReconciler::new(&ctx, &store).export_and_push_all() {
        Ok(summary) => {
            let mut msg = format!("exported {}", summary.exported.len());
            if !summary.skipped.is_empty() {
                msg.push_str(&format!(", not found: {}", summary.skipped.join(", ")));
            }
            if summary.cancelled {
                msg.push_str(" (cancelled, nothing pushed)");
            } else if summary.pushed {
                msg.push_str(", pushed");
            } else {
                msg.push_str(", nothing to push");
            }
            finish(&pb, !summary.cancelled, msg);
            Ok(())
        }
        Err(e) => {
            finish(&pb, false, format!("export failed: {e}"));
            Err(e.into())
        }
    }
}

fn import_once(rt: &Runtime, store: &DirectoryStore, cancel: &CancelFlag) -> Result<String> {
    let _lock = rt.lock_repository()?;
    let ctx = rt.context(cancel.clone());
    let summary = ImportReconciler::new(&ctx, store).pull_and_import_all()?;

    let mut msg = if summary.imported.is_empty() {
        "nothing to import".to_string()
    } else {
        format!("imported {}", summary.imported.join(", "))
    };
    if !summary.missing.is_empty() {
        msg.push_str(&format!("; missing: {}", summary.missing.join(", ")));
    }
    if !summary.failed.is_empty() {
        let failed: Vec<&str> = summary.failed.keys().map(String::as_str).collect();
        msg.push_str(&format!("; failed: {}", failed.join(", ")));
    }
    Ok(msg)
}

/// Pull and import once, or every `every` seconds until Ctrl-C.
pub fn cmd_import(every: Option<u64>) -> Result<()> {
    let rt = Runtime::load()?;
    let store = rt.store()?;
    let cancel = ctrlc_flag()?;

    let Some(secs) = every else {
        let pb = spinner("pulling and importing");
        return match import_once(&rt, &store, &cancel) {
            Ok(msg) => {
                finish(&pb, true, msg);
                Ok(())
            }
            Err(e) => {
                finish(&pb, false, format!("import failed: {e}"));
                Err(e)
            }
        };
    };

    let interval = Duration::from_secs(secs.max(1));
    rt.log.log(
        Channel::Cron,
        0,
        &format!("Scheduled import every {}s started.", interval.as_secs()),
    );
    while !cancel.is_cancelled() {
        match import_once(&rt, &store, &cancel) {
            Ok(msg) => rt.log.log(Channel::Cron, 0, &format!("Scheduled import: {msg}")),
            Err(e) => rt
                .log
                .log(Channel::Cron, 1, &format!("Scheduled import failed: {e:#}")),
        }
        let started = Instant::now();
        while started.elapsed() < interval && !cancel.is_cancelled() {
            thread::sleep(Duration::from_millis(200));
        }
    }
    rt.log.log(Channel::Cron, 0, "Scheduled import stopped.");
    Ok(())
}

fn print_report(report: &DispatchReport) {
    for (label, msg) in &report.succeeded {
        println!("{} {}: {}", "✔".green(), label.bold(), msg);
    }
    for (label, msg) in &report.failed {
        println!("{} {}: {}", "✘".red(), label.bold(), msg);
    }
    for e in &report.errors {
        println!("{} {}", "!".yellow(), e);
    }
}

fn dispatch(action: Action, labels: &[String]) -> Result<()> {
    let rt = Runtime::load()?;
    let coordinator = rt.coordinator(ctrlc_flag()?);
    let kind = action.kind();

    let pb = spinner(format!("sending {} request(s)", action.endpoint_name()));
    let report = match coordinator.trigger(&action, labels) {
        Ok(r) => r,
        Err(e) => {
            finish(&pb, false, e.to_string());
            return Err(e.into());
        }
    };
    let summary = report.summary(kind);
    finish(&pb, report.is_clean(), summary.clone());
    print_report(&report);

    if report.is_clean() {
        Ok(())
    } else {
        Err(anyhow!(summary))
    }
}

pub fn cmd_push_token(token: &str, username: Option<&str>, labels: &[String]) -> Result<()> {
    dispatch(
        Action::Token {
            token: token.trim().to_string(),
            username: username.map(str::to_string),
        },
        labels,
    )
}

pub fn cmd_remote_import(labels: &[String]) -> Result<()> {
    dispatch(Action::Import, labels)
}

pub fn cmd_clear_cache(labels: &[String]) -> Result<()> {
    dispatch(Action::ClearCache, labels)
}

fn format_time(ts: Option<i64>) -> String {
    ts.and_then(|t| DateTime::from_timestamp(t, 0))
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "never".to_string())
}

/// Print timestamps, artifact ids and the last dispatch outcome per site.
pub fn cmd_status() -> Result<()> {
    let rt = Runtime::load()?;
    let state = rt.state.load()?;

    println!("{} {}", "site:".bold(), rt.config.site);
    println!(
        "{} {}",
        "working tree:".bold(),
        rt.config.working_directory(&rt.paths).display()
    );
    println!("{} {}", "last export:".bold(), format_time(state.last_export));
    println!("{} {}", "last import:".bold(), format_time(state.last_import));

    if !rt.config.artifacts.is_empty() {
        println!("{}", "artifacts:".bold());
        for a in rt.config.artifacts.iter() {
            let id = state
                .artifact_ids
                .get(&a.slug)
                .map(|id| format!("#{id}"))
                .unwrap_or_else(|| "-".to_string());
            let commit = state
                .file_state
                .get(&a.file)
                .map(|c| c.chars().take(8).collect::<String>())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {} {} {} {} imported {}",
                a.slug,
                a.file.dimmed(),
                id,
                commit,
                format_time(state.last_imports.get(&a.slug).copied())
            );
        }
    }

    if !rt.config.secondaries.is_empty() {
        println!("{}", "secondaries:".bold());
        for site in &rt.config.secondaries {
            match state.secondary_status.get(&site.label) {
                Some(st) => {
                    let result = match st.result {
                        Outcome::Success => "success".green(),
                        Outcome::Error => "error".red(),
                    };
                    println!(
                        "  {} {} {} {} {}",
                        site.label,
                        st.action.as_str(),
                        result,
                        format_time(Some(st.timestamp)),
                        st.message
                    );
                }
                None => println!("  {} {}", site.label, "no dispatch yet".dimmed()),
            }
        }
    }
    Ok(())
}

/// Print the stored form of `plaintext`.
pub fn cmd_encrypt(plaintext: &str) -> Result<()> {
    let p = paths()?;
    let secrets = SecretBox::load_or_create(&p.key)?;
    println!("{}", secrets.encrypt(plaintext));
    Ok(())
}

/// Handle one inbound request. The JSON body is read from stdin; the
/// response is printed as `{"http": ..., "body": ...}`.
pub fn cmd_receive(endpoint: &str, secret_header: Option<&str>) -> Result<()> {
    let endpoint: Endpoint = endpoint.parse().map_err(|e: String| anyhow!(e))?;
    let mut raw = String::new();
    io::stdin()
        .read_to_string(&mut raw)
        .context("cannot read request body")?;
    let body = if raw.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&raw).context("request body is not JSON")?
    };

    let rt = Runtime::load()?;
    let _lock = rt.lock_repository()?;
    let store = rt.store()?;
    let mut receiver = Receiver::new(&rt.paths.config, rt.context(CancelFlag::new()), &store);
    let resp = receiver.handle(endpoint, secret_header, &body);
    println!("{}", resp.to_json());
    Ok(())
}
