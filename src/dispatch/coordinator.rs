use rayon::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

use super::client::{Action, DispatchClient, DispatchOutcome};
use super::report::{DispatchReport, TargetError};
use crate::cancel::CancelFlag;
use crate::config::{Config, SecondarySite};
use crate::error::{Error, Result};
use crate::journal::{Channel, SharedLog};
use crate::secret::SecretBox;
use crate::state::{ActionKind, Outcome, StateStore};

/// Fans one action out to a set of secondary sites and records what
/// happened to each.
pub struct Coordinator {
    sites: Vec<SecondarySite>,
    secrets: SecretBox,
    state: StateStore,
    client: DispatchClient,
    concurrency: usize,
    cancel: CancelFlag,
    log: SharedLog,
}

const CANCELLED: &str = "Dispatch cancelled.";

struct Planned<'a> {
    site: &'a SecondarySite,
    secret: String,
}

impl Coordinator {
    pub fn new(config: &Config, secrets: SecretBox, state: StateStore, log: SharedLog) -> Self {
        let client = DispatchClient::new(
            config.site.clone(),
            Duration::from_secs(config.dispatch.timeout_secs.max(1)),
            log.clone(),
        );
        Self {
            sites: config.secondaries.clone(),
            secrets,
            state,
            client,
            concurrency: config.dispatch.concurrency.max(1),
            cancel: CancelFlag::new(),
            log,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Deliver a repository token to each target.
    ///
    /// # Errors
    /// [`Error::EmptyToken`] for a blank token, checked before the targets.
    pub fn push_token(
        &self,
        token: &str,
        username: Option<&str>,
        targets: &[String],
    ) -> Result<DispatchReport> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::EmptyToken);
        }
        let action = Action::Token {
            token: token.to_string(),
            username: username.map(str::to_string),
        };
        self.trigger(&action, targets)
    }

    pub fn trigger_import(&self, targets: &[String]) -> Result<DispatchReport> {
        self.trigger(&Action::Import, targets)
    }

    pub fn clear_cache(&self, targets: &[String]) -> Result<DispatchReport> {
        self.trigger(&Action::ClearCache, targets)
    }

    /// Validate `targets` against the configured sites and dispatch
    /// `action` to every valid one. A failing target never affects the
    /// others.
    ///
    /// # Errors
    /// - [`Error::EmptyToken`] for a token action with a blank token
    /// - [`Error::EmptyTargetSet`] when no non-blank label was given
    pub fn trigger(&self, action: &Action, targets: &[String]) -> Result<DispatchReport> {
        if let Action::Token { token, .. } = action
            && token.trim().is_empty()
        {
            return Err(Error::EmptyToken);
        }
        let mut labels: Vec<&str> = Vec::new();
        for t in targets.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !labels.contains(&t) {
                labels.push(t);
            }
        }
        if labels.is_empty() {
            return Err(Error::EmptyTargetSet);
        }

        if let Err(e) = self
            .state
            .prune_statuses(self.sites.iter().map(|s| s.label.as_str()))
        {
            tracing::warn!("cannot prune dispatch statuses: {}", e);
        }

        let index: HashMap<&str, &SecondarySite> =
            self.sites.iter().map(|s| (s.label.as_str(), s)).collect();

        let mut report = DispatchReport::default();
        let mut planned = Vec::new();
        for label in labels {
            match self.validate(&index, label) {
                Ok(p) => planned.push(p),
                Err(e) => report.errors.push(e),
            }
        }

        let outcomes = self.dispatch_all(action, &planned);
        let kind = action.kind();

        for (p, outcome) in planned.iter().zip(outcomes) {
            let label = p.site.label.clone();
            match outcome {
                // Nothing was sent, so the last real status stays.
                None => {
                    report.failed.insert(label, CANCELLED.to_string());
                }
                Some(Ok(msg)) => {
                    self.record(&label, kind, Outcome::Success, &msg);
                    report.succeeded.insert(label, msg);
                }
                Some(Err(msg)) => {
                    self.record(&label, kind, Outcome::Error, &msg);
                    report.failed.insert(label, msg);
                }
            }
        }
        for e in report.errors.iter().filter(|e| e.is_configured()) {
            self.record(e.label(), kind, Outcome::Error, &e.to_string());
        }

        let code = if report.is_clean() { 0 } else { 1 };
        self.log
            .log(Channel::Distributor, code, &report.summary(kind));
        Ok(report)
    }

    fn validate<'a>(
        &self,
        index: &HashMap<&str, &'a SecondarySite>,
        label: &str,
    ) -> std::result::Result<Planned<'a>, TargetError> {
        let Some(site) = index.get(label).copied() else {
            return Err(TargetError::Unknown {
                label: label.to_string(),
            });
        };
        if site.url.trim().is_empty() {
            return Err(TargetError::MissingUrl {
                label: label.to_string(),
            });
        }
        let secret = self.secrets.decrypt(&site.secret);
        if secret.is_empty() {
            return Err(TargetError::MissingSecret {
                label: label.to_string(),
            });
        }
        Ok(Planned { site, secret })
    }

    /// `None` when cancelled before sending.
    fn dispatch_one(&self, action: &Action, p: &Planned<'_>) -> Option<DispatchOutcome> {
        if self.cancel.is_cancelled() {
            return None;
        }
        Some(self.client.send(p.site, &p.secret, action))
    }

    /// Outcomes in the same order as `planned`.
    fn dispatch_all(
        &self,
        action: &Action,
        planned: &[Planned<'_>],
    ) -> Vec<Option<DispatchOutcome>> {
        let threads = self
            .concurrency
            .min(num_cpus::get().max(1))
            .min(planned.len());
        if threads <= 1 {
            return planned.iter().map(|p| self.dispatch_one(action, p)).collect();
        }
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(|| {
                planned
                    .par_iter()
                    .map(|p| self.dispatch_one(action, p))
                    .collect()
            }),
            Err(e) => {
                tracing::warn!("dispatch pool unavailable, sending sequentially: {}", e);
                planned.iter().map(|p| self.dispatch_one(action, p)).collect()
            }
        }
    }

    fn record(&self, label: &str, kind: ActionKind, result: Outcome, message: &str) {
        if let Err(e) = self.state.record_status(label, kind, result, message) {
            tracing::warn!("cannot record status for {}: {}", label, e);
        }
    }
}
