//! Inbound side of dispatch: what a secondary site does when the master
//! calls one of its endpoints.
//!
//! Handlers are transport-agnostic. They take the secret header and the
//! decoded JSON body and return a [`Response`]; the binary exposes them
//! through `ssgs receive`.

use serde_json::{Value, json};
use std::path::PathBuf;
use std::str::FromStr;
use subtle::ConstantTimeEq;

use crate::artifact::ArtifactImporter;
use crate::config::save_config;
use crate::journal::Channel;
use crate::sync::{ImportReconciler, SyncContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Token,
    Import,
    ClearCache,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Endpoint::Token => "token",
            Endpoint::Import => "import",
            Endpoint::ClearCache => "clear-cache",
        }
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().trim_matches('/') {
            "token" => Ok(Endpoint::Token),
            "import" => Ok(Endpoint::Import),
            "clear-cache" => Ok(Endpoint::ClearCache),
            other => Err(format!("unknown endpoint: {other}")),
        }
    }
}

/// HTTP status plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub http: u16,
    pub body: Value,
}

impl Response {
    fn new(http: u16, body: Value) -> Self {
        Self { http, body }
    }

    fn rejected(http: u16, code: &str, message: &str) -> Self {
        Self::new(
            http,
            json!({ "status": "error", "code": code, "message": message }),
        )
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.http)
    }

    /// `{"http": <code>, "body": {...}}`
    pub fn to_json(&self) -> Value {
        json!({ "http": self.http, "body": self.body })
    }
}

/// Gate in front of every endpoint. `configured` is the decrypted local
/// secret; an empty one means the endpoints are closed.
pub fn authorize(configured: &str, provided: Option<&str>) -> std::result::Result<(), Response> {
    if configured.is_empty() {
        return Err(Response::rejected(
            403,
            "ssgs_rest_unconfigured",
            "Remote secret not configured.",
        ));
    }
    let provided = provided.unwrap_or_default();
    if provided.is_empty() {
        return Err(Response::rejected(
            401,
            "ssgs_rest_missing_header",
            "Missing authentication header.",
        ));
    }
    if !bool::from(configured.as_bytes().ct_eq(provided.as_bytes())) {
        return Err(Response::rejected(
            403,
            "ssgs_rest_forbidden",
            "Invalid authentication secret.",
        ));
    }
    Ok(())
}

pub struct Receiver<'a> {
    config_path: PathBuf,
    ctx: SyncContext,
    importer: &'a dyn ArtifactImporter,
}

impl<'a> Receiver<'a> {
    /// `config_path` is where a delivered token gets persisted.
    pub fn new(
        config_path: impl Into<PathBuf>,
        ctx: SyncContext,
        importer: &'a dyn ArtifactImporter,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            ctx,
            importer,
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn handle(&mut self, endpoint: Endpoint, secret: Option<&str>, body: &Value) -> Response {
        let configured = self.ctx.secrets.decrypt(&self.ctx.config.receiver.secret);
        if let Err(resp) = authorize(&configured, secret) {
            self.ctx.log.log(
                Channel::Rest,
                1,
                &format!(
                    "Rejected /{} request (HTTP {}).",
                    endpoint.as_str(),
                    resp.http
                ),
            );
            return resp;
        }
        match endpoint {
            Endpoint::Token => self.update_token(body),
            Endpoint::Import => self.run_import(),
            Endpoint::ClearCache => self.clear_cache(),
        }
    }

    fn store_token(&mut self, token: &str, username: &str) -> anyhow::Result<()> {
        self.ctx.config.repository.auth.token = self.ctx.secrets.encrypt(token);
        if !username.is_empty() {
            self.ctx.config.repository.auth.username = username.to_string();
        }
        save_config(&self.config_path, &self.ctx.config)
    }

    fn update_token(&mut self, body: &Value) -> Response {
        let field = |key: &str| {
            body.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default()
                .to_string()
        };
        let token = field("token");
        if token.is_empty() {
            return Response::rejected(400, "ssgs_rest_bad_request", "Token payload required.");
        }
        let username = field("username");

        if let Err(e) = self.store_token(&token, &username) {
            self.ctx
                .log
                .log(Channel::Rest, 1, &format!("Storing token failed: {e:#}"));
            return Response::new(
                500,
                json!({ "status": "error", "message": format!("Token could not be stored: {e:#}") }),
            );
        }

        let import = match ImportReconciler::new(&self.ctx, self.importer).pull_and_import_all() {
            Ok(_) => "completed",
            Err(e) => {
                self.ctx.log.log(
                    Channel::Rest,
                    1,
                    &format!("Importer run after token update failed: {e}"),
                );
                "failed"
            }
        };
        self.ctx.log.log(
            Channel::Rest,
            0,
            &format!("Token updated via REST. Import status: {import}."),
        );

        if import == "failed" {
            return Response::new(
                500,
                json!({
                    "status": "error",
                    "message": "Token stored, but the importer failed. Check logs on this site.",
                    "import": import,
                }),
            );
        }
        Response::new(
            200,
            json!({
                "status": "success",
                "message": "Token stored and importer completed.",
                "import": import,
            }),
        )
    }

    fn run_import(&self) -> Response {
        match ImportReconciler::new(&self.ctx, self.importer).pull_and_import_all() {
            Ok(_) => {
                self.ctx
                    .log
                    .log(Channel::Rest, 0, "Remote import triggered via REST.");
                Response::new(200, json!({ "status": "success", "message": "Import completed." }))
            }
            Err(e) => {
                self.ctx
                    .log
                    .log(Channel::Rest, 1, &format!("Remote import failed: {e}"));
                Response::new(
                    500,
                    json!({ "status": "error", "message": format!("Remote import failed: {e}") }),
                )
            }
        }
    }

    /// Cached id for `slug`, else the backend's alias lookup (which is then
    /// cached).
    fn locate(&self, slug: &str) -> Option<u64> {
        if let Ok(Some(id)) = self.ctx.state.artifact_id(slug) {
            return Some(id);
        }
        match self.importer.resolve_id(slug) {
            Ok(Some(id)) => {
                if let Err(e) = self.ctx.state.set_artifact_id(slug, id) {
                    tracing::warn!("cannot cache id for {}: {}", slug, e);
                }
                Some(id)
            }
            Ok(None) => None,
            Err(e) => {
                self.ctx.log.log(
                    Channel::Rest,
                    1,
                    &format!("Failed to resolve project id for {slug}: {e}"),
                );
                None
            }
        }
    }

    fn clear_cache(&self) -> Response {
        let artifacts = &self.ctx.config.artifacts;
        if artifacts.is_empty() {
            return Response::new(
                200,
                json!({
                    "status": "success",
                    "message": "No projects configured. Nothing to clear.",
                    "cleared": [],
                }),
            );
        }

        let mut cleared: Vec<String> = Vec::new();
        let mut failed = serde_json::Map::new();
        for slug in artifacts.slugs() {
            let Some(id) = self.locate(slug) else {
                failed.insert(
                    slug.to_string(),
                    json!("Unable to locate project on the secondary site."),
                );
                continue;
            };
            match self.importer.clear_cache(id) {
                Ok(()) => cleared.push(slug.to_string()),
                Err(e) => {
                    self.ctx
                        .log
                        .log(Channel::Rest, 1, &format!("Cache clear failed for {slug}: {e}"));
                    failed.insert(slug.to_string(), json!(e.to_string()));
                }
            }
        }

        if !failed.is_empty() {
            let labels: Vec<&str> = failed.keys().map(String::as_str).collect();
            let mut message = format!("Cache clear failed for: {}.", labels.join(", "));
            if !cleared.is_empty() {
                message.push_str(&format!(" Cleared for: {}.", cleared.join(", ")));
            }
            return Response::new(
                500,
                json!({
                    "status": "error",
                    "message": message,
                    "cleared": cleared,
                    "failed": failed,
                }),
            );
        }

        self.ctx.log.log(
            Channel::Rest,
            0,
            &format!("Cache cleared remotely for projects: {}", cleared.join(", ")),
        );
        Response::new(
            200,
            json!({
                "status": "success",
                "message": "Cache cleared on the secondary site.",
                "cleared": cleared,
            }),
        )
    }
}
