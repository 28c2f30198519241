use chrono::{SecondsFormat, Utc};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Value, json};
use std::time::Duration;

use crate::config::SecondarySite;
use crate::journal::{Channel, SharedLog};
use crate::state::ActionKind;

/// Header carrying the shared secret on every dispatch.
pub const SECRET_HEADER: &str = "X-SSGS-Secret";

/// Path prefix of the receiver endpoints on a secondary site.
pub const NAMESPACE: &str = "wp-json/ssgs/v1";

/// What to ask a secondary site to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Token {
        token: String,
        username: Option<String>,
    },
    Import,
    ClearCache,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Token { .. } => ActionKind::Token,
            Action::Import => ActionKind::Import,
            Action::ClearCache => ActionKind::Cache,
        }
    }

    pub fn endpoint_name(&self) -> &'static str {
        match self {
            Action::Token { .. } => "token",
            Action::Import => "import",
            Action::ClearCache => "clear-cache",
        }
    }

    fn default_success(&self) -> &'static str {
        match self {
            Action::Token { .. } => "Token delivered.",
            Action::Import => "Import completed.",
            Action::ClearCache => "Cache cleared.",
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Action::Token { .. } => "Token push",
            Action::Import => "Import trigger",
            Action::ClearCache => "Cache clear",
        }
    }
}

/// Result of one dispatch: the message to show on success or failure.
pub type DispatchOutcome = std::result::Result<String, String>;

/// Full endpoint URL for `action` on a site whose base URL is `base`.
/// A bare host gets `https://`. Returns `None` for a blank base.
pub fn endpoint_url(base: &str, action: &Action) -> Option<String> {
    let base = base.trim();
    if base.is_empty() {
        return None;
    }
    let mut url = if base.contains("://") {
        base.to_string()
    } else {
        format!("https://{base}")
    };
    if !url.ends_with('/') {
        url.push('/');
    }
    Some(format!("{url}{NAMESPACE}/{}", action.endpoint_name()))
}

/// Sends one authenticated POST per target.
pub struct DispatchClient {
    site: String,
    timeout: Duration,
    log: SharedLog,
}

impl DispatchClient {
    /// `site` identifies this master in every payload's `source` field.
    pub fn new(site: impl Into<String>, timeout: Duration, log: SharedLog) -> Self {
        Self {
            site: site.into(),
            timeout,
            log,
        }
    }

    fn http(&self, verify_tls: bool) -> reqwest::Result<Client> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("ssgs/", env!("CARGO_PKG_VERSION"))),
        );
        Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .build()
    }

    pub fn payload(&self, action: &Action) -> Value {
        let mut body = json!({
            "source": self.site,
            "dispatchedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false),
        });
        if let Action::Token { token, username } = action {
            body["token"] = json!(token);
            if let Some(user) = username.as_deref().filter(|u| !u.trim().is_empty()) {
                body["username"] = json!(user.trim());
            }
        }
        body
    }

    /// POST `action` to `target` with the plaintext `secret`.
    ///
    /// Success needs a 2xx status and a body whose `status` is not
    /// `"error"`. Transport errors never escape: they become the failure
    /// message.
    pub fn send(&self, target: &SecondarySite, secret: &str, action: &Action) -> DispatchOutcome {
        let label = target.label.as_str();
        let Some(url) = endpoint_url(&target.url, action) else {
            return Err(format!("Missing URL for {label}."));
        };

        let result = self.http(target.verify_tls).and_then(|client| {
            client
                .post(&url)
                .header(SECRET_HEADER, secret)
                .json(&self.payload(action))
                .send()
        });
        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                let msg = format!("Error contacting {label}: {e}");
                self.log.log(Channel::Distributor, 1, &msg);
                return Err(msg);
            }
        };

        let code = resp.status();
        let body = resp.text().unwrap_or_default();
        let data: Option<Value> = serde_json::from_str::<Value>(&body)
            .ok()
            .filter(Value::is_object);
        let field = |key: &str| {
            data.as_ref()
                .and_then(|d| d.get(key))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let message = field("message");
        let status = field("status");

        if code.is_success() {
            if status.as_deref() == Some("error") {
                let msg = message.unwrap_or_else(|| "Remote site reported an error.".to_string());
                self.log.log(
                    Channel::Distributor,
                    1,
                    &format!("{} to {label} rejected: {msg}", action.describe()),
                );
                return Err(msg);
            }
            self.log.log(
                Channel::Distributor,
                0,
                &format!(
                    "{} sent to {label} ({url}). Status: {}",
                    action.describe(),
                    code.as_u16()
                ),
            );
            return Ok(message.unwrap_or_else(|| action.default_success().to_string()));
        }

        let msg = message
            .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
            .unwrap_or_else(|| {
                format!("Unexpected response from {label} (HTTP {}).", code.as_u16())
            });
        self.log.log(
            Channel::Distributor,
            1,
            &format!(
                "Unexpected response from {label} (HTTP {}). {msg}",
                code.as_u16()
            ),
        );
        Err(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::MemoryLog;
    use std::sync::Arc;

    #[test]
    fn endpoint_adds_scheme_and_namespace() {
        assert_eq!(
            endpoint_url("eu.example.com", &Action::Import).as_deref(),
            Some("https://eu.example.com/wp-json/ssgs/v1/import")
        );
        assert_eq!(
            endpoint_url("http://127.0.0.1:8080/", &Action::ClearCache).as_deref(),
            Some("http://127.0.0.1:8080/wp-json/ssgs/v1/clear-cache")
        );
        assert_eq!(endpoint_url("  ", &Action::Import), None);
    }

    #[test]
    fn token_payload_carries_credentials() {
        let client = DispatchClient::new(
            "https://master.example.com",
            Duration::from_secs(1),
            Arc::new(MemoryLog::new()),
        );
        let body = client.payload(&Action::Token {
            token: "ghp_x".into(),
            username: Some(" bot ".into()),
        });
        assert_eq!(body["source"], "https://master.example.com");
        assert_eq!(body["token"], "ghp_x");
        assert_eq!(body["username"], "bot");
        assert!(body["dispatchedAt"].is_string());

        let body = client.payload(&Action::Import);
        assert!(body.get("token").is_none());
    }

    #[test]
    fn unreachable_site_is_a_failure_not_an_error() {
        let log = Arc::new(MemoryLog::new());
        let client = DispatchClient::new("m", Duration::from_millis(500), log.clone());
        let site = SecondarySite::new("eu", "http://127.0.0.1:9", "s");
        let out = client.send(&site, "s", &Action::Import);
        let msg = out.unwrap_err();
        assert!(msg.starts_with("Error contacting eu: "), "{msg}");
        assert_eq!(log.matching(Channel::Distributor, "Error contacting eu").len(), 1);
    }
}
