use std::sync::Arc;

use httpmock::prelude::*;
use serde_json::json;
use ssgs::Error;
use ssgs::config::{Config, SecondarySite};
use ssgs::dispatch::{Coordinator, DispatchReport, TargetError};
use ssgs::journal::{Channel, MemoryLog};
use ssgs::secret::SecretBox;
use ssgs::state::{ActionKind, Outcome, StateStore};
use tempfile::{TempDir, tempdir};

const IMPORT: &str = "/wp-json/ssgs/v1/import";

struct Fixture {
    _dir: TempDir,
    state: StateStore,
    log: Arc<MemoryLog>,
    coordinator: Coordinator,
}

fn fixture(sites: &[(&str, String, &str)], concurrency: usize) -> Fixture {
    let dir = tempdir().unwrap();
    let secrets = SecretBox::from_passphrase("dispatch");
    let mut cfg = Config::default();
    cfg.site = "https://master.example.com".to_string();
    cfg.dispatch.timeout_secs = 5;
    cfg.dispatch.concurrency = concurrency;
    cfg.secondaries = sites
        .iter()
        .map(|(label, url, secret)| SecondarySite::new(label, url, &secrets.encrypt(secret)))
        .collect();

    let state = StateStore::new(dir.path().join("state.json"));
    let log = Arc::new(MemoryLog::new());
    let coordinator = Coordinator::new(&cfg, secrets, state.clone(), log.clone());
    Fixture {
        _dir: dir,
        state,
        log,
        coordinator,
    }
}

fn labels(xs: &[&str]) -> Vec<String> {
    xs.iter().map(|s| s.to_string()).collect()
}

#[test]
fn unknown_target_is_reported_without_any_request() {
    let server = MockServer::start();
    let any = server.mock(|when, then| {
        when.any_request();
        then.status(200);
    });
    let f = fixture(&[("eu", server.base_url(), "s-eu")], 1);

    let report = f.coordinator.trigger_import(&labels(&["x"])).unwrap();
    assert_eq!(
        report,
        DispatchReport {
            errors: vec![TargetError::Unknown { label: "x".into() }],
            ..Default::default()
        }
    );
    any.assert_hits(0);
    assert!(f.state.load().unwrap().secondary_status.is_empty());
}

#[test]
fn outcomes_are_partitioned_per_target() {
    let a = MockServer::start();
    let b = MockServer::start();
    let ok = a.mock(|when, then| {
        when.method(POST).path(IMPORT).header("x-ssgs-secret", "s-a");
        then.status(200)
            .json_body(json!({ "status": "success", "message": "Imported." }));
    });
    let boom = b.mock(|when, then| {
        when.method(POST).path(IMPORT);
        then.status(500)
            .json_body(json!({ "status": "error", "message": "boom" }));
    });
    let f = fixture(&[("a", a.base_url(), "s-a"), ("b", b.base_url(), "s-b")], 1);

    let report = f
        .coordinator
        .trigger_import(&labels(&["a", "b", "c"]))
        .unwrap();
    ok.assert();
    boom.assert();

    assert_eq!(report.succeeded.get("a").map(String::as_str), Some("Imported."));
    assert_eq!(report.failed.get("b").map(String::as_str), Some("boom"));
    assert_eq!(report.error_messages(), vec!["Unknown secondary site: c"]);
    assert_eq!(
        report.summary(ActionKind::Import),
        "Failed: b. Unknown secondary site: c Triggered on: a."
    );

    let st = f.state.load().unwrap();
    assert_eq!(st.secondary_status["a"].result, Outcome::Success);
    assert_eq!(st.secondary_status["a"].action, ActionKind::Import);
    assert_eq!(st.secondary_status["b"].result, Outcome::Error);
    assert_eq!(st.secondary_status["b"].message, "boom");
    assert!(!st.secondary_status.contains_key("c"));
}

#[test]
fn success_status_with_error_payload_is_a_failure() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/wp-json/ssgs/v1/clear-cache");
        then.status(200)
            .json_body(json!({ "status": "error", "message": "Slider missing." }));
    });
    let f = fixture(&[("eu", server.base_url(), "s")], 1);

    let report = f.coordinator.clear_cache(&labels(&["eu"])).unwrap();
    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed["eu"], "Slider missing.");
}

#[test]
fn bodies_without_message_get_defaults() {
    let ok = MockServer::start();
    let bad = MockServer::start();
    ok.mock(|when, then| {
        when.method(POST).path(IMPORT);
        then.status(204);
    });
    bad.mock(|when, then| {
        when.method(POST).path(IMPORT);
        then.status(502);
    });
    let f = fixture(&[("ok", ok.base_url(), "s"), ("bad", bad.base_url(), "s")], 1);

    let report = f.coordinator.trigger_import(&labels(&["ok", "bad"])).unwrap();
    assert_eq!(report.succeeded["ok"], "Import completed.");
    assert_eq!(report.failed["bad"], "Unexpected response from bad (HTTP 502).");
}

#[test]
fn token_payload_reaches_the_secondary() {
    let server = MockServer::start();
    let m = server.mock(|when, then| {
        when.method(POST)
            .path("/wp-json/ssgs/v1/token")
            .header("x-ssgs-secret", "shared")
            .json_body_partial(
                r#"{"source":"https://master.example.com","token":"ghp_1","username":"bot"}"#,
            );
        then.status(200).json_body(json!({
            "status": "success",
            "message": "Token stored and importer completed.",
            "import": "completed"
        }));
    });
    let f = fixture(&[("eu", server.base_url(), "shared")], 1);

    let report = f
        .coordinator
        .push_token(" ghp_1 ", Some("bot"), &labels(&["eu"]))
        .unwrap();
    m.assert();
    assert_eq!(report.summary(ActionKind::Token), "Token delivered to 1 site.");
    assert_eq!(
        f.state.load().unwrap().secondary_status["eu"].action,
        ActionKind::Token
    );
}

#[test]
fn input_validation_happens_before_dispatch() {
    let f = fixture(&[], 1);
    assert!(matches!(
        f.coordinator.push_token("", None, &labels(&["eu"])),
        Err(Error::EmptyToken)
    ));
    assert!(matches!(
        f.coordinator.trigger_import(&labels(&["", "  "])),
        Err(Error::EmptyTargetSet)
    ));
    assert!(f.log.entries().is_empty());
}

#[test]
fn stale_statuses_are_pruned() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(IMPORT);
        then.status(200);
    });
    let f = fixture(&[("eu", server.base_url(), "s")], 1);
    f.state
        .record_status("retired", ActionKind::Import, Outcome::Success, "old")
        .unwrap();

    f.coordinator.trigger_import(&labels(&["eu"])).unwrap();
    let st = f.state.load().unwrap();
    assert!(st.secondary_status.contains_key("eu"));
    assert!(!st.secondary_status.contains_key("retired"));
}

#[test]
fn concurrent_dispatch_keeps_every_result() {
    let servers: Vec<MockServer> = (0..4).map(|_| MockServer::start()).collect();
    let mocks: Vec<_> = servers
        .iter()
        .map(|s| {
            s.mock(|when, then| {
                when.method(POST).path(IMPORT);
                then.status(200).json_body(json!({ "status": "success" }));
            })
        })
        .collect();
    let sites: Vec<(&str, String, &str)> = ["s0", "s1", "s2", "s3"]
        .iter()
        .zip(&servers)
        .map(|(label, s)| (*label, s.base_url(), "k"))
        .collect();
    let f = fixture(&sites, 4);

    let report = f
        .coordinator
        .trigger_import(&labels(&["s0", "s1", "s2", "s3"]))
        .unwrap();
    for m in &mocks {
        m.assert();
    }
    assert_eq!(report.succeeded.len(), 4);
    assert!(report.is_clean());
    assert_eq!(
        f.log
            .matching(Channel::Distributor, "Import triggered on 4 sites.")
            .len(),
        1
    );
}
