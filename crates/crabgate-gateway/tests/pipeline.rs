//! End-to-end pipeline tests against a stub `clawd` shell script that
//! records every invocation.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crabgate_config::{store, ChannelChoice};
use crabgate_gateway::{Manager, SetupRequest};
use crabgate_schema::{Error, ProfileName, ProgressEvent};

struct Fixture {
    manager: Manager,
    home: tempfile::TempDir,
    call_log: PathBuf,
}

impl Fixture {
    /// `onboard_body` is the shell executed for `clawd onboard ...`;
    /// `service_body` for `clawd service <action> ...`. Every invocation is
    /// appended to the call log first.
    fn new(onboard_body: &str, service_body: &str) -> Self {
        let home = tempfile::TempDir::new().unwrap();
        let call_log = home.path().join("calls.log");
        let binary = home.path().join("clawd");
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> {log}\ncase \"$1\" in\n  onboard) {onboard_body} ;;\n  service) {service_body} ;;\nesac\n",
            log = call_log.display(),
        );
        std::fs::write(&binary, script).unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        Self {
            manager: Manager::new(home.path().to_path_buf(), binary),
            home,
            call_log,
        }
    }

    fn calls(&self) -> String {
        std::fs::read_to_string(&self.call_log).unwrap_or_default()
    }
}

fn setup_request(profile: &str) -> SetupRequest {
    SetupRequest {
        profile: ProfileName::parse(profile).unwrap(),
        api_key: Some("sk-ant-test".into()),
        model_id: "claude-sonnet-4-5-20250929".into(),
        channel: Some(ChannelChoice {
            kind: "telegram".into(),
            token: Some("123:abc".into()),
            allowlist: vec!["@op".into()],
        }),
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn setup_writes_config_and_starts_service() {
    let fx = Fixture::new("echo configuring\necho registering", "exit 0");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = fx
        .manager
        .run_setup(&setup_request("work"), &tx, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.port, 18789);

    let dir = store::profile_dir(fx.home.path(), &ProfileName::parse("work").unwrap());
    let config = store::read(&dir).unwrap().unwrap();
    assert_eq!(
        config.primary_model(),
        Some("anthropic/claude-sonnet-4-5-20250929")
    );
    assert!(config.channels["telegram"].enabled);
    assert_eq!(config.port(), Some(18789));

    let calls = fx.calls();
    assert!(calls.contains("onboard --install --no-prompt --port 18789 --profile work"));
    assert!(calls.contains("service install --profile work"));
    assert!(calls.contains("service start --profile work"));

    let events = drain(&mut rx);
    let mut last_percent = 0u8;
    for event in &events {
        if let ProgressEvent::Tick { percent, .. } = event {
            assert!(*percent >= last_percent, "progress went backwards");
            last_percent = *percent;
        }
    }
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Done { done: true, port: 18789, .. })
    ));
}

#[tokio::test]
async fn sequential_setups_receive_increasing_distinct_ports() {
    let fx = Fixture::new("echo ok", "exit 0");
    let cancel = CancellationToken::new();
    let (tx, _rx) = mpsc::unbounded_channel();

    let first = fx
        .manager
        .run_setup(&setup_request("default"), &tx, &cancel)
        .await
        .unwrap();
    let second = fx
        .manager
        .run_setup(&setup_request("work"), &tx, &cancel)
        .await
        .unwrap();
    let third = fx
        .manager
        .run_setup(&setup_request("play"), &tx, &cancel)
        .await
        .unwrap();

    assert_eq!(first.port, 18789);
    assert_eq!(second.port, 18790);
    assert_eq!(third.port, 18791);
}

#[tokio::test]
async fn rerunning_setup_keeps_the_existing_port() {
    let fx = Fixture::new("echo ok", "exit 0");
    let cancel = CancellationToken::new();
    let (tx, _rx) = mpsc::unbounded_channel();

    let first = fx
        .manager
        .run_setup(&setup_request("work"), &tx, &cancel)
        .await
        .unwrap();
    let again = fx
        .manager
        .run_setup(&setup_request("work"), &tx, &cancel)
        .await
        .unwrap();
    assert_eq!(first.port, again.port);
}

#[tokio::test]
async fn onboarding_failure_fails_the_pipeline_without_service_calls() {
    let fx = Fixture::new("echo halfway\nexit 9", "exit 0");
    let (tx, _rx) = mpsc::unbounded_channel();

    let err = fx
        .manager
        .run_setup(&setup_request("work"), &tx, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Subprocess { code: 9, .. }));
    assert!(!fx.calls().contains("service"));
}

#[tokio::test]
async fn service_failures_downgrade_to_warnings() {
    let fx = Fixture::new(
        "echo ok",
        "if [ \"$2\" = start ]; then exit 5; else exit 0; fi",
    );
    let (tx, mut rx) = mpsc::unbounded_channel();

    fx.manager
        .run_setup(&setup_request("work"), &tx, &CancellationToken::new())
        .await
        .unwrap();

    let events = drain(&mut rx);
    assert!(events.iter().any(|event| matches!(
        event,
        ProgressEvent::Tick { message, .. } if message.contains("Warning: gateway not started")
    )));
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Done { done: true, .. })
    ));
}

#[tokio::test]
async fn cancellation_kills_onboarding_and_never_starts_the_service() {
    let fx = Fixture::new("echo started\nsleep 30\necho never", "exit 0");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let manager = fx.manager.clone();
    let request = setup_request("work");
    let task_cancel = cancel.clone();
    let pipeline =
        tokio::spawn(async move { manager.run_setup(&request, &tx, &task_cancel).await });

    // Wait until onboarding output reaches us, then pull the plug.
    loop {
        match rx.recv().await {
            Some(ProgressEvent::Tick { message, .. }) if message == "started" => break,
            Some(_) => continue,
            None => panic!("pipeline ended before onboarding output"),
        }
    }
    cancel.cancel();

    let err = pipeline.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(!fx.calls().contains("service start"));
}

#[tokio::test]
async fn delete_removes_profile_and_frees_listing() {
    let fx = Fixture::new("echo ok", "exit 0");
    let cancel = CancellationToken::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    let name = ProfileName::parse("work").unwrap();

    fx.manager
        .run_setup(&setup_request("work"), &tx, &cancel)
        .await
        .unwrap();
    assert_eq!(fx.manager.list().len(), 1);

    fx.manager.delete(&name).await.unwrap();
    assert!(fx.manager.list().is_empty());
    assert!(matches!(
        fx.manager.info(&name).await,
        Err(Error::NotFound(_))
    ));
    assert!(fx.calls().contains("service uninstall --profile work"));
}

#[tokio::test]
async fn change_model_updates_primary_and_keeps_credentials() {
    let fx = Fixture::new("echo ok", "exit 0");
    let (tx, _rx) = mpsc::unbounded_channel();
    let name = ProfileName::parse("work").unwrap();

    fx.manager
        .run_setup(&setup_request("work"), &tx, &CancellationToken::new())
        .await
        .unwrap();
    fx.manager
        .change_model(&name, "claude-opus-4-1-20250805")
        .await
        .unwrap();

    let dir = store::profile_dir(fx.home.path(), &name);
    let config = store::read(&dir).unwrap().unwrap();
    assert_eq!(
        config.primary_model(),
        Some("anthropic/claude-opus-4-1-20250805")
    );
    let provider = &config.models.as_ref().unwrap().providers["anthropic"];
    assert_eq!(provider.models.len(), 1);
    assert_eq!(provider.api_key.as_deref(), Some("sk-ant-test"));
}
