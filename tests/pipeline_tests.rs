//! End-to-end runs against replayed scanner output and an on-disk database.

use async_trait::async_trait;
use portwatch::config::{Settings, SmtpSecurity, SmtpSettings};
use portwatch::error::NotifyError;
use portwatch::notify::{Notifier, SmtpNotifier};
use portwatch::scanner::{DriverOptions, ReplayEngine, ScanDriver, ScanStrategy};
use portwatch::storage::{RecordStore, ScanStore};
use portwatch::types::{Port, RecordKey};
use portwatch::{DiffResult, Pipeline, ScanRecord, Scheduler, TargetSpec};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn host(ip: &str, ports: &[(u16, &str, &str)]) -> String {
    let entries: Vec<String> = ports
        .iter()
        .map(|(port, status, banner)| {
            let service = if banner.is_empty() {
                String::new()
            } else {
                format!(r#","service":{{"name":"x","banner":"{}"}}"#, banner)
            };
            format!(
                r#"{{"port":{},"proto":"tcp","status":"{}","reason":"syn-ack","ttl":64{}}}"#,
                port, status, service
            )
        })
        .collect();
    format!(
        r#"{{"ip":"{}","timestamp":"1700000000","ports":[{}]}}"#,
        ip,
        entries.join(",")
    )
}

fn scan_output(hosts: &[String]) -> String {
    format!("[\n{}\n]\n", hosts.join(",\n"))
}

fn key(ip: &str, port: u16) -> RecordKey {
    RecordKey {
        host: ip.to_string(),
        port: Port::new(port).unwrap(),
        protocol: "tcp".to_string(),
    }
}

fn targets(specs: &[&str]) -> Vec<TargetSpec> {
    specs.iter().map(|s| TargetSpec::parse(s).unwrap()).collect()
}

async fn run_with(db: &Path, output: String, specs: &[&str]) -> portwatch::RunSummary {
    let store = ScanStore::open(db).await.unwrap();
    let driver = ScanDriver::new(Arc::new(ReplayEngine::new(output)));
    let pipeline = Pipeline::new(Arc::new(store.clone()), driver, targets(specs));
    let summary = pipeline.run_once(&CancellationToken::new()).await.unwrap();
    store.close().await;
    summary
}

#[tokio::test]
async fn test_state_carries_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("portwatch.db");

    let first = run_with(
        &db,
        scan_output(&[
            host("10.0.0.1", &[(22, "open", ""), (80, "open", "")]),
            host("10.0.0.2", &[(443, "open", "")]),
        ]),
        &["10.0.0.0/29"],
    )
    .await;
    assert_eq!((first.new, first.changed, first.closed), (3, 0, 0));

    // 22 gains a banner, 443 disappears, 8080 appears.
    let second = run_with(
        &db,
        scan_output(&[host(
            "10.0.0.1",
            &[(22, "open", "SSH-2.0-OpenSSH_9.6"), (80, "open", ""), (8080, "open", "")],
        )]),
        &["10.0.0.0/29"],
    )
    .await;
    assert_eq!((second.new, second.changed, second.closed), (1, 1, 1));
    assert_eq!(second.persisted, Some(3));

    // Closed ports stay in the store; only the diff reports them.
    let store = ScanStore::open(&db).await.unwrap();
    let snapshot = store.load_all().await.unwrap();
    assert_eq!(snapshot.len(), 4);
    assert_eq!(
        snapshot.get(&key("10.0.0.1", 22)).unwrap().banner,
        "SSH-2.0-OpenSSH_9.6"
    );
}

#[tokio::test]
async fn test_empty_banner_never_erases_stored_banner() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("portwatch.db");

    run_with(&db, scan_output(&[host("10.0.0.5", &[(25, "open", "ESMTP Postfix")])]), &["10.0.0.5"]).await;
    let quiet = run_with(&db, scan_output(&[host("10.0.0.5", &[(25, "open", "")])]), &["10.0.0.5"]).await;
    assert!(!quiet.has_changes());

    let store = ScanStore::open(&db).await.unwrap();
    let snapshot = store.load_all().await.unwrap();
    let record = snapshot.get(&key("10.0.0.5", 25)).unwrap();
    assert_eq!(record.banner, "ESMTP Postfix");
    assert!(record.first_seen <= record.last_seen);
}

#[tokio::test]
async fn test_malformed_host_does_not_hide_others() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("portwatch.db");
    let output = format!(
        "[\n{},\n{{\"ip\": 17, \"ports\": \"broken\"}},\n{}\n]\n",
        host("10.0.0.1", &[(22, "open", "")]),
        host("10.0.0.3", &[(3306, "open", ""), (3307, "closed", "")])
    );

    let summary = run_with(&db, output, &["10.0.0.0/30"]).await;
    assert_eq!(summary.open_ports, 2);
    assert_eq!(summary.new, 2);
}

#[tokio::test]
async fn test_per_target_fan_out_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let store = ScanStore::open(&dir.path().join("portwatch.db")).await.unwrap();

    let engine = ReplayEngine::new("[]")
        .with_target_output("10.0.0.1", scan_output(&[host("10.0.0.1", &[(22, "open", "")])]))
        .with_target_output("10.0.0.2", scan_output(&[host("10.0.0.2", &[(80, "open", "")])]))
        .with_failing_target("10.0.0.3");
    let driver = ScanDriver::new(Arc::new(engine.clone())).with_options(DriverOptions {
        strategy: ScanStrategy::PerTarget { max_parallel: 2 },
        ..DriverOptions::default()
    });
    let pipeline = Pipeline::new(
        Arc::new(store.clone()),
        driver,
        targets(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]),
    );

    let summary = pipeline.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.new, 2);
    assert_eq!(engine.launches().len(), 3);
    assert!(engine.launches().iter().all(|batch| batch.len() == 1));
    assert_eq!(store.load_all().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_replay_file_and_config_driven_driver() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("scan.json");
    let mut file = std::fs::File::create(&capture).unwrap();
    file.write_all(scan_output(&[host("192.168.1.20", &[(9100, "open", "")])]).as_bytes())
        .unwrap();

    let settings = Settings::from_toml(
        &format!(
            "targets = [\"192.168.1.0/24\"]\n[database]\npath = \"{}\"\n",
            dir.path().join("state.db").display()
        ),
        Path::new("test.toml"),
    )
    .unwrap();

    let store = ScanStore::open(&settings.database_path().unwrap()).await.unwrap();
    let driver = ScanDriver::new(Arc::new(ReplayEngine::from_file(&capture).unwrap()))
        .with_options(settings.masscan.driver_options());
    let pipeline = Pipeline::new(Arc::new(store.clone()), driver, settings.targets.clone());

    let summary = pipeline.run_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.new, 1);
    assert!(store
        .load_all()
        .await
        .unwrap()
        .contains_key(&key("192.168.1.20", 9100)));
}

#[tokio::test]
async fn test_scheduled_pipeline_repeats_until_cancelled() {
    let store = Arc::new(ScanStore::in_memory().await.unwrap());
    let driver = ScanDriver::new(Arc::new(ReplayEngine::new(scan_output(&[host(
        "10.0.0.1",
        &[(22, "open", "")],
    )]))));
    let pipeline = Pipeline::new(store.clone(), driver, targets(&["10.0.0.1"]));
    let scheduler = Scheduler::new(Duration::from_millis(50), pipeline);
    let cancel = CancellationToken::new();

    let stopper = {
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(180)).await;
            cancel.cancel();
        }
    };

    let (report, _) = tokio::join!(scheduler.run(&cancel), stopper);

    assert!(report.runs >= 2, "runs = {}", report.runs);
    assert_eq!(report.failures, 0);
    assert_eq!(store.load_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_scheduled_failures_are_counted() {
    let store = Arc::new(ScanStore::in_memory().await.unwrap());
    let driver = ScanDriver::new(Arc::new(ReplayEngine::new("[]")));
    let pipeline = Pipeline::new(store, driver, Vec::new());
    let scheduler = Scheduler::new(Duration::from_millis(20), pipeline);
    let cancel = CancellationToken::new();

    let stopper = {
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(70)).await;
            cancel.cancel();
        }
    };

    let (report, _) = tokio::join!(scheduler.run(&cancel), stopper);
    assert!(report.runs >= 2);
    assert_eq!(report.failures, report.runs);
}

#[derive(Clone, Default)]
struct CountingNotifier {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Notifier for CountingNotifier {
    fn name(&self) -> &str {
        "counting"
    }

    async fn notify(&self, _diff: &DiffResult, _fresh: &[ScanRecord]) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_unreachable_mail_relay_does_not_block_other_notifiers() {
    // Reserve a port, then close it so the relay refuses connections.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mail = SmtpNotifier::from_settings(&SmtpSettings {
        enabled: true,
        host: "127.0.0.1".to_string(),
        port,
        security: SmtpSecurity::None,
        from: "portwatch@example.com".to_string(),
        to: vec!["ops@example.com".to_string()],
        ..SmtpSettings::default()
    })
    .unwrap()
    .unwrap();
    let counting = CountingNotifier::default();

    let store = Arc::new(ScanStore::in_memory().await.unwrap());
    let output = scan_output(&[host("10.0.0.1", &[(22, "open", "")])]);
    let driver = ScanDriver::new(Arc::new(ReplayEngine::new(output)));
    let pipeline = Pipeline::new(store, driver, targets(&["10.0.0.1"]))
        .with_notifier(Box::new(mail))
        .with_notifier(Box::new(counting.clone()));

    let summary = pipeline.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.new, 1);
    assert_eq!(summary.notified, 1);
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
}
