use assert_cmd::Command;
use diversion_sync_core::changelog::{write_changelog, ChangelogEntry, ChangelogRecord};
use predicates::prelude::*;
use std::fs::write;
use tempfile::{tempdir, NamedTempFile};

fn config_with(yaml: &[u8]) -> NamedTempFile {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(config.path(), yaml).expect("Writing temp config failed");
    config
}

#[test]
fn help_lists_every_command() {
    let mut cmd = Command::cargo_bin("diversion-sync").expect("Binary exists");
    cmd.arg("--help");
    cmd.assert().success().stdout(
        predicate::str::contains("checkout")
            .and(predicate::str::contains("poll"))
            .and(predicate::str::contains("changelog"))
            .and(predicate::str::contains("resolve-script"))
            .and(predicate::str::contains("ls"))
            .and(predicate::str::contains("state"))
            .and(predicate::str::contains("head"))
            .and(predicate::str::contains("branches"))
            .and(predicate::str::contains("tags")),
    );
}

#[test]
fn changelog_command_prints_recorded_commits() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("changelog0.json");
    let record = ChangelogRecord {
        entries: vec![ChangelogEntry {
            commit_id: "dv.commit.12".into(),
            message: "Bump shared library\n\nlonger body".into(),
            author_name: "ana".into(),
            timestamp: 1_700_000_000,
            changed_paths: vec!["vars/deploy.groovy".into()],
        }],
    };
    write_changelog(&file, &record).unwrap();

    let mut cmd = Command::cargo_bin("diversion-sync").expect("Binary exists");
    cmd.arg("changelog").arg("--file").arg(&file);
    cmd.assert().success().stdout(
        predicate::str::contains("dv.commit.12")
            .and(predicate::str::contains("Bump shared library"))
            .and(predicate::str::contains("vars/deploy.groovy"))
            .and(predicate::str::contains("longer body").not()),
    );
}

#[test]
fn changelog_command_distinguishes_empty_from_missing() {
    let dir = tempdir().unwrap();
    let empty = dir.path().join("empty.json");
    write_changelog(&empty, &ChangelogRecord::empty()).unwrap();

    Command::cargo_bin("diversion-sync")
        .expect("Binary exists")
        .arg("changelog")
        .arg("--file")
        .arg(&empty)
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes"));

    Command::cargo_bin("diversion-sync")
        .expect("Binary exists")
        .arg("changelog")
        .arg("--file")
        .arg(dir.path().join("missing.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("No changelog recorded"));
}

#[test]
fn checkout_rejects_config_without_sources() {
    let config = config_with(b"sources: []\n");
    let workspace = tempdir().unwrap();

    let mut cmd = Command::cargo_bin("diversion-sync").expect("Binary exists");
    cmd.arg("checkout")
        .arg("--config")
        .arg(config.path())
        .arg("--workspace")
        .arg(workspace.path())
        .env("DIVERSION_ACCESS_TOKEN", "unused");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("at least one source"));
}

#[test]
fn checkout_rejects_two_sources_inferred_as_primary() {
    let config = config_with(
        b"sources:\n  - repository_id: dv.repo.app\n  - repository_id: dv.repo.lib\n",
    );
    let workspace = tempdir().unwrap();

    let mut cmd = Command::cargo_bin("diversion-sync").expect("Binary exists");
    cmd.arg("checkout")
        .arg("--config")
        .arg(config.path())
        .arg("--workspace")
        .arg(workspace.path().join("app"))
        .env("DIVERSION_ACCESS_TOKEN", "unused");
    cmd.assert().failure().stderr(
        predicate::str::contains("at most one primary source")
            .and(predicate::str::contains("role: auxiliary")),
    );
}

#[test]
fn remote_commands_require_access_token() {
    let config = config_with(b"sources:\n  - role: primary\n    repository_id: dv.repo.1\n");
    let dir = tempdir().unwrap();

    let mut cmd = Command::cargo_bin("diversion-sync").expect("Binary exists");
    cmd.current_dir(dir.path())
        .arg("state")
        .arg("--config")
        .arg(config.path())
        .env_remove("DIVERSION_ACCESS_TOKEN");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("DIVERSION_ACCESS_TOKEN"));
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use diversion_sync::cli::{run, Cli, Commands};

    let cli = Cli {
        command: Commands::Changelog {
            file: std::path::PathBuf::from("does-not-exist.json"),
        },
    };

    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
