use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn seed_dataset(path: &Path) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE queries (query_id TEXT PRIMARY KEY, text TEXT);
         CREATE TABLE docs (doc_id TEXT PRIMARY KEY, text TEXT);
         CREATE TABLE qrels (query_id TEXT, doc_id TEXT, relevance INTEGER,
                             PRIMARY KEY (query_id, doc_id));
         INSERT INTO queries VALUES ('q1', 'what is rust'), ('q2', 'what is sqlite');
         INSERT INTO docs VALUES ('d1', 'a language'), ('d2', 'a database'), ('d3', 'a bird');
         INSERT INTO qrels VALUES ('q1', 'd1', 1), ('q1', 'd3', 0), ('q2', 'd2', 1), ('q2', 'd3', 0);",
    )
    .unwrap();
}

fn relbench(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("relbench").unwrap();
    cmd.current_dir(dir.path()).env_remove("RUST_LOG");
    cmd
}

fn count(db: &Path, sql: &str) -> i64 {
    let conn = rusqlite::Connection::open(db).unwrap();
    conn.query_row(sql, [], |r| r.get(0)).unwrap()
}

#[test]
fn run_with_fake_provider_records_a_finished_run() {
    let dir = TempDir::new().unwrap();
    seed_dataset(&dir.path().join("qrels.db"));
    fs::write(
        dir.path().join("relbench.yaml"),
        "provider: fake\nmodel: scripted\ndata_db: qrels.db\naudit_db: out/audit.db\ncommit_every: 2\n",
    )
    .unwrap();

    relbench(&dir)
        .args(["run", "--summary-json", "out/summary.json"])
        .assert()
        .success()
        .stderr(contains("Results: items=4 valid=4"));

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("out/summary.json")).unwrap())
            .unwrap();
    assert_eq!(summary["items"], 4);
    assert_eq!(summary["correct"], 2);
    assert_eq!(summary["invalid_pct"], 0.0);

    let audit = dir.path().join("out/audit.db");
    assert_eq!(count(&audit, "SELECT COUNT(*) FROM runs WHERE finished = 1"), 1);
    assert_eq!(count(&audit, "SELECT COUNT(*) FROM predictions"), 4);
    assert_eq!(count(&audit, "SELECT COUNT(*) FROM predictions WHERE is_correct = 1"), 2);
}

#[test]
fn official_subset_exits_with_config_error_and_creates_no_run() {
    let dir = TempDir::new().unwrap();
    seed_dataset(&dir.path().join("qrels.db"));
    fs::write(
        dir.path().join("relbench.yaml"),
        "provider: fake\nofficial: true\nlimit_qrels: 2\ndata_db: qrels.db\naudit_db: audit.db\n",
    )
    .unwrap();

    relbench(&dir)
        .arg("run")
        .assert()
        .code(2)
        .stderr(contains("official"));

    assert_eq!(count(&dir.path().join("audit.db"), "SELECT COUNT(*) FROM runs"), 0);
}

#[test]
fn invalid_window_is_rejected_before_opening_stores() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("relbench.yaml"),
        "provider: fake\nstart_qrel: 5\nend_qrel: 2\n",
    )
    .unwrap();

    relbench(&dir).arg("run").assert().code(2);
    assert!(!dir.path().join(".relbench").exists());
}

#[test]
fn sweep_continues_past_a_failed_run() {
    let dir = TempDir::new().unwrap();
    seed_dataset(&dir.path().join("qrels.db"));
    fs::write(
        dir.path().join("sweep.yaml"),
        "- provider: fake\n  limit_qrels: 0\n- provider: fake\n  limit_qrels: 3\n",
    )
    .unwrap();

    relbench(&dir)
        .args([
            "sweep",
            "--pause",
            "0",
            "--data-db",
            "qrels.db",
            "--audit-db",
            "audit.db",
        ])
        .assert()
        .code(1)
        .stderr(contains("Sweep: runs=2 failed=1"));

    assert_eq!(count(&dir.path().join("audit.db"), "SELECT COUNT(*) FROM predictions"), 3);
}

#[test]
fn run_refuses_multi_entry_files() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("relbench.yaml"),
        "- provider: fake\n- provider: fake\n",
    )
    .unwrap();
    relbench(&dir)
        .arg("run")
        .assert()
        .code(2)
        .stderr(contains("sweep"));
}

#[test]
fn init_writes_sample_config_once() {
    let dir = TempDir::new().unwrap();
    relbench(&dir)
        .args(["init", "--config", "conf/relbench.yaml"])
        .assert()
        .success()
        .stderr(contains("created"));
    assert!(dir.path().join("conf/relbench.yaml").exists());

    relbench(&dir)
        .args(["init", "--config", "conf/relbench.yaml"])
        .assert()
        .success()
        .stderr(contains("already exists"));
}

#[test]
fn log_dir_gets_one_file_per_run_named_by_run_key() {
    let dir = TempDir::new().unwrap();
    seed_dataset(&dir.path().join("qrels.db"));
    fs::write(
        dir.path().join("relbench.yaml"),
        "provider: fake\ndata_db: qrels.db\naudit_db: audit.db\n",
    )
    .unwrap();

    relbench(&dir)
        .args(["run", "--log-dir", "logs", "--log-format", "json"])
        .assert()
        .success();

    let conn = rusqlite::Connection::open(dir.path().join("audit.db")).unwrap();
    let run_key: String = conn
        .query_row("SELECT run_key FROM runs", [], |r| r.get(0))
        .unwrap();

    let logs: Vec<_> = fs::read_dir(dir.path().join("logs")).unwrap().collect();
    assert_eq!(logs.len(), 1);
    let path = dir.path().join("logs").join(format!("relbench-{run_key}.log"));
    let text = fs::read_to_string(path).unwrap();
    assert!(text.contains("run_finalized"));
    assert!(text.contains("DEBUG"));
}

#[test]
fn sweep_writes_a_log_file_for_each_run() {
    let dir = TempDir::new().unwrap();
    seed_dataset(&dir.path().join("qrels.db"));
    fs::write(
        dir.path().join("sweep.yaml"),
        "- provider: fake\n  model: one\n- provider: fake\n  model: two\n",
    )
    .unwrap();

    relbench(&dir)
        .args([
            "sweep",
            "--pause",
            "0",
            "--data-db",
            "qrels.db",
            "--audit-db",
            "audit.db",
            "--log-dir",
            "logs",
        ])
        .assert()
        .success();

    let conn = rusqlite::Connection::open(dir.path().join("audit.db")).unwrap();
    let mut stmt = conn.prepare("SELECT run_key FROM runs").unwrap();
    let keys: Vec<String> = stmt
        .query_map([], |r| r.get(0))
        .unwrap()
        .map(|k| k.unwrap())
        .collect();
    assert_eq!(keys.len(), 2);
    for key in keys {
        assert!(dir.path().join("logs").join(format!("relbench-{key}.log")).exists());
    }
}

#[test]
fn sweep_pauses_five_seconds_by_default() {
    let dir = TempDir::new().unwrap();
    relbench(&dir)
        .args(["sweep", "--help"])
        .assert()
        .success()
        .stdout(contains("[default: 5]"));
}

#[test]
fn version_prints_package_version() {
    let dir = TempDir::new().unwrap();
    relbench(&dir)
        .arg("version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}
