#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn gazeflow(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("gazeflow").unwrap();
    cmd.current_dir(dir.path()).env("GAZEFLOW_ROOT", dir.path());
    cmd
}

/// A study with one eye tracker and one camera, whose worker runs `script`.
fn init_study(dir: &TempDir, script: &str) {
    let config = format!(
        "session_def:\n  - name: et\n    kind: eye_tracker\n  - name: cam\n    kind: camera\n\
         worker:\n  program: sh\n  args: [\"-c\", \"{script}\"]\n  workers: 2\n"
    );
    std::fs::write(dir.path().join("study.yaml"), config).unwrap();
    std::fs::create_dir_all(dir.path().join("s1")).unwrap();
}

fn states_file(dir: &TempDir, unit: &str) -> String {
    std::fs::read_to_string(dir.path().join(unit).join("action_states.yaml")).unwrap()
}

fn write_states(dir: &TempDir, unit: &str, yaml: &str) {
    let path = dir.path().join(unit);
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(path.join("action_states.yaml"), yaml).unwrap();
}

fn json_output(cmd: &mut Command) -> serde_yaml::Value {
    let out = cmd.arg("--json").output().unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    // JSON is a subset of YAML.
    serde_yaml::from_slice(&out.stdout).unwrap()
}

// ---------------------------------------------------------------------------
// gazeflow status
// ---------------------------------------------------------------------------

#[test]
fn status_without_study_fails() {
    let dir = TempDir::new().unwrap();
    gazeflow(&dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn status_lists_sessions() {
    let dir = TempDir::new().unwrap();
    init_study(&dir, "exit 0");
    std::fs::create_dir_all(dir.path().join("s2")).unwrap();
    gazeflow(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("s1"))
        .stdout(predicate::str::contains("s2"))
        .stdout(predicate::str::contains("0/2"));
}

#[test]
fn status_of_session_shows_every_recording() {
    let dir = TempDir::new().unwrap();
    init_study(&dir, "exit 0");
    let json = json_output(gazeflow(&dir).args(["status", "s1"]));
    assert_eq!(json["name"].as_str(), Some("s1"));
    let recordings = json["recordings"].as_sequence().unwrap();
    assert_eq!(recordings.len(), 2);
    assert_eq!(recordings[0]["states"]["import"].as_str(), Some("not_run"));
    assert_eq!(recordings[1]["persisted"].as_bool(), Some(false));
}

#[test]
fn status_of_unknown_session_fails() {
    let dir = TempDir::new().unwrap();
    init_study(&dir, "exit 0");
    gazeflow(&dir)
        .args(["status", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("session not found: nope"));
}

// ---------------------------------------------------------------------------
// gazeflow possible
// ---------------------------------------------------------------------------

#[test]
fn possible_on_fresh_session_offers_import() {
    let dir = TempDir::new().unwrap();
    init_study(&dir, "exit 0");
    let json = json_output(gazeflow(&dir).args(["possible", "s1"]));
    let import = &json["import"];
    assert_eq!(import["scope"].as_str(), Some("recording"));
    assert_eq!(import["runnable"].as_sequence().unwrap().len(), 2);
    // Gated out by the config: no sync reference recording is set.
    assert!(json.get("sync_to_reference").is_none());
}

#[test]
fn possible_table_names_blockers() {
    let dir = TempDir::new().unwrap();
    init_study(&dir, "exit 0");
    gazeflow(&dir)
        .args(["possible", "s1", "--action", "detect_markers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("et: import, code_episodes"));
}

#[test]
fn unknown_action_is_rejected() {
    let dir = TempDir::new().unwrap();
    init_study(&dir, "exit 0");
    gazeflow(&dir)
        .args(["possible", "s1", "--action", "calibrate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown action: calibrate"));
}

// ---------------------------------------------------------------------------
// gazeflow run
// ---------------------------------------------------------------------------

#[test]
fn run_import_completes_on_every_recording() {
    let dir = TempDir::new().unwrap();
    init_study(&dir, "exit 0");
    gazeflow(&dir)
        .args(["run", "import", "s1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("s1/et"))
        .stdout(predicate::str::contains("s1/cam"));

    assert!(states_file(&dir, "s1/et").contains("import: completed"));
    assert!(states_file(&dir, "s1/cam").contains("import: completed"));
}

#[test]
fn run_blocked_recording_fails_without_submitting() {
    let dir = TempDir::new().unwrap();
    init_study(&dir, "exit 0");
    gazeflow(&dir)
        .args(["run", "detect_markers", "s1", "--recording", "et"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("blocked by: import, code_episodes"));
    assert!(!dir.path().join("s1/et/action_states.yaml").exists());
}

#[test]
fn run_refuses_action_already_in_flight() {
    let dir = TempDir::new().unwrap();
    init_study(&dir, "exit 0");
    write_states(&dir, "s1/et", "import: running\n");
    gazeflow(&dir)
        .args(["run", "import", "s1", "--recording", "et"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already pending or running on 'et'"));
    assert!(states_file(&dir, "s1/et").contains("import: running"));

    // Without --recording only the idle recording is picked.
    gazeflow(&dir)
        .args(["run", "import", "s1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("s1/cam"))
        .stdout(predicate::str::contains("s1/et").not());
}

#[test]
fn run_reports_failed_worker() {
    let dir = TempDir::new().unwrap();
    init_study(&dir, "exit 7");
    gazeflow(&dir)
        .args(["run", "import", "s1", "--recording", "cam"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 1 job(s) did not complete"));
    assert!(states_file(&dir, "s1/cam").contains("import: failed"));
}

#[test]
fn run_session_action_rejects_recording_flag() {
    let dir = TempDir::new().unwrap();
    init_study(&dir, "exit 0");
    write_states(&dir, "s1/et", "import: completed\ngaze_to_plane: completed\n");
    gazeflow(&dir)
        .args(["run", "export_trials", "s1", "--recording", "et"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("runs once per session"));
}

#[test]
fn run_session_action_writes_session_file() {
    let dir = TempDir::new().unwrap();
    init_study(&dir, "exit 0");
    write_states(&dir, "s1/et", "import: completed\ngaze_to_plane: completed\n");
    gazeflow(&dir)
        .args(["run", "export_trials", "s1"])
        .assert()
        .success();
    assert!(states_file(&dir, "s1").contains("export_trials: completed"));
}

// ---------------------------------------------------------------------------
// gazeflow reset / recover / upgrade
// ---------------------------------------------------------------------------

#[test]
fn reset_cascades_to_later_actions() {
    let dir = TempDir::new().unwrap();
    init_study(&dir, "exit 0");
    write_states(
        &dir,
        "s1/et",
        "import: completed\ncode_episodes: completed\ndetect_markers: completed\n",
    );
    write_states(&dir, "s1", "export_trials: completed\n");

    gazeflow(&dir)
        .args(["reset", "code_episodes", "s1", "--recording", "et"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cascaded to s1"));

    let et = states_file(&dir, "s1/et");
    assert!(et.contains("import: completed"));
    assert!(et.contains("code_episodes: not_run"));
    assert!(et.contains("detect_markers: not_run"));
    assert!(states_file(&dir, "s1").contains("export_trials: not_run"));
}

#[test]
fn reset_recording_action_requires_recording() {
    let dir = TempDir::new().unwrap();
    init_study(&dir, "exit 0");
    gazeflow(&dir)
        .args(["reset", "import", "s1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pass --recording"));
}

#[test]
fn recover_settles_interrupted_actions() {
    let dir = TempDir::new().unwrap();
    init_study(&dir, "exit 0");
    write_states(&dir, "s1/cam", "import: completed\ndetect_markers: running\n");

    gazeflow(&dir)
        .arg("recover")
        .assert()
        .success()
        .stdout(predicate::str::contains("detect_markers"));
    assert!(states_file(&dir, "s1/cam").contains("detect_markers: failed"));

    gazeflow(&dir)
        .arg("recover")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to recover."));
}

#[test]
fn upgrade_rewrites_outdated_files() {
    let dir = TempDir::new().unwrap();
    init_study(&dir, "exit 0");
    write_states(&dir, "s1", "export_trials: completed\nlegacy_report: completed\n");

    gazeflow(&dir)
        .arg("upgrade")
        .assert()
        .success()
        .stdout(predicate::str::contains("upgraded s1"));
    let text = states_file(&dir, "s1");
    assert!(!text.contains("legacy_report"));
    assert!(text.contains("make_mapped_video: not_run"));

    gazeflow(&dir)
        .arg("upgrade")
        .assert()
        .success()
        .stdout(predicate::str::contains("All action state files are current."));
}
