// Drives the compiled binary with throwaway config and history files.

use assert_cmd::Command;
use std::path::Path;
use tempfile::tempdir;

fn faceoff(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("faceoff").unwrap();
    cmd.arg("--config").arg(config);
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn settings_show_prints_defaults_without_writing() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("settings.json");

    let out = stdout_of(faceoff(&config).args(["settings", "show"]));
    assert!(out.contains("* Down Set Whistle (down-set-whistle): 5 reps"), "{out}");
    assert!(out.contains("Rapid Clamp (rapid-clamp): 10 reps"), "{out}");
    assert!(out.contains("reset_pause"), "{out}");
    assert!(!config.exists());
}

#[test]
fn edits_are_persisted() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("nested").join("settings.json");

    stdout_of(faceoff(&config).args(["settings", "set-reps", "rapid-clamp", "7"]));
    stdout_of(faceoff(&config).args([
        "settings",
        "set-range",
        "three-whistle",
        "pull-to-pop",
        "0.5",
        "1.5",
    ]));
    stdout_of(faceoff(&config).args(["settings", "select", "three-whistle"]));
    assert!(config.exists());

    let json = stdout_of(faceoff(&config).args(["settings", "show", "--json"]));
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["selected_drill"], "three-whistle");
    assert_eq!(value["drills"]["rapid-clamp"]["number_of_reps"], 7);
    assert_eq!(
        value["drills"]["three-whistle"]["ranges"]["pull_to_pop"]["max"],
        1.5
    );

    stdout_of(faceoff(&config).args(["settings", "reset"]));
    let out = stdout_of(faceoff(&config).args(["settings", "show"]));
    assert!(out.contains("* Down Set Whistle"), "{out}");
    assert!(out.contains("Rapid Clamp (rapid-clamp): 10 reps"), "{out}");
}

#[test]
fn inverted_range_is_rejected() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("settings.json");

    let output = faceoff(&config)
        .args(["settings", "set-range", "down-set-whistle", "down", "3", "1"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("inverted"), "{stderr}");
    assert!(!config.exists());
}

#[test]
fn stats_on_an_empty_history() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("settings.json");
    let db = dir.path().join("history.db");

    let out = stdout_of(faceoff(&config).arg("--db").arg(&db).args(["stats"]));
    assert!(out.contains("sessions:        0"), "{out}");
    assert!(out.contains("current streak:  0 days"), "{out}");
}

#[test]
fn run_completes_and_records_with_closed_stdin() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("settings.json");
    let db = dir.path().join("history.db");

    let out = stdout_of(
        faceoff(&config)
            .arg("--db")
            .arg(&db)
            .args(["run", "--drill", "rapid-clamp", "--reps", "1", "--lead-in-ms", "0"])
            .write_stdin(""),
    );
    assert!(out.contains("*WHISTLE*"), "{out}");
    assert!(out.contains("Practice Complete!"), "{out}");

    let stats = stdout_of(faceoff(&config).arg("--db").arg(&db).args(["stats"]));
    assert!(stats.contains("sessions:        1"), "{stats}");
    assert!(stats.contains("rapid-clamp"), "{stats}");
}

#[test]
fn quit_abandons_the_session() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("settings.json");
    let db = dir.path().join("history.db");

    let out = stdout_of(
        faceoff(&config)
            .arg("--db")
            .arg(&db)
            .args(["run", "--drill", "three-whistle", "--lead-in-ms", "2000"])
            .write_stdin("q\n"),
    );
    assert!(!out.contains("Practice Complete!"), "{out}");

    let stats = stdout_of(faceoff(&config).arg("--db").arg(&db).args(["stats"]));
    assert!(stats.contains("sessions:        0"), "{stats}");
}

#[test]
fn unknown_drill_is_a_usage_error() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("settings.json");

    let output = faceoff(&config)
        .args(["run", "--drill", "four-whistle"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown drill type"), "{stderr}");
}

#[test]
fn zero_reps_is_rejected_before_running() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("settings.json");
    let db = dir.path().join("history.db");

    let output = faceoff(&config)
        .arg("--db")
        .arg(&db)
        .args(["run", "--drill", "rapid-clamp", "--reps", "0", "--lead-in-ms", "0"])
        .write_stdin("")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--reps"), "{stderr}");
    assert!(String::from_utf8_lossy(&output.stdout).is_empty());
    assert!(!db.exists());
}

#[test]
fn stats_clear_empties_the_history() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("settings.json");
    let db = dir.path().join("history.db");

    stdout_of(
        faceoff(&config)
            .arg("--db")
            .arg(&db)
            .args(["run", "--drill", "rapid-clamp", "--reps", "1", "--lead-in-ms", "0"])
            .write_stdin(""),
    );
    let stats = stdout_of(faceoff(&config).arg("--db").arg(&db).args(["stats"]));
    assert!(stats.contains("sessions:        1"), "{stats}");

    let out = stdout_of(faceoff(&config).arg("--db").arg(&db).args(["stats", "--clear"]));
    assert!(out.contains("practice history cleared"), "{out}");

    let stats = stdout_of(faceoff(&config).arg("--db").arg(&db).args(["stats"]));
    assert!(stats.contains("sessions:        0"), "{stats}");
    assert!(!stats.contains("rapid-clamp"), "{stats}");
}
