use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Minimal valid config for the simulated backend with a fast tick.
fn write_config(dir: &tempfile::TempDir, readings: &str, extra: &str) -> PathBuf {
    let toml = format!(
        r#"
[pins]
# pins are unused in sim backend but must be present
hx711_dt = 5
hx711_sck = 6

[detection]
deviation_threshold = 10
tick_ms = 5

[hardware]
sensor_read_timeout_ms = 20

[simulation]
readings = {readings}
{extra}
"#
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn sipper() -> Command {
    let mut cmd = Command::cargo_bin("sipper").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("SIPPER_TEST_SIM_TIMEOUT");
    cmd
}

const SIP_SCRIPT: &str = "[0, 0, 500, 500, 0, 0, 420, 420]";

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["run", "--duration-ms", "300"], 0, "\"amount\":80", "stdout")]
#[case(&["run", "--duration-ms", "300"], 0, "Session finished: 1 sip(s), 80 consumed", "stdout")]
#[case(&["self-check"], 0, "ok", "stdout")]
#[case(&["tare"], 0, "Tare complete", "stdout")]
#[case(&["calibrate"], 2, "--known-weight", "stderr")]
#[case(&["run", "--duration-ms", "50", "--deviation=-3"], 1, "Invalid detection settings", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIP_SCRIPT, "");

    let mut cmd = sipper();
    cmd.arg("--log-level").arg("error").arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn run_emits_json_lines_and_summary() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[0, 0, 500, 500, 0, 0, 420, 420, 0, 0, 300, 300, 0, 0, 400]", "");

    let out = sipper()
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .arg("--duration-ms")
        .arg("400")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&out);
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("bad JSON line {l:?}: {e}")))
        .collect();

    let events: Vec<(&str, i64)> = lines
        .iter()
        .filter(|v| v["event"] != "summary")
        .map(|v| (v["event"].as_str().unwrap(), v["amount"].as_i64().unwrap()))
        .collect();
    assert_eq!(events, vec![("sip", 80), ("sip", 120), ("refill", 100)]);

    let summary = lines.last().unwrap();
    assert_eq!(summary["event"], "summary");
    assert_eq!(summary["sips"], 2);
    assert_eq!(summary["consumed_total"], 200);
    assert_eq!(summary["refills"], 1);
    assert!(summary["duration_ms"].as_u64().is_some());
}

#[test]
fn sensor_timeouts_fail_the_run_without_crashing() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIP_SCRIPT, "");

    sipper()
        .env("SIPPER_TEST_SIM_TIMEOUT", "1")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .arg("--duration-ms")
        .arg("100")
        .assert()
        .code(3)
        .stderr(predicate::str::contains(
            "What happened: The scale never produced a usable reading",
        ));
}

#[test]
fn tare_timeout_reports_json_reason() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIP_SCRIPT, "");

    let out = sipper()
        .env("SIPPER_TEST_SIM_TIMEOUT", "1")
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("tare")
        .assert()
        .code(3)
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_str(String::from_utf8_lossy(&out).trim()).unwrap();
    assert_eq!(v["reason"], "Timeout");
    assert!(
        v["message"]
            .as_str()
            .unwrap()
            .contains("Scale read timed out")
    );
}

#[rstest]
#[case("[detection]\ntick_ms = 0\n", "detection.tick_ms")]
#[case("[scale]\ngain_pulses = 30\n", "scale.gain_pulses")]
#[case("[logging]\nlevel = \"loud\"\n", "logging.level")]
fn invalid_config_is_humanized(#[case] bad: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, format!("[pins]\nhx711_dt = 5\nhx711_sck = 6\n{bad}")).unwrap();

    sipper()
        .arg("--config")
        .arg(&path)
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("What happened: Configuration is invalid"))
        .stderr(predicate::str::contains(needle));
}

#[test]
fn missing_config_file_is_explained() {
    let dir = tempdir().unwrap();
    sipper()
        .arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not read the config file"));
}

#[test]
fn calibrate_prints_factor_for_known_weight() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[0, 840]", "");

    sipper()
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("calibrate")
        .arg("--known-weight")
        .arg("420")
        .arg("--settle-ms")
        .arg("0")
        .arg("--samples")
        .arg("4")
        .assert()
        .success()
        .stdout(predicate::str::contains("calibration_factor = 2.0000"));
}

#[test]
fn calibrate_rejects_non_positive_weight() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[0, 840]", "");

    sipper()
        .arg("--config")
        .arg(&cfg)
        .arg("calibrate")
        .arg("--known-weight=0")
        .arg("--settle-ms")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Calibration failed"));
}

#[test]
fn file_logging_writes_json_lines() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("sipper.log");
    let extra = format!(
        "\n[logging]\nfile = {:?}\nlevel = \"info\"\nrotation = \"never\"\n",
        log.display().to_string()
    );
    let cfg = write_config(&dir, SIP_SCRIPT, &extra);

    sipper()
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .arg("--duration-ms")
        .arg("200")
        .assert()
        .success();

    let text = fs::read_to_string(&log).unwrap();
    let first = text.lines().next().expect("log file has lines");
    let v: serde_json::Value = serde_json::from_str(first).unwrap();
    assert!(v.get("level").is_some());
    assert!(text.contains("sip detected"));
}
