//! Human-readable error descriptions and structured JSON error formatting.

use sipper_core::SipError;
use sipper_hardware::HwError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(se) = err.downcast_ref::<SipError>() {
        return match se {
            SipError::Timeout => {
                "What happened: Scale read timed out.\nLikely causes: HX711 not wired correctly, no power/ground, or timeout too low.\nHow to fix: Verify DT/SCK pins and power, and consider increasing hardware.sensor_read_timeout_ms in the config.".to_string()
            }
            SipError::SensorRead(msg) => format!(
                "What happened: The scale never produced a usable reading ({msg}).\nLikely causes: Loose load cell wiring, wrong [pins], or a failing HX711 board.\nHow to fix: Run `sipper self-check`, then check wiring and the [pins] section."
            ),
            SipError::Config(msg) => format!(
                "What happened: Invalid detection settings ({msg}).\nLikely causes: A negative or zero value in [detection] or [hardware], or a bad --deviation override.\nHow to fix: Edit the config file or the command line flag, then rerun."
            ),
            SipError::Callback(msg) => format!(
                "What happened: Reporting a sip failed ({msg}).\nLikely causes: stdout was closed (e.g. a pipe reader exited).\nHow to fix: Keep the consumer of `sipper run` output alive for the whole session."
            ),
            SipError::State(msg) => format!(
                "What happened: The detection engine is in an unusable state ({msg}).\nLikely causes: The sampling thread panicked.\nHow to fix: Re-run with --log-level=debug and report the log."
            ),
            SipError::Io(msg) => format!(
                "What happened: An OS operation failed ({msg}).\nLikely causes: Resource limits or permissions.\nHow to fix: Check system limits, then rerun."
            ),
        };
    }

    if let Some(hw) = err.downcast_ref::<HwError>() {
        return match hw {
            HwError::Timeout | HwError::DataReadyTimeout => {
                "What happened: HX711 did not produce data within the configured timeout.\nLikely causes: Wrong DT/SCK pins, wiring/power issues, or timeout configured too low.\nHow to fix: Check [pins] in the config, verify 5V/GND, and raise hardware.sensor_read_timeout_ms.".to_string()
            }
            HwError::NotCalibrated(why) => format!(
                "What happened: Calibration failed ({why}).\nLikely causes: The known weight was not on the scale, or a zero/negative --known-weight.\nHow to fix: Place the weight within --settle-ms after the tare message, then rerun."
            ),
            other => format!(
                "What happened: Hardware error ({other}).\nLikely causes: GPIO permissions or wiring.\nHow to fix: Ensure the process can access GPIO and check the [pins] values."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.starts_with("read config") {
        return format!(
            "What happened: Could not read the config file ({msg}).\nLikely causes: Wrong --config path or missing file.\nHow to fix: Pass --config <FILE> or create etc/sipper.toml from the sample."
        );
    }

    if lower.contains("open hx711") {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO.".to_string();
    }

    if lower.contains("invalid configuration")
        || lower.contains(" must be ")
        || lower.contains(" must differ")
        || lower.contains("is unreasonably large")
    {
        return format!(
            "What happened: Configuration is invalid or incomplete ({msg}).\nLikely causes: Missing [pins] (hx711_dt, hx711_sck), or out-of-range values.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 sensor, 4 callback, 5 engine state, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(se) = err.downcast_ref::<SipError>() {
        return match se {
            SipError::SensorRead(_) | SipError::Timeout => 3,
            SipError::Callback(_) => 4,
            SipError::State(_) => 5,
            SipError::Config(_) | SipError::Io(_) => 1,
        };
    }
    if let Some(HwError::Timeout | HwError::DataReadyTimeout) = err.downcast_ref::<HwError>() {
        return 3;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(se) = err.downcast_ref::<SipError>() {
        return match se {
            SipError::Config(_) => "Config",
            SipError::SensorRead(_) => "SensorRead",
            SipError::Timeout => "Timeout",
            SipError::Callback(_) => "Callback",
            SipError::State(_) => "State",
            SipError::Io(_) => "Io",
        };
    }
    if err.downcast_ref::<HwError>().is_some() {
        return "Hardware";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "message": humanize(err),
        "exit_code": exit_code_for_error(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SipError::Timeout, 3, "Scale read timed out")]
    #[case(SipError::SensorRead("bus".into()), 3, "never produced a usable reading")]
    #[case(SipError::Callback("broken pipe".into()), 4, "Reporting a sip failed")]
    #[case(SipError::Config("deviation_threshold must be >= 0, got -1".into()), 1, "Invalid detection settings")]
    fn typed_errors_map_to_messages_and_codes(
        #[case] e: SipError,
        #[case] code: i32,
        #[case] needle: &str,
    ) {
        let report = eyre::Report::new(e);
        assert_eq!(exit_code_for_error(&report), code);
        assert!(humanize(&report).contains(needle));
    }

    #[test]
    fn config_messages_are_recognized_by_text() {
        let report = eyre::eyre!("detection.tick_ms must be >= 1");
        let msg = humanize(&report);
        assert!(msg.starts_with("What happened: Configuration is invalid"));
        assert!(msg.contains("detection.tick_ms"));
        assert_eq!(exit_code_for_error(&report), 1);
    }

    #[test]
    fn json_carries_reason_and_message() {
        let report = eyre::Report::new(SipError::Timeout);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&report)).unwrap();
        assert_eq!(v["reason"], "Timeout");
        assert_eq!(v["exit_code"], 3);
        assert!(v["message"].as_str().unwrap().contains("timed out"));
    }
}
