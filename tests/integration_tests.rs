use serde_json::Value;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Helper function to run chainage against a store directory
fn run_chainage(store: &Path, args: &[&str]) -> (i32, Value) {
    let output = Command::new("cargo")
        .args(["run", "--quiet", "--bin", "chainage", "--", "--store-dir"])
        .arg(store)
        .args(args)
        .output()
        .expect("Failed to spawn process");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json = serde_json::from_str(&stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}): {}\nstderr: {}",
            e,
            stdout,
            String::from_utf8_lossy(&output.stderr)
        )
    });
    (code, json)
}

fn upload(store: &Path, role: &str, file: &str) -> Value {
    let (code, json) = run_chainage(store, &["upload", "--role", role, file]);
    assert_eq!(code, 0, "upload failed: {}", json);
    json
}

#[test]
fn test_upload_primary_survey() {
    let store = TempDir::new().unwrap();
    let report = upload(store.path(), "primary", "test/xli_survey.csv");
    assert_eq!(report["status"], "ok");
    assert_eq!(report["rows"], 6);
    assert_eq!(report["markers"], 5);
    assert_eq!(report["columns"][10], "Comment_1");
    assert!(store.path().join("datasetXLI.json").exists());
    assert!(store.path().join("markersXLI.json").exists());
}

#[test]
fn test_upload_unsupported_extension_exits_2() {
    let store = TempDir::new().unwrap();
    let (code, json) = run_chainage(store.path(), &["upload", "--role", "secondary", "Cargo.toml"]);
    assert_eq!(code, 2);
    assert_eq!(json["status"], "unsupported_format");
    assert!(!store.path().join("datasetICE.json").exists());
}

#[test]
fn test_show_and_markers_survive_restart() {
    let store = TempDir::new().unwrap();
    upload(store.path(), "primary", "test/xli_survey.csv");

    let (_, shown) = run_chainage(store.path(), &["show", "--role", "primary"]);
    assert_eq!(shown["file_name"], "xli_survey.csv");
    assert_eq!(shown["rows"], 6);

    let (_, markers) = run_chainage(store.path(), &["markers"]);
    let markers = markers.as_array().unwrap();
    assert_eq!(markers.len(), 5);
    assert_eq!(markers[0]["lat"], 12.9716);
    assert_eq!(markers[0]["lng"], 77.5946);

    let (_, empty) = run_chainage(store.path(), &["show", "--role", "secondary"]);
    assert_eq!(empty["status"], "no_data");
}

#[test]
fn test_chunk_command() {
    let store = TempDir::new().unwrap();
    upload(store.path(), "primary", "test/xli_survey.csv");
    let (code, report) = run_chainage(
        store.path(),
        &["chunk", "--role", "primary", "--distance", "VirtualDistance (m)", "--width", "500"],
    );
    assert_eq!(code, 0);
    assert_eq!(report["filtered_rows"], 5);
    assert_eq!(report["max_distance"], 1250.0);
    let titles: Vec<&str> = report["chunks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["0m - 500m", "500m - 1000m", "1000m - 1500m"]);
}

#[test]
fn test_acpsp_chart_sections() {
    let store = TempDir::new().unwrap();
    upload(store.path(), "primary", "test/xli_survey.csv");
    let (code, chart) = run_chainage(store.path(), &["chart", "acpsp"]);
    assert_eq!(code, 0);
    assert_eq!(chart["status"], "ok");
    assert_eq!(chart["thresholds"][0]["value"], 30.0);
    let first = &chart["sections"][0];
    assert_eq!(first["title"], "0m - 500m");
    assert_eq!(first["labels"], serde_json::json!(["0.00", "250.00", "499.50"]));
    assert_eq!(first["series"][0]["points"], serde_json::json!([12.1, 35.5, 28.0]));
}

#[test]
fn test_dcvg_band_filters_rows() {
    let store = TempDir::new().unwrap();
    upload(store.path(), "primary", "test/xli_survey.csv");
    let (_, chart) = run_chainage(store.path(), &["chart", "dcvg", "--whole"]);
    assert_eq!(chart["sections"].as_array().unwrap().len(), 1);
    // 150 %IR is outside the 0..=100 band
    assert_eq!(chart["sections"][0]["rows"], 4);
}

#[test]
fn test_chart_before_upload_reports_no_data() {
    let store = TempDir::new().unwrap();
    let (code, chart) = run_chainage(store.path(), &["chart", "wall-loss"]);
    assert_eq!(code, 0);
    assert_eq!(chart["status"], "no_data");
    assert!(chart["message"].as_str().unwrap().contains("ICE"));
}

#[test]
fn test_temperature_overlay_sorted() {
    let store = TempDir::new().unwrap();
    upload(store.path(), "secondary", "test/ice_inspection.csv");
    let (_, chart) = run_chainage(store.path(), &["chart", "temperature", "--whole"]);
    let overlay = &chart["sections"][0]["series"][1]["points"];
    let xs: Vec<f64> = overlay
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["x"].as_f64().unwrap())
        .collect();
    assert_eq!(xs, vec![0.0, 250.0, 600.0, 1000.0]);
}

#[test]
fn test_series_command_with_spec_syntax() {
    let store = TempDir::new().unwrap();
    upload(store.path(), "secondary", "test/ice_inspection.csv");
    let (code, report) = run_chainage(
        store.path(),
        &[
            "series",
            "--role",
            "secondary",
            "--x",
            "Chainage (m)",
            "--series",
            r#"series(keywords: ["wall loss", "worst"], label: "Worst", optional: true)"#,
            "--series",
            "Elevation (m)",
        ],
    );
    assert_eq!(code, 0);
    let section = &report["sections"][0];
    assert_eq!(section["series"][0]["name"], "Worst");
    assert_eq!(section["series"][0]["points"][1], Value::Null);
    assert_eq!(section["labels"][2], "600.00");
}

#[test]
fn test_clear_one_role_keeps_other() {
    let store = TempDir::new().unwrap();
    upload(store.path(), "primary", "test/xli_survey.csv");
    upload(store.path(), "secondary", "test/ice_inspection.csv");

    let (code, status) = run_chainage(store.path(), &["clear", "--role", "primary"]);
    assert_eq!(code, 0);
    assert_eq!(status["status"], "ok");

    let (_, primary) = run_chainage(store.path(), &["show", "--role", "primary"]);
    assert_eq!(primary["status"], "no_data");
    let (_, secondary) = run_chainage(store.path(), &["show", "--role", "secondary"]);
    assert_eq!(secondary["rows"], 5);
    let (_, markers) = run_chainage(store.path(), &["markers"]);
    assert_eq!(markers, serde_json::json!([]));
}

#[test]
fn test_charts_lists_catalog() {
    let store = TempDir::new().unwrap();
    let (_, charts) = run_chainage(store.path(), &["charts"]);
    let kinds: Vec<&str> = charts
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds.len(), 11);
    assert!(kinds.contains(&"avg-holdup"));
    assert!(kinds.contains(&"wall-loss"));
}
