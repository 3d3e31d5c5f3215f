use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn lexi_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("lexi");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = r#"[server]
bind = "127.0.0.1:0"

[extraction]
mode = "heuristic"

[clients.acme]
chatbot_name = "Acme Injury Bot"
greeting = "Hi from Acme. What happened?"
fee_structure = "33% contingency, nothing upfront."
supported_case_types = ["car_accident"]

[clients.acme.contact]
phone = "555-000-1111"
"#;

    let config_path = config_dir.join("lexi.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_lexi(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = lexi_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run lexi binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn parse(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("invalid JSON ({}): {}", e, stdout))
}

#[test]
fn test_classify_greeting() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_lexi(&config_path, &["classify", "Hello there"]);
    assert!(success, "classify failed: {}", stderr);

    let result = parse(&stdout);
    assert_eq!(result["type"], "GREETING");
    assert_eq!(result["method"], "pattern");
    assert!((result["confidence"].as_f64().unwrap() - 1.0).abs() < 1e-9);
}

#[test]
fn test_classify_fallback() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_lexi(&config_path, &["classify", "xyzzy"]);
    assert!(success);

    let result = parse(&stdout);
    assert_eq!(result["type"], "GENERAL_LEGAL");
    assert_eq!(result["method"], "fallback");
    assert_eq!(result["confidence"], 0.3);
}

#[test]
fn test_classify_without_config_file_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (stdout, stderr, success) = run_lexi(&missing, &["classify", "what is the deadline?"]);
    assert!(success, "classify failed: {}", stderr);
    assert_eq!(parse(&stdout)["type"], "STATUTE_INQUIRY");
}

#[test]
fn test_chat_uses_client_fee_structure() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_lexi(
        &config_path,
        &["chat", "How much do you charge?", "--client", "acme"],
    );
    assert!(success, "chat failed: {}", stderr);

    let outcome = parse(&stdout);
    assert_eq!(outcome["intent"], "FEE_INQUIRY");
    assert!(outcome["response"]
        .as_str()
        .unwrap()
        .contains("33% contingency, nothing upfront."));
    assert_eq!(
        outcome["sessionData"]["conversationHistory"]
            .as_array()
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn test_chat_unknown_client_gets_default_greeting() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_lexi(&config_path, &["chat", "hi", "--client", "nobody"]);
    assert!(success);

    let outcome = parse(&stdout);
    assert_eq!(outcome["intent"], "GREETING");
    assert_eq!(
        outcome["response"],
        "Welcome to our law firm. How can I assist you with your legal matter today?"
    );
}

#[test]
fn test_chat_heuristic_extraction_from_config() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_lexi(
        &config_path,
        &["chat", "I was injured in a crash and have whiplash"],
    );
    assert!(success);

    let outcome = parse(&stdout);
    assert_eq!(outcome["intent"], "CASE_INQUIRY");
    assert_eq!(outcome["caseType"], "car_accident");
    assert_eq!(outcome["sessionData"]["caseDetails"]["injuryType"], "whiplash");
    assert_eq!(outcome["sessionData"]["conversationStage"], "gathering_details");
}

#[test]
fn test_assess_file() {
    let (tmp, config_path) = setup_test_env();

    let two_years_ago = (chrono::Utc::now() - chrono::Duration::days(730))
        .format("%Y-%m-%d")
        .to_string();
    let input = serde_json::json!({
        "caseDetails": {
            "injuryType": "fracture",
            "incidentDate": two_years_ago,
            "liabilityAdmitted": true,
            "medicalTreatment": true,
            "witnesses": true,
            "damages": 5000,
            "insurance": true
        },
        "userInfo": { "phone": "555-222-3333", "name": "Pat" }
    });
    let file = tmp.path().join("case.json");
    fs::write(&file, input.to_string()).unwrap();

    let (stdout, stderr, success) =
        run_lexi(&config_path, &["assess", file.to_str().unwrap()]);
    assert!(success, "assess failed: {}", stderr);

    let out = parse(&stdout);
    assert_eq!(out["caseAssessment"]["strength"], "Strong");
    assert_eq!(out["caseAssessment"]["estimatedValue"], "Estimated $15,000");
    assert_eq!(out["caseAssessment"]["statuteStatus"], "Valid");
    assert_eq!(out["leadScore"]["score"], 9);
    assert_eq!(out["leadScore"]["label"], "Hot");
}

#[test]
fn test_assess_empty_details() {
    let (tmp, config_path) = setup_test_env();
    let file = tmp.path().join("empty.json");
    fs::write(&file, "{}").unwrap();

    let (stdout, _, success) = run_lexi(&config_path, &["assess", file.to_str().unwrap()]);
    assert!(success);

    let out = parse(&stdout);
    assert_eq!(out["caseAssessment"]["strength"], "Weak");
    assert_eq!(out["caseAssessment"]["estimatedValue"], "Unknown");
    assert_eq!(out["caseAssessment"]["statuteStatus"], "Unknown");
    assert_eq!(out["leadScore"]["label"], "Cold");
}

#[test]
fn test_assess_missing_file_fails() {
    let (tmp, config_path) = setup_test_env();
    let missing = tmp.path().join("missing.json");

    let (_, stderr, success) = run_lexi(&config_path, &["assess", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Failed to read"));
}

#[test]
fn test_clients_lists_configured_and_default() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_lexi(&config_path, &["clients"]);
    assert!(success);
    assert!(stdout.contains("acme"));
    assert!(stdout.contains("Acme Injury Bot"));
    assert!(stdout.contains("default"));
    assert!(!stdout.contains("smith-injury-law"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    fs::write(&config_path, "[llm]\nprovider = \"mystery\"\n").unwrap();

    let (_, stderr, success) = run_lexi(&config_path, &["classify", "hi"]);
    assert!(!success);
    assert!(stderr.contains("Unknown llm provider"));
}
