use assert_cmd::Command;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use serde_json::{Value, json};
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

fn eco_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("ecosentinel"));
    cmd.env_remove("ECO_MODEL")
        .env_remove("ECO_HOST")
        .env_remove("OLLAMA_HOST")
        .env_remove("ECO_TIMEOUT")
        .env_remove("ECO_RECOVERY")
        .env_remove("ECO_OUTPUT")
        .env_remove("ECO_CONFIG")
        .env_remove("ECO_LOG")
        .env_remove("HTTP_PROXY")
        .env_remove("http_proxy")
        .env_remove("ALL_PROXY")
        .env_remove("all_proxy");
    cmd
}

fn unique_temp_path(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("ecosentinel-test-{label}-{nanos}"))
}

fn temp_image(label: &str, bytes: &[u8]) -> PathBuf {
    let path = unique_temp_path(label);
    fs::write(&path, bytes).expect("image should be writable");
    path
}

fn parse_stdout_json(output: &[u8]) -> Value {
    let text = String::from_utf8(output.to_vec()).expect("stdout should be utf-8");
    serde_json::from_str(text.trim()).expect("stdout should contain valid JSON")
}

/// One-shot HTTP endpoint. The handle yields the request body it received.
fn spawn_stub(status_line: &'static str, body: Value) -> (String, JoinHandle<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("stub should bind");
    let addr = listener.local_addr().expect("stub should have an address");

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("stub should accept");
        let mut reader = BufReader::new(stream.try_clone().expect("stream should clone"));

        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("header line");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().expect("numeric content-length");
                }
            }
        }
        let mut request_body = vec![0u8; content_length];
        reader
            .read_exact(&mut request_body)
            .expect("request body");

        let payload = body.to_string();
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
            payload.len()
        );
        let mut stream = stream;
        stream
            .write_all(response.as_bytes())
            .expect("response should be written");
        stream.flush().expect("response should flush");

        serde_json::from_slice(&request_body).expect("request body should be JSON")
    });

    (format!("http://{addr}"), handle)
}

#[test]
fn dry_run_plant_prints_request_without_server() {
    let image = temp_image("dry-plant", b"0123456789");

    let assert = eco_cmd()
        .arg("plant")
        .arg(&image)
        .args(["--info", "indoor, north window", "--dry-run"])
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["dry_run"], json!(true));
    assert_eq!(body["task"], json!("plant-health"));
    assert_eq!(body["model"], json!("gemma3n:4b"));
    assert_eq!(body["url"], json!("http://localhost:11434/api/generate"));
    assert_eq!(body["stream"], json!(false));
    assert_eq!(body["recovery"], json!("naive"));
    assert_eq!(body["images"], json!([{"base64_len": 16}]));
    let prompt = body["prompt"].as_str().expect("prompt should be text");
    assert!(prompt.contains("Additional context: indoor, north window"));
    assert!(prompt.ends_with("species, health_score, issues, treatments, prevention"));
}

#[test]
fn dry_run_translate_reads_message_from_stdin() {
    let assert = eco_cmd()
        .args(["translate", "--language", "Spanish", "--dry-run"])
        .write_stdin("Evacuate the valley now\n")
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["task"], json!("emergency-translation"));
    assert_eq!(body["images"], json!([]));
    let prompt = body["prompt"].as_str().expect("prompt should be text");
    assert!(prompt.starts_with("Translate this emergency message to Spanish"));
    assert!(prompt.contains("Original message: Evacuate the valley now"));
}

#[test]
fn argument_message_has_priority_over_stdin() {
    let assert = eco_cmd()
        .args(["translate", "argument message", "--dry-run"])
        .write_stdin("stdin message")
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    let prompt = body["prompt"].as_str().expect("prompt should be text");
    assert!(prompt.contains("to English"));
    assert!(prompt.contains("Original message: argument message"));
    assert!(!prompt.contains("stdin message"));
}

#[test]
fn empty_stdin_message_is_rejected() {
    eco_cmd()
        .args(["translate", "--dry-run"])
        .write_stdin("   \n")
        .assert()
        .failure()
        .stderr(contains("No message provided."));
}

#[test]
fn missing_image_fails_before_contacting_the_server() {
    let missing = unique_temp_path("missing-image");

    for subcommand in ["plant", "hazard", "species"] {
        eco_cmd()
            .arg(subcommand)
            .arg(&missing)
            .args(["--host", "http://127.0.0.1:9"])
            .assert()
            .failure()
            .stderr(contains("Failed to read image").and(contains("request to").not()));
    }
}

#[test]
fn structured_reply_is_printed_as_json() {
    let image = temp_image("e2e-plant", b"\xff\xd8\xff leaf pixels");
    let reply = "Here is my assessment:\n```json\n{\"species\": \"Ocimum basilicum\", \"health_score\": 6, \"issues\": [\"aphids\"], \"treatments\": [\"neem oil\"], \"prevention\": [\"airflow\"]}\n```";
    let (host, server) = spawn_stub("200 OK", json!({"model": "gemma3n:4b", "response": reply, "done": true}));

    let assert = eco_cmd()
        .arg("plant")
        .arg(&image)
        .args(["--host", &host, "--json", "--info", "balcony"])
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(
        body,
        json!({
            "species": "Ocimum basilicum",
            "health_score": 6,
            "issues": ["aphids"],
            "treatments": ["neem oil"],
            "prevention": ["airflow"]
        })
    );

    let request = server.join().expect("stub thread should finish");
    assert_eq!(request["model"], json!("gemma3n:4b"));
    assert_eq!(request["stream"], json!(false));
    assert_eq!(
        request["images"],
        json!([STANDARD.encode(b"\xff\xd8\xff leaf pixels")])
    );
    assert!(
        request["prompt"]
            .as_str()
            .expect("prompt should be text")
            .contains("Additional context: balcony")
    );
}

#[test]
fn translation_request_carries_no_images() {
    let reply = "{\"translation\": \"Evacuez\", \"urgency\": 5, \"actions\": [\"leave\"], \"cultural_notes\": \"formal register\"}";
    let (host, server) = spawn_stub("200 OK", json!({"response": reply}));

    eco_cmd()
        .args(["translate", "Evacuate", "--language", "French"])
        .args(["--host", &host, "--model", "llava:7b"])
        .assert()
        .success()
        .stdout(contains("translation: Evacuez").and(contains("urgency: 5")));

    let request = server.join().expect("stub thread should finish");
    assert_eq!(request["model"], json!("llava:7b"));
    assert!(request.get("images").is_none());
}

#[test]
fn non_json_reply_falls_back_to_raw_text() {
    let image = temp_image("e2e-species", b"heron");
    let (host, server) = spawn_stub(
        "200 OK",
        json!({"response": "Probably a grey heron, but the photo is blurry."}),
    );

    eco_cmd()
        .arg("species")
        .arg(&image)
        .args(["--host", &host])
        .assert()
        .success()
        .stdout("Probably a grey heron, but the photo is blurry.\n")
        .stderr(contains("no parsable JSON object"));

    server.join().expect("stub thread should finish");
}

#[test]
fn fallback_json_output_uses_raw_response_key() {
    let image = temp_image("e2e-hazard", b"ridge");
    let reply = "Sure! {\"a\": 1} and also {\"b\": 2}";
    let (host, server) = spawn_stub("200 OK", json!({"response": reply}));

    let assert = eco_cmd()
        .arg("hazard")
        .arg(&image)
        .args(["--host", &host, "--output", "json"])
        .assert()
        .success();

    assert_eq!(
        parse_stdout_json(&assert.get_output().stdout),
        json!({"raw_response": reply})
    );
    server.join().expect("stub thread should finish");
}

#[test]
fn balanced_recovery_flag_recovers_first_object() {
    let image = temp_image("e2e-balanced", b"ridge");
    let reply = "Sure! {\"flood_risk\": \"low\"} and also {\"b\": 2}";
    let (host, server) = spawn_stub("200 OK", json!({"response": reply}));

    let assert = eco_cmd()
        .arg("hazard")
        .arg(&image)
        .args(["--host", &host, "--json", "--recovery", "balanced"])
        .assert()
        .success()
        .stderr(contains("model omitted expected fields: wildfire_risk"));

    assert_eq!(
        parse_stdout_json(&assert.get_output().stdout),
        json!({"flood_risk": "low"})
    );
    server.join().expect("stub thread should finish");
}

#[test]
fn api_error_is_reported() {
    let (host, server) = spawn_stub(
        "404 Not Found",
        json!({"error": "model 'nope' not found"}),
    );

    eco_cmd()
        .args(["translate", "hello", "--host", &host, "--model", "nope"])
        .assert()
        .failure()
        .stderr(contains("inference API error 404 Not Found").and(contains("model 'nope' not found")));

    server.join().expect("stub thread should finish");
}

#[test]
fn save_writes_the_record() {
    let output_path = unique_temp_path("save-dir").join("nested").join("record.json");
    let (host, server) = spawn_stub(
        "200 OK",
        json!({"response": "{\"translation\": \"Hervir el agua\"}"}),
    );

    eco_cmd()
        .args(["translate", "Boil water", "--language", "Spanish", "--host", &host])
        .arg("--save")
        .arg(&output_path)
        .assert()
        .success();

    let saved = fs::read_to_string(&output_path).expect("record should be saved");
    let saved: Value = serde_json::from_str(&saved).expect("saved record is JSON");
    assert_eq!(saved, json!({"translation": "Hervir el agua"}));
    server.join().expect("stub thread should finish");
}

#[test]
fn save_with_invalid_parent_path_returns_explicit_error() {
    let parent_file = unique_temp_path("save-invalid-parent");
    fs::write(&parent_file, "not a directory").expect("parent marker file should be writable");
    let output_path = parent_file.join("out.json");

    eco_cmd()
        .args(["translate", "hello", "--dry-run", "--save"])
        .arg(&output_path)
        .assert()
        .failure()
        .stderr(contains("Failed to create output directory"));
}

#[test]
fn profile_loads_model_host_and_recovery() {
    let config_path = unique_temp_path("config");
    fs::write(
        &config_path,
        "[profiles.field]\nmodel = \"llava:13b\"\nhost = \"http://10.0.0.5:11434\"\ntimeout = 45\nrecovery = \"balanced\"\n",
    )
    .expect("config should be writable");

    let assert = eco_cmd()
        .env("ECO_CONFIG", &config_path)
        .args(["translate", "hello", "--profile", "field", "--dry-run"])
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["model"], json!("llava:13b"));
    assert_eq!(body["url"], json!("http://10.0.0.5:11434/api/generate"));
    assert_eq!(body["timeout_secs"], json!(45));
    assert_eq!(body["recovery"], json!("balanced"));
}

#[test]
fn profile_is_not_implicit_when_not_passed() {
    let config_path = unique_temp_path("config-no-implicit");
    fs::write(&config_path, "[profiles.default]\nmodel = \"profile-model\"\n")
        .expect("config should be writable");

    let assert = eco_cmd()
        .env("ECO_CONFIG", &config_path)
        .args(["translate", "hello", "--dry-run"])
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["model"], json!("gemma3n:4b"));
}

#[test]
fn profile_env_and_cli_precedence_is_respected() {
    let config_path = unique_temp_path("precedence");
    fs::write(
        &config_path,
        "[profiles.field]\nmodel = \"profile-model\"\nhost = \"http://profile:11434\"\noutput = \"json\"\n",
    )
    .expect("config should be writable");

    let env_over_profile = eco_cmd()
        .env("ECO_CONFIG", &config_path)
        .env("ECO_MODEL", "env-model")
        .env("OLLAMA_HOST", "0.0.0.0:11434")
        .args(["translate", "hello", "--profile", "field", "--dry-run"])
        .assert()
        .success();

    let env_body = parse_stdout_json(&env_over_profile.get_output().stdout);
    assert_eq!(env_body["model"], json!("env-model"));
    assert_eq!(env_body["host"], json!("http://0.0.0.0:11434"));
    assert_eq!(env_body["output"], json!("json"));

    let cli_over_env = eco_cmd()
        .env("ECO_CONFIG", &config_path)
        .env("ECO_MODEL", "env-model")
        .env("ECO_HOST", "http://eco-host:11434")
        .env("OLLAMA_HOST", "0.0.0.0:11434")
        .args([
            "translate",
            "hello",
            "--profile",
            "field",
            "--model",
            "cli-model",
            "--output",
            "text",
            "--dry-run",
        ])
        .assert()
        .success();

    let cli_body = parse_stdout_json(&cli_over_env.get_output().stdout);
    assert_eq!(cli_body["model"], json!("cli-model"));
    assert_eq!(cli_body["host"], json!("http://eco-host:11434"));
    assert_eq!(cli_body["output"], json!("text"));
}

#[test]
fn invalid_env_recovery_returns_error() {
    eco_cmd()
        .env("ECO_RECOVERY", "greedy")
        .args(["translate", "hello", "--dry-run"])
        .assert()
        .failure()
        .stderr(contains(
            "Invalid recovery 'greedy'. Supported values: naive, balanced.",
        ));
}

#[test]
fn invalid_env_timeout_returns_error() {
    eco_cmd()
        .env("ECO_TIMEOUT", "soon")
        .args(["translate", "hello", "--dry-run"])
        .assert()
        .failure()
        .stderr(contains("Invalid ECO_TIMEOUT 'soon'"));
}

#[test]
fn profile_file_missing_returns_explicit_error() {
    let config_path = unique_temp_path("missing-config");

    eco_cmd()
        .env("ECO_CONFIG", &config_path)
        .args(["translate", "hello", "--profile", "field"])
        .assert()
        .failure()
        .stderr(contains("Failed to read config file"));
}

#[test]
fn profile_not_found_returns_error() {
    let config_path = unique_temp_path("profile-not-found");
    fs::write(&config_path, "[profiles.field]\nmodel = \"m\"\n")
        .expect("config should be writable");

    eco_cmd()
        .env("ECO_CONFIG", &config_path)
        .args(["translate", "hello", "--profile", "missing"])
        .assert()
        .failure()
        .stderr(contains("Profile 'missing' not found"));
}

#[test]
fn config_check_accepts_valid_file() {
    let config_path = unique_temp_path("check-ok");
    fs::write(&config_path, "[profiles.field]\nmodel = \"m\"\nrecovery = \"naive\"\n")
        .expect("config should be writable");

    eco_cmd()
        .env("ECO_CONFIG", &config_path)
        .args(["config", "check", "--profile", "field"])
        .assert()
        .success()
        .stdout(contains("config OK:").and(contains("profile 'field'")));
}

#[test]
fn config_check_rejects_invalid_output() {
    let config_path = unique_temp_path("check-bad");
    fs::write(&config_path, "[profiles.bad]\noutput = \"yaml\"\n")
        .expect("config should be writable");

    eco_cmd()
        .env("ECO_CONFIG", &config_path)
        .args(["config", "check"])
        .assert()
        .failure()
        .stderr(contains("invalid output 'yaml'"));
}

#[test]
fn verbose_logs_resolved_settings() {
    eco_cmd()
        .args(["translate", "hello", "--dry-run", "--verbose"])
        .assert()
        .success()
        .stderr(contains("resolved settings").and(contains("gemma3n:4b")));
}

#[test]
fn version_prints_build_metadata() {
    eco_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains("commit:").and(contains("built:")));
}

#[test]
fn completion_script_names_the_binary() {
    eco_cmd()
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(contains("ecosentinel"));
}
