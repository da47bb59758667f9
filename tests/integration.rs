//! End-to-end tests for the webscenario CLI
//!
//! These tests run the built binary with an isolated configuration and data
//! directory. Only the ignored test needs a real WebDriver server.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Test context with paths and cleanup
struct TestContext {
    /// Temporary directory for this test
    temp_dir: PathBuf,
    /// Path to the webscenario binary
    bin: PathBuf,
    /// Path to fixtures directory
    fixtures_dir: PathBuf,
    /// Config directory (XDG_CONFIG_HOME)
    config_dir: PathBuf,
    /// Data directory (XDG_DATA_HOME)
    data_dir: PathBuf,
}

/// Captured process output
struct Output {
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl TestContext {
    /// Create a new test context
    fn new(test_name: &str) -> Self {
        let temp_dir = env::temp_dir().join("webscenario-tests").join(test_name);

        // Clean up any previous test artifacts
        let _ = fs::remove_dir_all(&temp_dir);
        fs::create_dir_all(&temp_dir).expect("Failed to create temp dir");

        let config_dir = temp_dir.join("config");
        let data_dir = temp_dir.join("data");
        fs::create_dir_all(&config_dir).expect("Failed to create config dir");
        fs::create_dir_all(&data_dir).expect("Failed to create data dir");

        let manifest_dir = env!("CARGO_MANIFEST_DIR");
        let fixtures_dir = PathBuf::from(manifest_dir).join("tests").join("fixtures");

        let ctx = Self {
            temp_dir,
            bin: PathBuf::from(env!("CARGO_BIN_EXE_webscenario")),
            fixtures_dir,
            config_dir,
            data_dir,
        };
        // Never reach for a real driver unless a test asks for one
        ctx.write_config(&ctx.config_with_driver("http://127.0.0.1:9", None));
        ctx
    }

    fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Config pointing at `url`; a driver path also enables spawning it
    fn config_with_driver(&self, url: &str, path: Option<&Path>) -> String {
        let driver = match path {
            Some(path) => format!("spawn = true\npath = {:?}", path.display().to_string()),
            None => "spawn = false".to_string(),
        };
        format!(
            r#"
[target]
base_url = "http://127.0.0.1:3000"

[driver]
url = "{url}"
{driver}

[credentials]
email = "admin@example.com"
password = "secret"
"#
        )
    }

    fn write_config(&self, content: &str) {
        fs::write(self.config_path(), content).expect("Failed to write config");
    }

    fn fixture(&self, name: &str) -> PathBuf {
        self.fixtures_dir.join(name)
    }

    /// Run webscenario with the given arguments
    fn run(&self, args: &[&str]) -> Output {
        let output = Command::new(&self.bin)
            .args(args)
            .env("WEBSCENARIO_CONFIG", self.config_path())
            .env("XDG_CONFIG_HOME", &self.config_dir)
            .env("XDG_DATA_HOME", &self.data_dir)
            .env_remove("WEBSCENARIO_BASE_URL")
            .env_remove("WEBSCENARIO_WEBDRIVER_URL")
            .env_remove("WEBSCENARIO_EMAIL")
            .env_remove("WEBSCENARIO_PASSWORD")
            .env("NO_COLOR", "1")
            .output()
            .expect("Failed to execute webscenario");

        Output {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }

    fn run_path(&self, command: &str, path: &Path) -> Output {
        self.run(&[command, path.to_str().expect("utf-8 path")])
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.temp_dir);
    }
}

/// Check if a WebDriver server executable is available
fn chromedriver_available() -> Option<PathBuf> {
    which::which("chromedriver").ok()
}

// ============== Tests ==============

#[test]
fn test_validate_lists_steps_with_fragments() {
    let ctx = TestContext::new("validate_ok");
    let output = ctx.run_path("validate", &ctx.fixture("login.yaml"));

    assert_eq!(output.code, Some(0), "stderr: {}", output.stderr);
    assert!(output.stdout.contains("(6 steps)"), "stdout: {}", output.stdout);
    assert!(output.stdout.contains("1. navigate /login"), "stdout: {}", output.stdout);
    assert!(output.stdout.contains("4. click role=button"), "stdout: {}", output.stdout);
    assert!(!output.stdout.contains("warning:"));
}

#[test]
fn test_validate_warns_on_brittle_steps() {
    let ctx = TestContext::new("validate_brittle");
    let output = ctx.run_path("validate", &ctx.fixture("brittle.yaml"));

    assert_eq!(output.code, Some(0), "stderr: {}", output.stderr);
    assert!(output.stdout.contains("step 2: fixed sleep of 2000 ms"), "stdout: {}", output.stdout);
    assert!(output.stdout.contains("step 3: positional locator"), "stdout: {}", output.stdout);
}

#[test]
fn test_validate_rejects_invalid_scenario() {
    let ctx = TestContext::new("validate_invalid");
    let output = ctx.run_path("validate", &ctx.fixture("invalid.yaml"));

    assert_eq!(output.code, Some(2));
    assert!(output.stderr.contains("Error:"), "stderr: {}", output.stderr);
    assert!(output.stderr.contains("exactly one of"), "stderr: {}", output.stderr);
}

#[test]
fn test_validate_missing_file() {
    let ctx = TestContext::new("validate_missing");
    let output = ctx.run_path("validate", &ctx.temp_dir.join("nope.yaml"));

    assert_eq!(output.code, Some(2));
    assert!(output.stderr.contains("nope.yaml"), "stderr: {}", output.stderr);
}

#[test]
fn test_validate_undefined_variable() {
    let ctx = TestContext::new("validate_undefined_var");
    ctx.write_config("[target]\nbase_url = \"http://127.0.0.1:3000\"\n");
    let output = ctx.run_path("validate", &ctx.fixture("login.yaml"));

    assert_eq!(output.code, Some(2));
    assert!(output.stderr.contains("undefined variable 'email'"), "stderr: {}", output.stderr);
}

#[test]
fn test_run_without_driver_errors() {
    let ctx = TestContext::new("run_no_driver");
    let output = ctx.run_path("run", &ctx.fixture("login.yaml"));

    assert_eq!(output.code, Some(2));
    assert!(
        output.stderr.contains("WebDriver not reachable"),
        "stderr: {}",
        output.stderr
    );
}

#[test]
fn test_invalid_config_is_reported() {
    let ctx = TestContext::new("bad_config");
    ctx.write_config("[timeouts]\naction_ms = \"soon\"\n");
    let output = ctx.run_path("validate", &ctx.fixture("brittle.yaml"));

    assert_eq!(output.code, Some(2));
    assert!(output.stderr.contains("Error:"), "stderr: {}", output.stderr);
}

#[test]
fn test_suite_empty_directory() {
    let ctx = TestContext::new("suite_empty");
    let dir = ctx.temp_dir.join("empty");
    fs::create_dir_all(&dir).unwrap();

    let output = ctx.run_path("suite", &dir);

    assert_eq!(output.code, Some(0), "stderr: {}", output.stderr);
    assert!(output.stdout.contains("No scenarios found"), "stdout: {}", output.stdout);
}

#[test]
fn test_suite_tag_filter_without_matches() {
    let ctx = TestContext::new("suite_tag");
    let dir = ctx.temp_dir.join("suite");
    fs::create_dir_all(&dir).unwrap();
    fs::copy(ctx.fixture("brittle.yaml"), dir.join("brittle.yaml")).unwrap();

    let output = ctx.run(&["suite", dir.to_str().unwrap(), "--tag", "smoke"]);

    assert_eq!(output.code, Some(0), "stderr: {}", output.stderr);
    assert!(output.stdout.contains("No scenarios found"), "stdout: {}", output.stdout);
}

#[test]
fn test_bundled_scenarios_validate() {
    let ctx = TestContext::new("bundled");
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios");

    let mut count = 0;
    for entry in fs::read_dir(&dir).expect("scenarios directory") {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        let output = ctx.run_path("validate", &path);
        assert_eq!(
            output.code,
            Some(0),
            "{} failed to validate: {}",
            path.display(),
            output.stderr
        );
        assert!(
            !output.stdout.contains("warning:"),
            "{} has warnings: {}",
            path.display(),
            output.stdout
        );
        count += 1;
    }
    assert!(count >= 4, "expected bundled scenarios, found {}", count);
}

#[test]
#[ignore = "requires chromedriver"]
fn test_run_against_real_browser() {
    let driver = match chromedriver_available() {
        Some(path) => path,
        None => {
            eprintln!("Skipping test: chromedriver not found");
            return;
        }
    };

    let ctx = TestContext::new("real_browser");
    ctx.write_config(&ctx.config_with_driver("http://127.0.0.1:9617", Some(&driver)));

    let output = ctx.run_path("run", &ctx.fixture("data_url.yaml"));

    assert_eq!(output.code, Some(0), "stdout: {}\nstderr: {}", output.stdout, output.stderr);
    assert!(output.stdout.contains("data url"), "stdout: {}", output.stdout);

    let report = ctx.data_dir.join("webscenario").join("reports").join("data_url.json");
    assert!(report.exists(), "missing report at {}", report.display());
}
