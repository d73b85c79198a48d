//! E2E release workflow: `tandem graph` → `tandem version` → `tandem publish`.

#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::Command as StdCommand;
use tempfile::TempDir;

fn tandem_cmd(workspace: &Path, config_home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tandem"));
    cmd.current_dir(workspace);
    cmd.env("TANDEM_LOG", "error");
    cmd.env("XDG_CONFIG_HOME", config_home);
    cmd.env_remove("FORMAT");
    cmd.env_remove("TANDEM_WORKSPACE");
    cmd
}

fn git(dir: &Path, args: &[&str]) {
    let status = StdCommand::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        status.status.success(),
        "git {args:?}: {}",
        String::from_utf8_lossy(&status.stderr)
    );
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, content).expect("write");
}

struct Fixture {
    repo: TempDir,
    home: TempDir,
}

impl Fixture {
    /// `@acme/app` depends on `@acme/lib`; `lib` has a feature since 0.4.0.
    fn new() -> Self {
        let repo = TempDir::new().expect("tempdir");
        let home = TempDir::new().expect("tempdir");
        let root = repo.path();

        git(root, &["init", "-q"]);
        git(root, &["config", "user.name", "Tandem Test"]);
        git(root, &["config", "user.email", "test@example.com"]);
        git(root, &["config", "commit.gpgsign", "false"]);

        write(
            &root.join(".tandem/config.toml"),
            "[packages]\nnamespace = \"@acme/\"\n\n[publish]\ncommand = \"echo {version} > ../published-$(basename $PWD).txt\"\n",
        );
        write(
            &root.join("lib/package.json"),
            "{\n    \"name\": \"@acme/lib\",\n    \"version\": \"0.4.0\",\n    \"scripts\": { \"test\": \"true\" }\n}\n",
        );
        write(
            &root.join("app/package.json"),
            "{\n    \"name\": \"@acme/app\",\n    \"version\": \"1.2.0\",\n    \"dependencies\": { \"@acme/lib\": \"~0.4.0\" }\n}\n",
        );
        fs::write(root.join(".gitignore"), ".tandem/run.lock\npublished-*.txt\n").expect("gitignore");
        git(root, &["add", "-A"]);
        git(root, &["commit", "-q", "-m", "version @acme/lib to 0.4.0"]);
        write(&root.join("app/index.js"), "module.exports = {};\n");
        git(root, &["add", "-A"]);
        git(root, &["commit", "-q", "-m", "version @acme/app to 1.2.0"]);
        write(&root.join("lib/index.js"), "export const fmt = 1;\n");
        git(root, &["add", "-A"]);
        git(root, &["commit", "-q", "-m", "feat: number formatting #changelog"]);

        Self { repo, home }
    }

    fn root(&self) -> &Path {
        self.repo.path()
    }

    fn cmd(&self) -> Command {
        tandem_cmd(self.root(), self.home.path())
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().args(args).arg("--json").output().expect("run tandem");
        assert!(
            output.status.success(),
            "tandem {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("valid JSON")
    }
}

#[test]
fn graph_shows_closure_without_running_tests() {
    let fx = Fixture::new();
    let json = fx.json(&["graph", "app"]);

    assert_eq!(json["root"], "@acme/app");
    let packages = json["packages"].as_array().expect("packages");
    assert_eq!(packages.len(), 2);
    assert_eq!(packages[0]["name"], "@acme/lib");
    assert_eq!(packages[0]["references"], 1);
    assert_eq!(packages[0]["next"], "0.5.0");
    assert_eq!(packages[1]["next"], "1.2.1");
    assert!(json["cycles"].as_array().expect("cycles").is_empty());
}

#[test]
fn dry_run_reports_without_writing() {
    let fx = Fixture::new();
    let before = fs::read_to_string(fx.root().join("app/package.json")).expect("read");

    let json = fx.json(&["version", "app", "--dry-run"]);

    assert_eq!(json["simulate"], true);
    assert_eq!(json["materialized"], false);
    assert_eq!(json["packages"]["@acme/lib"]["next"], "0.5.0");
    assert_eq!(json["packages"]["@acme/app"]["bump_required"], true);
    assert_eq!(json["staged"][1]["manifest"]["dependencies"]["@acme/lib"], "~0.5.0");

    let after = fs::read_to_string(fx.root().join("app/package.json")).expect("read");
    assert_eq!(before, after);
    assert!(!fx.root().join("app/publish.bounty").exists());
}

#[test]
fn version_from_package_directory_then_publish() {
    let fx = Fixture::new();

    // No names: the package in the current directory is the root.
    tandem_cmd(&fx.root().join("app"), fx.home.path())
        .args(["version", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("@acme/app  1.2.0  1.2.1  true  ok"));

    let app: Value = serde_json::from_str(
        &fs::read_to_string(fx.root().join("app/package.json")).expect("read"),
    )
    .expect("json");
    assert_eq!(app["version"], "1.2.1");
    assert_eq!(app["dependencies"]["@acme/lib"], "~0.5.0");
    assert!(
        fs::read_to_string(fx.root().join("lib/CHANGELOG.md"))
            .expect("changelog")
            .starts_with("## [v0.5.0] - ")
    );

    let report = fx.json(&["publish"]);
    let steps = report["steps"].as_array().expect("steps");
    assert_eq!(steps.len(), 2);
    assert!(steps.iter().all(|s| s["committed"] == true && s["published"] == true));
    assert_eq!(
        fs::read_to_string(fx.root().join("published-lib.txt")).expect("published"),
        "0.5.0\n"
    );
    assert!(!fx.root().join("lib/publish.bounty").exists());

    // Everything is recorded: the next run has nothing to do.
    let json = fx.json(&["version", "app"]);
    assert!(json["staged"].as_array().expect("staged").is_empty());
}

#[test]
fn dirty_package_fails_with_error_code() {
    let fx = Fixture::new();
    fs::write(fx.root().join("lib/wip.txt"), "todo").expect("write");

    fx.cmd()
        .args(["version", "app", "--format", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not eligible"))
        .stderr(predicate::str::contains("wip.txt"));

    assert!(!fx.root().join("lib/commit.bounty").exists());

    // A dry run still completes and reports the problem.
    let json = fx.json(&["version", "app", "--dry-run"]);
    assert_eq!(
        json["packages"]["@acme/lib"]["eligibility"]["reason"]["kind"],
        "dirty_working_tree"
    );
}

#[test]
fn unknown_package_is_reported() {
    let fx = Fixture::new();
    let output = fx
        .cmd()
        .args(["version", "nope", "--json"])
        .output()
        .expect("run tandem");
    assert!(!output.status.success());
    let json: Value = serde_json::from_slice(&output.stderr).expect("JSON error");
    assert!(json["error"]["message"].as_str().expect("message").contains("@acme/nope"));
    assert!(json["error"]["error_code"].as_str().expect("code").starts_with('E'));
}

#[test]
fn completions_name_the_binary() {
    let home = TempDir::new().expect("tempdir");
    tandem_cmd(home.path(), home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tandem"));
}
