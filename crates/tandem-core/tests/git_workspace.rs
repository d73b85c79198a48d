//! End-to-end runs against a real git repository on disk.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use chrono::NaiveDate;
use tandem_core::collab::fs::MANIFEST_FILE;
use tandem_core::collab::{Environment, FsWorkspace, GitCli, ShellTestRunner};
use tandem_core::graph::Namespace;
use tandem_core::publish::ActionMode;
use tandem_core::publish::script::{COMMIT_SCRIPT, PUBLISH_SCRIPT};
use tandem_core::run::{RunOptions, resolve_and_version};
use tandem_core::{ErrorCode, TandemError, Version};
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn write_package(root: &Path, dir: &str, json: &str) {
    let pkg = root.join(dir);
    fs::create_dir_all(&pkg).expect("mkdir");
    fs::write(pkg.join(MANIFEST_FILE), json).expect("write manifest");
}

fn commit_all(root: &Path, message: &str) {
    git(root, &["add", "-A"]);
    git(root, &["commit", "-q", "-m", message]);
}

/// Repository with `@x/app` depending on `@x/lib`, both recorded at 1.x.
fn repo() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    let root = dir.path();
    git(root, &["init", "-q"]);
    git(root, &["config", "user.name", "Tandem Test"]);
    git(root, &["config", "user.email", "test@example.com"]);
    git(root, &["config", "commit.gpgsign", "false"]);

    write_package(
        root,
        "lib",
        r#"{
    "name": "@x/lib",
    "version": "1.2.0",
    "scripts": { "test": "test -f package.json" }
}
"#,
    );
    write_package(
        root,
        "app",
        r#"{
    "name": "@x/app",
    "version": "1.0.0",
    "private": false,
    "dependencies": { "@x/lib": "^1.2.0", "left-pad": "^1.3.0" }
}
"#,
    );
    commit_all(root, "version @x/lib to 1.2.0");
    fs::write(root.join("app/index.js"), "module.exports = 1;\n").expect("write");
    commit_all(root, "version @x/app to 1.0.0");

    fs::write(root.join("lib/index.js"), "export const pad = 1;\n").expect("write");
    commit_all(root, "#feature padding helpers #changelog");
    dir
}

fn options(root: &Path) -> RunOptions {
    RunOptions {
        today: NaiveDate::from_ymd_opt(2026, 5, 2),
        lock_path: Some(root.join(".tandem/run.lock")),
        ..RunOptions::new(Namespace::new("@x/"))
    }
}

fn roots() -> Vec<String> {
    vec!["@x/app".to_string()]
}

#[test]
fn deferred_run_writes_manifests_changelog_and_scripts() {
    let dir = repo();
    let root = dir.path();
    let ws = FsWorkspace::new(root, Namespace::new("@x/"));
    let runner = ShellTestRunner::new(Duration::from_secs(30));
    let env = Environment {
        manifests: &ws,
        vcs: &GitCli,
        tests: &runner,
        publisher: &ws,
    };

    let report = resolve_and_version(&roots(), &options(root), env).expect("run");

    assert_eq!(report.package("@x/lib").map(|p| p.next.clone()), Some(Version::new(1, 3, 0)));
    assert_eq!(report.package("@x/app").map(|p| p.next.clone()), Some(Version::new(1, 0, 1)));

    let app = fs::read_to_string(root.join("app").join(MANIFEST_FILE)).expect("app manifest");
    let app: serde_json::Value = serde_json::from_str(&app).expect("json");
    assert_eq!(app["version"], "1.0.1");
    assert_eq!(app["dependencies"]["@x/lib"], "^1.3.0");
    assert_eq!(app["dependencies"]["left-pad"], "^1.3.0");
    assert_eq!(app["private"], false);

    let changelog = fs::read_to_string(root.join("lib/CHANGELOG.md")).expect("changelog");
    assert!(changelog.contains("1.3.0"));
    assert!(changelog.contains("padding helpers"));

    for pkg in ["lib", "app"] {
        assert!(root.join(pkg).join(COMMIT_SCRIPT).is_file());
        assert!(root.join(pkg).join(PUBLISH_SCRIPT).is_file());
    }
    let commit = fs::read_to_string(root.join("lib").join(COMMIT_SCRIPT)).expect("script");
    assert!(commit.contains("version @x/lib to 1.3.0"));
}

#[test]
fn immediate_run_commits_and_next_run_is_quiet() {
    let dir = repo();
    let root = dir.path();
    let published = TempDir::new().expect("tempdir");
    let log = published.path().join("published.log");
    let ws = FsWorkspace::new(root, Namespace::new("@x/"))
        .with_publish_command(&format!("echo {{version}} >> {}", log.display()));
    let runner = ShellTestRunner::default();
    let env = Environment {
        manifests: &ws,
        vcs: &GitCli,
        tests: &runner,
        publisher: &ws,
    };
    let opts = RunOptions {
        actions: ActionMode::Immediate,
        ..options(root)
    };

    let first = resolve_and_version(&roots(), &opts, env).expect("first run");
    assert_eq!(first.staged.len(), 2);
    assert_eq!(fs::read_to_string(&log).expect("publish log"), "1.3.0\n1.0.1\n");

    let head = git(root, &["log", "-1", "--format=%s"]);
    assert_eq!(head.trim(), "version @x/app to 1.0.1");
    assert!(git(root, &["status", "-s", "--", "lib", "app"]).trim().is_empty());

    let second = resolve_and_version(&roots(), &opts, env).expect("second run");
    assert!(second.staged.is_empty());
    assert_eq!(
        second.package("@x/lib").map(|p| p.current.clone()),
        Some(Version::new(1, 3, 0))
    );
}

#[test]
fn dirty_package_blocks_real_run() {
    let dir = repo();
    let root = dir.path();
    fs::write(root.join("lib/scratch.txt"), "wip").expect("write");

    let ws = FsWorkspace::new(root, Namespace::new("@x/"));
    let runner = ShellTestRunner::default();
    let env = Environment {
        manifests: &ws,
        vcs: &GitCli,
        tests: &runner,
        publisher: &ws,
    };

    let err = resolve_and_version(&roots(), &options(root), env).expect_err("dirty");
    assert_eq!(err.code(), ErrorCode::NotEligible);
    let TandemError::NotEligible { failures } = err else {
        unreachable!()
    };
    assert_eq!(failures.len(), 1);
    assert!(failures[0].to_string().contains("scratch.txt"));

    let lib = fs::read_to_string(root.join("lib").join(MANIFEST_FILE)).expect("manifest");
    assert!(lib.contains("\"1.2.0\""));
}
