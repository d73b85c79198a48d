//! Test execution through `sh -c` with a time budget.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{TestOutcome, TestRunner};
use crate::manifest::Manifest;

pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Lines of stderr kept for failure reports.
const OUTPUT_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct ShellTestRunner {
    timeout: Duration,
}

impl Default for ShellTestRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TEST_TIMEOUT)
    }
}

impl ShellTestRunner {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn wait(&self, mut child: Child) -> TestOutcome {
        let start = Instant::now();
        let reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf);
                buf
            })
        });

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let output = reader
                        .and_then(|handle| handle.join().ok())
                        .unwrap_or_default();
                    return TestOutcome {
                        passed: status.success(),
                        exit_code: status.code(),
                        timed_out: false,
                        output: tail(&output),
                    };
                }
                Ok(None) => {
                    if start.elapsed() >= self.timeout {
                        kill_tree(&mut child);
                        let _ = child.wait();
                        return TestOutcome {
                            passed: false,
                            exit_code: None,
                            timed_out: true,
                            output: format!("killed after {}s", self.timeout.as_secs()),
                        };
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    kill_tree(&mut child);
                    return TestOutcome::failed(None, format!("failed to wait for tests: {e}"));
                }
            }
        }
    }
}

/// Kill the test process and everything it started. Tests run in their own
/// process group, so the group id is the child's pid.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let killed = i32::try_from(child.id())
        .map_err(|e| e.to_string())
        .and_then(|pid| killpg(Pid::from_raw(pid), Signal::SIGKILL).map_err(|e| e.to_string()));
    if let Err(e) = killed {
        warn!(pid = child.id(), error = %e, "failed to kill test process group, killing shell only");
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

fn tail(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    lines[start..].join("\n")
}

impl TestRunner for ShellTestRunner {
    fn run_tests(&self, manifest: &Manifest) -> TestOutcome {
        let Some(command) = manifest.test_command() else {
            debug!(package = %manifest.name, "no test script");
            return TestOutcome::passed();
        };

        debug!(package = %manifest.name, command, "running tests");
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command])
            .current_dir(&manifest.location)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let spawned = cmd.spawn();

        match spawned {
            Ok(child) => self.wait(child),
            Err(e) => {
                warn!(package = %manifest.name, %e, "failed to spawn tests");
                TestOutcome::failed(None, format!("failed to spawn `sh -c {command}`: {e}"))
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(dir: &TempDir, script: Option<&str>) -> Manifest {
        let m = Manifest::new("@x/a", "1.0.0", dir.path());
        match script {
            Some(s) => m.with_test_script(s),
            None => m,
        }
    }

    #[test]
    fn missing_script_passes() {
        let dir = TempDir::new().expect("tempdir");
        assert!(ShellTestRunner::default().run_tests(&manifest(&dir, None)).passed);
    }

    #[test]
    fn exit_status_decides() {
        let dir = TempDir::new().expect("tempdir");
        let runner = ShellTestRunner::default();
        assert!(runner.run_tests(&manifest(&dir, Some("true"))).passed);

        let failed = runner.run_tests(&manifest(&dir, Some("echo boom >&2; exit 4")));
        assert!(!failed.passed);
        assert_eq!(failed.exit_code, Some(4));
        assert_eq!(failed.output, "boom");
    }

    #[test]
    fn runs_in_package_directory() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("marker"), "").expect("write");
        let outcome = ShellTestRunner::default().run_tests(&manifest(&dir, Some("test -f marker")));
        assert!(outcome.passed);
    }

    #[test]
    fn hung_tests_time_out() {
        let dir = TempDir::new().expect("tempdir");
        let runner = ShellTestRunner::new(Duration::from_millis(200));
        let outcome = runner.run_tests(&manifest(&dir, Some("exec sleep 5")));
        assert!(!outcome.passed);
        assert!(outcome.timed_out);
        assert!(outcome.detail().starts_with("timed out"));
    }

    #[test]
    fn timeout_kills_processes_started_by_tests() {
        let dir = TempDir::new().expect("tempdir");
        let pid_file = dir.path().join("sleeper.pid");
        let runner = ShellTestRunner::new(Duration::from_millis(300));
        let outcome = runner.run_tests(&manifest(&dir, Some("sleep 30 & echo $! > sleeper.pid; wait")));
        assert!(outcome.timed_out);

        let pid = std::fs::read_to_string(&pid_file).expect("pid file");
        let pid = pid.trim();
        // A reaped or zombie process counts as gone.
        let running = || {
            let out = Command::new("ps")
                .args(["-o", "stat=", "-p", pid])
                .output()
                .expect("run ps");
            let stat = String::from_utf8_lossy(&out.stdout);
            !stat.trim().is_empty() && !stat.trim_start().starts_with('Z')
        };
        let deadline = Instant::now() + Duration::from_secs(2);
        while running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(!running(), "sleep {pid} outlived the timeout");
    }

    #[test]
    fn tail_keeps_last_lines() {
        let text = (0..30).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let kept = tail(&text);
        assert!(kept.starts_with("10\n"));
        assert!(kept.ends_with("29"));
    }
}
