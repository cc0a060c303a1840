use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use tempfile::TempDir;

fn tracker_bin_path() -> PathBuf {
    PathBuf::from(assert_cmd::cargo::cargo_bin!("grant-tracker"))
}

struct DaemonProcess {
    child: Child,
    binary: PathBuf,
    home: PathBuf,
}

impl DaemonProcess {
    fn start(binary: PathBuf, home: PathBuf) -> Self {
        let child = Command::new(&binary)
            .env("HOME", &home)
            .env("USERPROFILE", &home)
            .env("GRANT_TRACKER_ACCESS_TOKEN", "test-token")
            .args(["daemon", "start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");

        Self {
            child,
            binary,
            home,
        }
    }

    fn stop(&mut self) {
        let _ = Command::new(&self.binary)
            .env("HOME", &self.home)
            .env("USERPROFILE", &self.home)
            .args(["daemon", "stop"])
            .status();

        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            sleep(Duration::from_millis(50));
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    fn exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

fn daemon_status(binary: &Path, home: &Path) -> Option<serde_json::Value> {
    let output = Command::new(binary)
        .env("HOME", home)
        .env("USERPROFILE", home)
        .args(["daemon", "status"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    serde_json::from_slice(&output.stdout).ok()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

#[test]
fn daemon_starts_reports_status_and_stops() {
    let home = TempDir::new().expect("home");
    let binary = tracker_bin_path();
    let mut daemon = DaemonProcess::start(binary.clone(), home.path().to_path_buf());

    let mut status = None;
    assert!(
        wait_until(Duration::from_secs(5), || {
            status = daemon_status(&binary, home.path())
                .filter(|v| v["running"].as_bool().unwrap_or(false));
            status.is_some()
        }),
        "daemon did not report running state in time",
    );
    let status = status.expect("status");
    assert_eq!(status["scheduler"]["concurrency"], 3);
    assert_eq!(status["scheduler"]["completed"], 0);

    daemon.stop();
    assert!(
        wait_until(Duration::from_secs(2), || daemon.exited()),
        "daemon process did not exit after stop",
    );
    let after = daemon_status(&binary, home.path()).expect("status after stop");
    assert_eq!(after["running"], false);
}
