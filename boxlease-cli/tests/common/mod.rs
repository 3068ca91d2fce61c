use assert_cmd::Command;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_boxlease");

/// One isolated home per test, so tests never contend for the lease.
pub struct TestContext {
    pub cmd: Command,
    pub home: TempDir,
    /// Prepared box root passed with `--rootfs`.
    pub rootfs: TempDir,
}

impl TestContext {
    /// Another invocation against the same home (a separate process).
    pub fn new_cmd(&self) -> Command {
        command_for(self.home.path())
    }

    #[allow(dead_code)]
    pub fn rootfs_arg(&self) -> String {
        self.rootfs.path().to_string_lossy().into_owned()
    }

    /// Create a detached box and return its id.
    #[allow(dead_code)]
    pub fn create_box(&self, extra: &[&str]) -> String {
        let mut cmd = self.new_cmd();
        cmd.arg("create").args(extra).args(["--rootfs", &self.rootfs_arg()]);
        let output = cmd.assert().success().get_output().clone();
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        assert_eq!(id.len(), 26, "expected a box id, got {:?}", id);
        id
    }

    /// `info --format json` for a box, parsed.
    #[allow(dead_code)]
    pub fn info(&self, target: &str) -> serde_json::Value {
        let mut cmd = self.new_cmd();
        cmd.args(["info", target, "--format", "json"]);
        let output = cmd.assert().success().get_output().clone();
        serde_json::from_slice(&output.stdout).expect("info output is JSON")
    }

    /// Ids of every box in the home, running or not.
    #[allow(dead_code)]
    pub fn all_ids(&self) -> Vec<String> {
        list_all_ids(self.home.path())
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        // Detached supervisors outlive the CLI; stop them before the home goes away.
        let ids = list_all_ids(self.home.path());
        if ids.is_empty() {
            return;
        }
        let _ = std::process::Command::new(BIN)
            .arg("--home")
            .arg(self.home.path())
            .args(["rm", "-f"])
            .args(&ids)
            .output();
    }
}

fn command_for(home: &Path) -> Command {
    let mut cmd = Command::new(BIN);
    // You can override this with .timeout(Duration::from_secs(N))
    cmd.timeout(Duration::from_secs(60));
    cmd.arg("--home").arg(home);
    cmd.env_remove("BOXLEASE_HOME");
    cmd
}

fn list_all_ids(home: &Path) -> Vec<String> {
    std::process::Command::new(BIN)
        .arg("--home")
        .arg(home)
        .args(["list", "-a", "-q"])
        .output()
        .map(|out| {
            String::from_utf8_lossy(&out.stdout)
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

pub fn boxlease() -> TestContext {
    let home = tempfile::tempdir().expect("create test home");
    let rootfs = tempfile::tempdir().expect("create test rootfs");
    let cmd = command_for(home.path());

    TestContext { cmd, home, rootfs }
}
