use assert_cmd::Command;
use std::fs;
use tempfile::TempDir;

const AZ_VARS: [&str; 9] = [
    "AZ_TENANT_ID",
    "AZ_CLIENT_ID",
    "AZ_CLIENT_SECRET",
    "AZ_SUBSCRIPTION_ID",
    "AZ_RUN_DEPLOY",
    "AZ_TEST_PASS",
    "AZ_MANAGEMENT_ENDPOINT",
    "AZ_LOGIN_ENDPOINT",
    "AZ_POLL_TIMEOUT_SECS",
];

/// Isolated working directory and home for one CLI run
pub struct TestEnv {
    pub root: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("home/.config")).unwrap();
        Self { root }
    }

    #[allow(dead_code)]
    pub fn write_env_file(&self, content: &str) {
        fs::write(self.root.path().join(".env"), content).unwrap();
    }

    /// `vmflow` with no Azure variables and no user configuration
    #[allow(deprecated)]
    pub fn vmflow(&self) -> Command {
        let mut cmd = Command::cargo_bin("vmflow").unwrap();
        for var in AZ_VARS {
            cmd.env_remove(var);
        }
        let home = self.root.path().join("home");
        cmd.current_dir(self.root.path())
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", home.join(".config"));
        cmd
    }
}
