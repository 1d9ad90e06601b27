//! vmflow の環境設定
//!
//! 設定はすべて環境変数から読み込む。先にカレントディレクトリと
//! `~/.config/vmflow/` の `.env` を読み込むが、プロセスの環境変数が常に優先される。

pub mod error;

pub use error::*;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vmflow_cloud::{Guardrail, PollConfig};

pub const TENANT_ID: &str = "AZ_TENANT_ID";
pub const CLIENT_ID: &str = "AZ_CLIENT_ID";
pub const CLIENT_SECRET: &str = "AZ_CLIENT_SECRET";
pub const SUBSCRIPTION_ID: &str = "AZ_SUBSCRIPTION_ID";
pub const RUN_DEPLOY: &str = "AZ_RUN_DEPLOY";
pub const TEST_PASS: &str = "AZ_TEST_PASS";
pub const MANAGEMENT_ENDPOINT: &str = "AZ_MANAGEMENT_ENDPOINT";
pub const LOGIN_ENDPOINT: &str = "AZ_LOGIN_ENDPOINT";
pub const POLL_TIMEOUT_SECS: &str = "AZ_POLL_TIMEOUT_SECS";

const REQUIRED: [&str; 4] = [TENANT_ID, CLIENT_ID, CLIENT_SECRET, SUBSCRIPTION_ID];

/// プロセス全体の設定
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub subscription_id: String,
    /// `AZ_RUN_DEPLOY`（未設定の場合、変更系操作はすべて拒否）
    pub run_deploy: bool,
    /// 要求にパスワードがない場合に使う管理者パスワード
    pub fallback_password: Option<String>,
    pub management_endpoint: Option<String>,
    pub login_endpoint: Option<String>,
    pub poll_timeout: Option<Duration>,
}

impl Settings {
    /// `.env` を読み込んでから環境変数を読む
    pub fn load() -> Result<Self> {
        for path in env_files() {
            load_env_file(&path)?;
        }
        Self::from_env()
    }

    /// プロセスの環境変数のみを読む
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の変数ソースから設定を組み立てる
    ///
    /// 空の値は未設定として扱う。
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let missing: Vec<String> = REQUIRED
            .iter()
            .filter(|name| get(**name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingVariables(missing));
        }
        let required = |name: &str| get(name).unwrap_or_default();

        let run_deploy = match get(RUN_DEPLOY) {
            Some(value) => parse_flag(RUN_DEPLOY, &value)?,
            None => false,
        };
        let poll_timeout = get(POLL_TIMEOUT_SECS)
            .map(|value| parse_secs(POLL_TIMEOUT_SECS, &value))
            .transpose()?;

        Ok(Self {
            tenant_id: required(TENANT_ID),
            client_id: required(CLIENT_ID),
            client_secret: required(CLIENT_SECRET),
            subscription_id: required(SUBSCRIPTION_ID),
            run_deploy,
            fallback_password: lookup(TEST_PASS).filter(|v| !v.is_empty()),
            management_endpoint: get(MANAGEMENT_ENDPOINT).map(|v| v.trim_end_matches('/').to_string()),
            login_endpoint: get(LOGIN_ENDPOINT).map(|v| v.trim_end_matches('/').to_string()),
            poll_timeout,
        })
    }

    pub fn guardrail(&self) -> Guardrail {
        Guardrail::new(self.run_deploy)
    }

    /// 設定されたタイムアウトを反映したポーリング設定
    pub fn poll_config(&self) -> PollConfig {
        match self.poll_timeout {
            Some(timeout) => PollConfig::default().with_timeout(timeout),
            None => PollConfig::default(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("subscription_id", &self.subscription_id)
            .field("run_deploy", &self.run_deploy)
            .field(
                "fallback_password",
                &self.fallback_password.as_ref().map(|_| "<redacted>"),
            )
            .field("management_endpoint", &self.management_endpoint)
            .field("login_endpoint", &self.login_endpoint)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

/// vmflow の設定ディレクトリ（`~/.config/vmflow`）
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("vmflow"))
}

/// 読み込む `.env` の候補（先のファイルが優先）
pub fn env_files() -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        files.push(cwd.join(".env"));
    }
    if let Some(dir) = config_dir() {
        files.push(dir.join(".env"));
    }
    files
}

/// `.env` を読み込む（設定済みの変数は上書きしない）
///
/// ファイルが存在したかどうかを返す。
pub fn load_env_file(path: &Path) -> Result<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    dotenvy::from_path(path).map_err(|e| ConfigError::EnvFile {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    tracing::debug!("Loaded environment from {}", path.display());
    Ok(true)
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("true/false を指定してください（指定値: '{}'）", value),
        }),
    }
}

fn parse_secs(name: &str, value: &str) -> Result<Duration> {
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("正の秒数を指定してください（指定値: '{}'）", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ALL: [&str; 9] = [
        TENANT_ID,
        CLIENT_ID,
        CLIENT_SECRET,
        SUBSCRIPTION_ID,
        RUN_DEPLOY,
        TEST_PASS,
        MANAGEMENT_ENDPOINT,
        LOGIN_ENDPOINT,
        POLL_TIMEOUT_SECS,
    ];

    /// 既知の変数をすべて解除してから `vars` を設定
    fn with_env<R>(vars: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
        let mut all: Vec<(&str, Option<&str>)> = ALL.iter().map(|name| (*name, None)).collect();
        for (name, value) in vars {
            all.retain(|(n, _)| n != name);
            all.push((*name, Some(*value)));
        }
        temp_env::with_vars(all, f)
    }

    fn identity() -> Vec<(&'static str, &'static str)> {
        vec![
            (TENANT_ID, "tenant-1"),
            (CLIENT_ID, "client-1"),
            (CLIENT_SECRET, "s3cr3t-value"),
            (SUBSCRIPTION_ID, "sub-1"),
        ]
    }

    #[test]
    fn test_from_env_defaults() {
        let settings = with_env(&identity(), Settings::from_env).unwrap();

        assert_eq!(settings.tenant_id, "tenant-1");
        assert_eq!(settings.subscription_id, "sub-1");
        assert!(!settings.run_deploy);
        assert!(!settings.guardrail().is_enabled());
        assert_eq!(settings.fallback_password, None);
        assert_eq!(settings.poll_config().timeout, PollConfig::default().timeout);
    }

    #[test]
    fn test_missing_variables_are_reported_together() {
        let vars = [(TENANT_ID, "tenant-1"), (CLIENT_SECRET, "  ")];
        let err = with_env(&vars, Settings::from_env).unwrap_err();

        match &err {
            ConfigError::MissingVariables(names) => {
                assert_eq!(names, &[CLIENT_ID, CLIENT_SECRET, SUBSCRIPTION_ID]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(err.to_string().contains("AZ_CLIENT_ID, AZ_CLIENT_SECRET"));
    }

    #[test]
    fn test_run_deploy_flag_values() {
        for (value, expected) in [("true", true), ("1", true), ("YES", true), ("on", true), ("false", false), ("0", false)] {
            let mut vars = identity();
            vars.push((RUN_DEPLOY, value));
            let settings = with_env(&vars, Settings::from_env).unwrap();
            assert_eq!(settings.run_deploy, expected, "AZ_RUN_DEPLOY={}", value);
        }

        let mut vars = identity();
        vars.push((RUN_DEPLOY, "maybe"));
        let err = with_env(&vars, Settings::from_env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == RUN_DEPLOY));
    }

    #[test]
    fn test_overrides() {
        let mut vars = identity();
        vars.extend([
            (TEST_PASS, "Fallback!Pw1"),
            (MANAGEMENT_ENDPOINT, "https://management.chinacloudapi.cn/"),
            (LOGIN_ENDPOINT, "https://login.chinacloudapi.cn"),
            (POLL_TIMEOUT_SECS, "900"),
        ]);
        let settings = with_env(&vars, Settings::from_env).unwrap();

        assert_eq!(settings.fallback_password.as_deref(), Some("Fallback!Pw1"));
        assert_eq!(
            settings.management_endpoint.as_deref(),
            Some("https://management.chinacloudapi.cn")
        );
        assert_eq!(settings.login_endpoint.as_deref(), Some("https://login.chinacloudapi.cn"));
        assert_eq!(settings.poll_config().timeout, Duration::from_secs(900));

        let mut vars = identity();
        vars.push((POLL_TIMEOUT_SECS, "soon"));
        assert!(with_env(&vars, Settings::from_env).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut vars = identity();
        vars.push((TEST_PASS, "Fallback!Pw1"));
        let settings = with_env(&vars, Settings::from_env).unwrap();

        let debug = format!("{:?}", settings);
        assert!(!debug.contains("s3cr3t-value"));
        assert!(!debug.contains("Fallback!Pw1"));
        assert!(debug.contains("tenant-1"));
    }

    #[test]
    fn test_env_file_does_not_override_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(
            &path,
            "AZ_TENANT_ID=from-file\nAZ_CLIENT_ID=client-file\nAZ_CLIENT_SECRET=secret-file\nAZ_SUBSCRIPTION_ID=sub-file\nAZ_RUN_DEPLOY=true\n",
        )
        .unwrap();

        let settings = with_env(&[(TENANT_ID, "from-env")], || {
            assert!(load_env_file(&path).unwrap());
            Settings::from_env()
        })
        .unwrap();

        assert_eq!(settings.tenant_id, "from-env");
        assert_eq!(settings.client_id, "client-file");
        assert!(settings.run_deploy);
    }

    #[test]
    fn test_missing_env_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!load_env_file(&dir.path().join(".env")).unwrap());
    }

    #[test]
    fn test_env_files_order() {
        let files = env_files();
        assert!(files[0].ends_with(".env"));
        if let Some(dir) = config_dir() {
            assert_eq!(files.last(), Some(&dir.join(".env")));
        }
    }
}
