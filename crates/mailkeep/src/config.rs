//! Configuration loading.
//!
//! Sources, later ones winning: built-in defaults, a JSON file, then
//! environment variables. A `.env` file is read by `main` before any of
//! this runs and never overrides variables already set.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

use mailkeep_core::{AccountFolders, ImapAccount, ImapConnector, RetryPolicy, SyncOptions};
use mailkeep_imap::Security;

/// Folders synced when an account does not list any.
pub const DEFAULT_FOLDERS: [&str; 3] = ["INBOX", "Sent", "Junk"];

/// Name of the account defined through `IMAP_*` variables.
const ENV_ACCOUNT: &str = "default";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory of the raw message archive.
    pub archive_root: PathBuf,
    /// Path of the `SQLite` state database.
    pub state_db: PathBuf,
    /// Optional log file, written in addition to stdout.
    pub log_path: Option<PathBuf>,
    /// Sync tuning.
    pub sync: SyncSettings,
    /// Accounts to sync.
    pub accounts: Vec<AccountConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mailkeep");
        Self {
            archive_root: data_dir.join("archive"),
            state_db: data_dir.join("state.db"),
            log_path: None,
            sync: SyncSettings::default(),
            accounts: Vec::new(),
        }
    }
}

/// One IMAP account.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AccountConfig {
    /// Account name, used in archive paths and cursor keys.
    pub name: String,
    /// IMAP server hostname.
    #[serde(default)]
    pub host: String,
    /// Port; defaults to 993 with TLS, 143 without.
    #[serde(default)]
    pub port: Option<u16>,
    /// Implicit TLS.
    #[serde(default = "default_ssl")]
    pub ssl: bool,
    /// Login name.
    #[serde(default)]
    pub username: String,
    /// Password.
    #[serde(default)]
    pub password: String,
    /// Folders to sync, in order.
    #[serde(default = "default_folders")]
    pub folders: Vec<String>,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ssl", &self.ssl)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("folders", &self.folders)
            .finish()
    }
}

const fn default_ssl() -> bool {
    true
}

fn default_folders() -> Vec<String> {
    DEFAULT_FOLDERS.iter().map(ToString::to_string).collect()
}

impl AccountConfig {
    fn from_env_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            host: String::new(),
            port: None,
            ssl: default_ssl(),
            username: String::new(),
            password: String::new(),
            folders: default_folders(),
        }
    }

    /// Builds the IMAP connection settings.
    #[must_use]
    pub fn imap_config(&self, sync: &SyncSettings) -> mailkeep_imap::Config {
        let security = if self.ssl {
            Security::Implicit
        } else {
            Security::None
        };
        let mut config = mailkeep_imap::Config::new(&self.host)
            .with_security(security)
            .with_connect_timeout(Duration::from_secs(sync.connect_timeout_secs))
            .with_command_timeout(Duration::from_secs(sync.command_timeout_secs));
        config.port = self.port;
        config
    }
}

/// Sync tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Attempts per server operation, including the first.
    pub max_attempts: u32,
    /// First retry delay in milliseconds.
    pub base_delay_ms: u64,
    /// Retry delay ceiling in milliseconds.
    pub max_delay_ms: u64,
    /// Cursor checkpoint interval in messages.
    pub checkpoint_every: usize,
    /// Per-folder message cap for one run.
    pub max_messages: Option<usize>,
    /// Consecutive storage failures that abort a folder.
    pub storage_failure_limit: u32,
    /// TCP and TLS setup timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Per-command timeout in seconds.
    pub command_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let options = SyncOptions::default();
        Self {
            max_attempts: options.retry.max_attempts,
            base_delay_ms: duration_ms(options.retry.base_delay),
            max_delay_ms: duration_ms(options.retry.max_delay),
            checkpoint_every: options.checkpoint_every,
            max_messages: options.max_messages,
            storage_failure_limit: options.storage_failure_limit,
            connect_timeout_secs: 30,
            command_timeout_secs: 60,
        }
    }
}

impl SyncSettings {
    /// Converts to engine options.
    #[must_use]
    pub const fn options(&self) -> SyncOptions {
        SyncOptions {
            max_messages: self.max_messages,
            checkpoint_every: self.checkpoint_every,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                base_delay: Duration::from_millis(self.base_delay_ms),
                max_delay: Duration::from_millis(self.max_delay_ms),
            },
            storage_failure_limit: self.storage_failure_limit,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// A configuration problem found by [`Config::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Nothing to sync.
    #[error("no accounts configured (set IMAP_HOST/IMAP_USER/IMAP_PASSWORD or add accounts to the config file)")]
    NoAccounts,
    /// An account has an empty name.
    #[error("account name is required")]
    EmptyName,
    /// Two accounts share a name.
    #[error("account {0}: name is used more than once")]
    DuplicateName(String),
    /// Missing host.
    #[error("account {0}: IMAP host is required")]
    EmptyHost(String),
    /// Port 0.
    #[error("account {0}: IMAP port must be 1-65535")]
    InvalidPort(String),
    /// Missing username.
    #[error("account {0}: IMAP username is required")]
    EmptyUsername(String),
    /// Missing password.
    #[error("account {0}: IMAP password is required")]
    EmptyPassword(String),
    /// No folders.
    #[error("account {0}: at least one folder is required")]
    NoFolders(String),
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// The file is `path` if given, else `$MAILKEEP_CONFIG`, else
    /// `<config_dir>/mailkeep/config.json` when it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an
    /// environment variable is malformed. Accounts are not validated here;
    /// see [`Config::ensure_valid`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| env("MAILKEEP_CONFIG").map(PathBuf::from))
            .or_else(|| {
                dirs::config_dir()
                    .map(|dir| dir.join("mailkeep").join("config.json"))
                    .filter(|candidate| candidate.exists())
            });
        Self::load_with(file.as_deref(), env)
    }

    /// Loads from an optional file and an environment lookup.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_with(file: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(&env)?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(root) = env("ARCHIVE_ROOT") {
            self.archive_root = PathBuf::from(root);
        }
        if let Some(db) = env("STATE_DB") {
            self.state_db = PathBuf::from(db);
        }
        if let Some(log) = env("MAILKEEP_LOG_PATH") {
            self.log_path = Some(PathBuf::from(log));
        }

        if let Some(v) = parse_var(env, "SYNC_MAX_ATTEMPTS")? {
            self.sync.max_attempts = v;
        }
        if let Some(v) = parse_var(env, "SYNC_BASE_DELAY_MS")? {
            self.sync.base_delay_ms = v;
        }
        if let Some(v) = parse_var(env, "SYNC_MAX_DELAY_MS")? {
            self.sync.max_delay_ms = v;
        }
        if let Some(v) = parse_var(env, "SYNC_CHECKPOINT_EVERY")? {
            self.sync.checkpoint_every = v;
        }
        if let Some(v) = parse_var(env, "SYNC_MAX_MESSAGES")? {
            self.sync.max_messages = Some(v);
        }

        self.apply_account_env(env)
    }

    /// Applies `IMAP_*` variables to the account named by `IMAP_ACCOUNT`
    /// (default `default`), creating it if needed.
    fn apply_account_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<()> {
        const KEYS: [&str; 6] = [
            "IMAP_HOST",
            "IMAP_PORT",
            "IMAP_USER",
            "IMAP_PASSWORD",
            "IMAP_SSL",
            "IMAP_FOLDERS",
        ];
        if !KEYS.iter().any(|key| env(key).is_some()) {
            return Ok(());
        }

        let name = env("IMAP_ACCOUNT").unwrap_or_else(|| ENV_ACCOUNT.to_string());
        let index = match self.accounts.iter().position(|a| a.name == name) {
            Some(index) => index,
            None => {
                self.accounts.push(AccountConfig::from_env_name(&name));
                self.accounts.len() - 1
            }
        };
        let port = parse_var(env, "IMAP_PORT")?;
        let ssl = env("IMAP_SSL").map(|v| parse_bool("IMAP_SSL", &v)).transpose()?;

        let account = &mut self.accounts[index];
        if let Some(host) = env("IMAP_HOST") {
            account.host = host;
        }
        if port.is_some() {
            account.port = port;
        }
        if let Some(ssl) = ssl {
            account.ssl = ssl;
        }
        if let Some(user) = env("IMAP_USER") {
            account.username = user;
        }
        if let Some(password) = env("IMAP_PASSWORD") {
            account.password = password;
        }
        if let Some(folders) = env("IMAP_FOLDERS") {
            account.folders = folders
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        Ok(())
    }

    /// Checks the configuration for missing or contradictory values.
    ///
    /// # Errors
    ///
    /// Returns every problem found.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.accounts.is_empty() {
            errors.push(ValidationError::NoAccounts);
        }

        for (i, account) in self.accounts.iter().enumerate() {
            let name = account.name.clone();
            if name.trim().is_empty() {
                errors.push(ValidationError::EmptyName);
            }
            if self.accounts[..i].iter().any(|a| a.name == account.name) {
                errors.push(ValidationError::DuplicateName(name.clone()));
            }
            if account.host.trim().is_empty() {
                errors.push(ValidationError::EmptyHost(name.clone()));
            }
            if account.port == Some(0) {
                errors.push(ValidationError::InvalidPort(name.clone()));
            }
            if account.username.is_empty() {
                errors.push(ValidationError::EmptyUsername(name.clone()));
            }
            if account.password.is_empty() {
                errors.push(ValidationError::EmptyPassword(name.clone()));
            }
            if account.folders.is_empty() {
                errors.push(ValidationError::NoFolders(name));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Like [`Config::validate`], folded into one error.
    ///
    /// # Errors
    ///
    /// Returns every validation problem joined into one message.
    pub fn ensure_valid(&self) -> Result<()> {
        if let Err(errors) = self.validate() {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            bail!("invalid configuration: {joined}");
        }
        Ok(())
    }

    /// Builds the IMAP connector for all accounts.
    #[must_use]
    pub fn connector(&self) -> ImapConnector {
        self.accounts
            .iter()
            .fold(ImapConnector::new(), |connector, account| {
                connector.with_account(
                    &account.name,
                    ImapAccount {
                        config: account.imap_config(&self.sync),
                        username: account.username.clone(),
                        password: account.password.clone(),
                    },
                )
            })
    }

    /// Lists the (account, folders) pairs to sync.
    #[must_use]
    pub fn account_folders(&self) -> Vec<AccountFolders> {
        self.accounts
            .iter()
            .map(|account| AccountFolders {
                account: account.name.clone(),
                folders: account.folders.clone(),
            })
            .collect()
    }
}

fn parse_var<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    env(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|err| anyhow!("{key}={value:?}: {err}"))
        })
        .transpose()
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{key}={other:?}: expected true or false"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_only_account() {
        let env = env_from(&[
            ("IMAP_HOST", "imap.example.com"),
            ("IMAP_USER", "me@example.com"),
            ("IMAP_PASSWORD", "secret"),
            ("ARCHIVE_ROOT", "/srv/mail"),
        ]);
        let config = Config::load_with(None, env).unwrap();

        assert_eq!(config.archive_root, PathBuf::from("/srv/mail"));
        assert_eq!(config.accounts.len(), 1);
        let account = &config.accounts[0];
        assert_eq!(account.name, "default");
        assert!(account.ssl);
        assert_eq!(account.folders, vec!["INBOX", "Sent", "Junk"]);

        let imap = account.imap_config(&config.sync);
        assert_eq!(imap.port(), 993);
        assert_eq!(imap.security, Security::Implicit);
    }

    #[test]
    fn test_env_overrides() {
        let env = env_from(&[
            ("IMAP_HOST", "localhost"),
            ("IMAP_PORT", "1143"),
            ("IMAP_SSL", "false"),
            ("IMAP_USER", "u"),
            ("IMAP_PASSWORD", "p"),
            ("IMAP_FOLDERS", "INBOX, Archive/2024 ,,"),
            ("SYNC_MAX_ATTEMPTS", "5"),
            ("SYNC_CHECKPOINT_EVERY", "10"),
        ]);
        let config = Config::load_with(None, env).unwrap();
        let account = &config.accounts[0];

        assert_eq!(account.folders, vec!["INBOX", "Archive/2024"]);
        let imap = account.imap_config(&config.sync);
        assert_eq!(imap.port(), 1143);
        assert_eq!(imap.security, Security::None);

        let options = config.sync.options();
        assert_eq!(options.retry.max_attempts, 5);
        assert_eq!(options.checkpoint_every, 10);
    }

    #[test]
    fn test_file_with_env_password() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "state_db": "/var/lib/mailkeep/state.db",
                "sync": { "max_messages": 100 },
                "accounts": [
                    { "name": "work", "host": "imap.work.example", "username": "me", "folders": ["INBOX"] }
                ]
            }"#,
        )
        .unwrap();

        let env = env_from(&[("IMAP_ACCOUNT", "work"), ("IMAP_PASSWORD", "from-env")]);
        let config = Config::load_with(Some(&path), env).unwrap();

        assert_eq!(config.state_db, PathBuf::from("/var/lib/mailkeep/state.db"));
        assert_eq!(config.sync.max_messages, Some(100));
        assert_eq!(config.sync.max_attempts, 3);
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.accounts[0].password, "from-env");

        let targets = config.account_folders();
        assert_eq!(targets[0].account, "work");
        assert_eq!(targets[0].folders, vec!["INBOX"]);
    }

    #[test]
    fn test_validation_errors() {
        let config = Config::load_with(None, env_from(&[])).unwrap();
        assert!(config.accounts.is_empty());
        let err = config.ensure_valid().unwrap_err();
        assert!(err.to_string().contains("no accounts configured"));

        let config = Config {
            accounts: vec![AccountConfig {
                folders: Vec::new(),
                ..AccountConfig::from_env_name("a")
            }],
            ..Config::default()
        };
        let errors = config.validate().unwrap_err();
        assert!(errors.contains(&ValidationError::EmptyHost("a".into())));
        assert!(errors.contains(&ValidationError::EmptyPassword("a".into())));
        assert!(errors.contains(&ValidationError::NoFolders("a".into())));
    }

    #[test]
    fn test_malformed_env_value() {
        let env = env_from(&[("IMAP_HOST", "h"), ("IMAP_PORT", "imap")]);
        let err = Config::load_with(None, env).unwrap_err();
        assert!(err.to_string().contains("IMAP_PORT"));

        let env = env_from(&[("IMAP_HOST", "h"), ("IMAP_SSL", "maybe")]);
        assert!(Config::load_with(None, env).is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let account = AccountConfig {
            password: "hunter2".into(),
            ..AccountConfig::from_env_name("a")
        };
        assert!(!format!("{account:?}").contains("hunter2"));
    }
}
