use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use base64::Engine;
use clap::{Arg, ArgAction, ArgMatches, Command};
use console::Emoji;
use serde::Deserialize;
use yapp::PasswordReader;

const LOCK: Emoji = Emoji("🔒 ", "");

pub const DEFAULT_API_HOST: &str = "sailabove.io";

/// Global connection flags, shared by every subcommand.
pub fn global_args() -> Vec<Arg> {
    vec![
        Arg::new("host")
            .long("host")
            .env("SAIL_HOST")
            .global(true)
            .default_value(DEFAULT_API_HOST)
            .help("API host, optionally prefixed with http:// or https://"),
        Arg::new("user")
            .long("user")
            .short('U')
            .env("SAIL_USER")
            .global(true)
            .help("Account name, also the default application"),
        Arg::new("password")
            .long("password")
            .short('P')
            .env("SAIL_PASSWORD")
            .hide_env_values(true)
            .global(true)
            .help("Account password. Prompted for when only --user is given"),
        Arg::new("config_dir")
            .long("config-dir")
            .env("DOCKER_CONFIG")
            .global(true)
            .value_parser(clap::value_parser!(PathBuf))
            .help("Directory holding the docker config.json used for stored credentials"),
        Arg::new("verbose")
            .long("verbose")
            .short('v')
            .global(true)
            .action(ArgAction::SetTrue)
            .help("Enable debug logging"),
    ]
}

pub fn command() -> Command {
    Command::new("config")
        .about("Show the resolved client configuration")
        .subcommand_required(true)
        .subcommand(Command::new("show").about("Print the configured user and host"))
}

pub fn handle(config: &CliConfig, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", _)) => {
            println!("username:{}", config.user().unwrap_or_default());
            println!("host:{}", config.host());
            Ok(())
        }
        _ => Err(anyhow!("Unknown config command")),
    }
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: BTreeMap<String, DockerAuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerAuthEntry {
    auth: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    api_host: String,
    use_https: bool,
    user: Option<String>,
    password: Option<String>,
}

impl CliConfig {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let host = matches
            .get_one::<String>("host")
            .map(String::as_str)
            .unwrap_or(DEFAULT_API_HOST);
        let config_dir = matches
            .get_one::<PathBuf>("config_dir")
            .cloned()
            .or_else(|| dirs::home_dir().map(|h| h.join(".docker")))
            .unwrap_or_else(|| PathBuf::from(".docker"));

        let mut config = CliConfig::new(
            host,
            matches.get_one::<String>("user").cloned(),
            matches.get_one::<String>("password").cloned(),
        );
        if config.user.is_none() || config.password.is_none() {
            config.load_stored_credentials(&config_dir.join("config.json"))?;
        }
        Ok(config)
    }

    pub fn new(host: &str, user: Option<String>, password: Option<String>) -> Self {
        let (api_host, use_https) = if let Some(h) = host.strip_prefix("http://") {
            (h, false)
        } else if let Some(h) = host.strip_prefix("https://") {
            (h, true)
        } else {
            (host, true)
        };
        let api_host = api_host.trim_end_matches('/').to_string();
        log::debug!("Using API host: {api_host}");

        CliConfig {
            api_host,
            use_https,
            user,
            password,
        }
    }

    /// Fill missing credentials from a docker `config.json`. A missing file is not an error.
    fn load_stored_credentials(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            log::debug!("No docker config found at {}", path.display());
            return Ok(());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
        let file: DockerConfigFile = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;

        let Some(entry) = self
            .host_keys()
            .iter()
            .find_map(|key| file.auths.get(key))
        else {
            log::debug!("No stored credentials for {}", self.api_host);
            return Ok(());
        };

        let (user, password) = match &entry.auth {
            Some(auth) => decode_auth(auth)?,
            None => (entry.username.clone(), entry.password.clone()),
        };
        // Only adopt the stored password when it belongs to the requested user.
        if self.user.is_none() || self.user == user {
            if self.user.is_none() {
                self.user = user;
            }
            if self.password.is_none() {
                self.password = password;
            }
            log::debug!("Loaded stored credentials from {}", path.display());
        }
        Ok(())
    }

    fn host_keys(&self) -> [String; 3] {
        [
            self.api_host.clone(),
            format!("https://{}", self.api_host),
            format!("http://{}", self.api_host),
        ]
    }

    pub fn url(&self, path: &str) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        format!("{}://{}/v1{}", scheme, self.api_host, path)
    }

    pub fn host(&self) -> &str {
        &self.api_host
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// A host segment in a resource name must name the host this client talks to.
    pub fn check_host(&self, host: Option<&str>) -> Result<()> {
        match host {
            Some(h) if h != self.api_host => Err(anyhow!(
                "Invalid host {} for endpoint {}",
                h,
                self.api_host
            )),
            _ => Ok(()),
        }
    }

    pub fn credentials(&mut self) -> Result<(String, String)> {
        let program = std::env::args().next().unwrap_or("sail".to_string());
        let user = self.user.clone().ok_or_else(|| {
            anyhow!(
                "{}No credentials found for {}. Use --user/--password or {}.",
                LOCK,
                self.api_host,
                console::style(format!("{program} --help")).bold()
            )
        })?;
        let password = match &self.password {
            Some(p) => p.clone(),
            None => {
                let mut yapp = yapp::Yapp::new().with_echo_symbol('*');
                let p = yapp
                    .read_password_with_prompt(&format!("Password for {user}: "))
                    .map_err(|e| anyhow!("Failed to read password from stdin: {}", e))?;
                self.password = Some(p.clone());
                p
            }
        };
        Ok((user, password))
    }
}

fn decode_auth(auth: &str) -> Result<(Option<String>, Option<String>)> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(auth)
        .map_err(|e| anyhow!("Failed to decode stored auth: {}", e))?;
    let decoded =
        String::from_utf8(decoded).map_err(|e| anyhow!("Invalid UTF-8 in stored auth: {}", e))?;
    Ok(match decoded.split_once(':') {
        Some((user, password)) => (Some(user.to_string()), Some(password.to_string())),
        None => (None, None),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn scheme_prefix_selects_https() {
        let config = CliConfig::new("http://localhost:5000/", None, None);
        assert_eq!(config.url("/applications"), "http://localhost:5000/v1/applications");
        let config = CliConfig::new("sailabove.io", None, None);
        assert_eq!(config.url("/ping"), "https://sailabove.io/v1/ping");
    }

    #[test]
    fn check_host_accepts_missing_or_matching() {
        let config = CliConfig::new("sailabove.io", None, None);
        assert!(config.check_host(None).is_ok());
        assert!(config.check_host(Some("sailabove.io")).is_ok());
        assert!(config.check_host(Some("other.io")).is_err());
    }

    #[test]
    fn stored_base64_auth_is_used() {
        let dir = tempfile::tempdir().unwrap();
        // "alice:s3cret"
        let path = write_config(
            dir.path(),
            r#"{"auths": {"sailabove.io": {"auth": "YWxpY2U6czNjcmV0"}}}"#,
        );
        let mut config = CliConfig::new("sailabove.io", None, None);
        config.load_stored_credentials(&path).unwrap();
        assert_eq!(config.user(), Some("alice"));
        assert_eq!(
            config.credentials().unwrap(),
            ("alice".to_string(), "s3cret".to_string())
        );
    }

    #[test]
    fn scheme_keyed_entry_matches() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{"auths": {"https://sailabove.io": {"username": "bob", "password": "pw"}}}"#,
        );
        let mut config = CliConfig::new("sailabove.io", None, None);
        config.load_stored_credentials(&path).unwrap();
        assert_eq!(config.user(), Some("bob"));
    }

    #[test]
    fn explicit_user_is_not_overridden() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{"auths": {"sailabove.io": {"auth": "YWxpY2U6czNjcmV0"}}}"#,
        );
        let mut config = CliConfig::new("sailabove.io", Some("carol".to_string()), None);
        config.load_stored_credentials(&path).unwrap();
        assert_eq!(config.user(), Some("carol"));
        assert_eq!(config.password, None);
    }

    #[test]
    fn missing_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CliConfig::new("sailabove.io", None, None);
        config
            .load_stored_credentials(&dir.path().join("config.json"))
            .unwrap();
        assert_eq!(config.user(), None);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "{ not json");
        let mut config = CliConfig::new("sailabove.io", None, None);
        assert!(config.load_stored_credentials(&path).is_err());
    }
}
