use reqwest::Url;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub collect: CollectConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_url_env")]
    pub url_env: String,
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectConfig {
    #[serde(default = "default_cpu_window_secs")]
    pub cpu_window_secs: u64,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    #[serde(default = "default_os_release_path")]
    pub os_release_path: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            url_env: default_url_env(),
            timeout_ms: default_webhook_timeout_ms(),
        }
    }
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            cpu_window_secs: default_cpu_window_secs(),
            command_timeout_ms: default_command_timeout_ms(),
            os_release_path: default_os_release_path(),
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl CollectConfig {
    pub fn cpu_window(&self) -> Duration {
        Duration::from_secs(self.cpu_window_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// The CPU window to sample: the CLI override if given, else the config
    /// value. The report labels it in whole seconds.
    pub fn effective_cpu_window(
        &self,
        cli_override: Option<Duration>,
    ) -> Result<Duration, ConfigError> {
        let Some(window) = cli_override else {
            return Ok(self.cpu_window());
        };
        if window < Duration::from_secs(1) || window.subsec_nanos() != 0 {
            return Err(ConfigError::Validation(format!(
                "--cpu-window должно быть целым числом секунд >= 1, получено {}",
                humantime::format_duration(window)
            )));
        }
        Ok(window)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
    #[error(
        "не найден URL вебхука: передайте --webhook-url, задайте '{env}' в окружении или webhook.url в config"
    )]
    MissingWebhookUrl { env: String },
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_webhook(&self.webhook)?;
        validate_collect(&self.collect)?;
        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }

    /// Resolves the destination URL: CLI override, then the environment
    /// variable named by `webhook.url_env`, then `webhook.url`.
    pub fn resolve_webhook_url(&self, cli_override: Option<&str>) -> Result<Url, ConfigError> {
        let env_value = std::env::var(&self.webhook.url_env).ok();
        let candidate = [cli_override, env_value.as_deref(), self.webhook.url.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingWebhookUrl {
                env: self.webhook.url_env.clone(),
            })?;

        parse_webhook_url(candidate)
    }
}

fn parse_webhook_url(raw: &str) -> Result<Url, ConfigError> {
    // The raw URL is a secret and must not appear in error text.
    let url = Url::parse(raw)
        .map_err(|err| ConfigError::Validation(format!("URL вебхука не разобран: {err}")))?;
    match url.scheme() {
        "https" | "http" => Ok(url),
        other => Err(ConfigError::Validation(format!(
            "URL вебхука должен использовать схему https или http, получено '{other}'"
        ))),
    }
}

fn validate_webhook(cfg: &WebhookConfig) -> Result<(), ConfigError> {
    if cfg.url_env.trim().is_empty() {
        return Err(ConfigError::Validation(
            "webhook.url_env не должен быть пустым".to_string(),
        ));
    }
    if cfg.timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "webhook.timeout_ms должен быть > 0".to_string(),
        ));
    }
    if let Some(url) = cfg.url.as_deref().filter(|v| !v.trim().is_empty()) {
        parse_webhook_url(url.trim())?;
    }
    Ok(())
}

fn validate_collect(cfg: &CollectConfig) -> Result<(), ConfigError> {
    if cfg.cpu_window_secs < 1 {
        return Err(ConfigError::Validation(
            "collect.cpu_window_secs должно быть >= 1".to_string(),
        ));
    }
    if cfg.command_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "collect.command_timeout_ms должен быть > 0".to_string(),
        ));
    }
    if cfg.os_release_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "collect.os_release_path не должен быть пустым".to_string(),
        ));
    }
    Ok(())
}

fn default_url_env() -> String {
    "SYSREPORT_WEBHOOK_URL".to_string()
}

const fn default_webhook_timeout_ms() -> u64 {
    10_000
}

const fn default_cpu_window_secs() -> u64 {
    10
}

const fn default_command_timeout_ms() -> u64 {
    5_000
}

fn default_os_release_path() -> String {
    "/etc/os-release".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_env(env: &str) -> Config {
        let mut cfg = Config::default();
        cfg.webhook.url_env = env.to_string();
        cfg
    }

    #[test]
    fn example_yaml_parses_and_validates() {
        let cfg: Config =
            serde_yaml::from_str(Config::example_yaml()).expect("пример должен разбираться");
        cfg.validate().expect("пример должен проходить валидацию");
        assert_eq!(cfg.collect.cpu_window_secs, 10);
        assert_eq!(cfg.webhook.url_env, "SYSREPORT_WEBHOOK_URL");
        assert!(cfg.webhook.url.is_none());
    }

    #[test]
    fn empty_yaml_falls_back_to_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").expect("пустой YAML");
        cfg.validate().expect("значения по умолчанию валидны");
        assert_eq!(cfg.collect.cpu_window(), Duration::from_secs(10));
        assert_eq!(cfg.collect.command_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.webhook.timeout(), Duration::from_secs(10));
        assert_eq!(cfg.collect.os_release_path, "/etc/os-release");
    }

    #[test]
    fn zero_cpu_window_is_rejected() {
        let mut cfg = Config::default();
        cfg.collect.cpu_window_secs = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn cpu_window_override_must_be_whole_seconds() {
        let cfg = CollectConfig::default();
        assert_eq!(cfg.effective_cpu_window(None).unwrap(), Duration::from_secs(10));
        assert_eq!(
            cfg.effective_cpu_window(Some(Duration::from_secs(30))).unwrap(),
            Duration::from_secs(30)
        );

        let short = humantime::parse_duration("500ms").unwrap();
        assert!(matches!(
            cfg.effective_cpu_window(Some(short)),
            Err(ConfigError::Validation(_))
        ));
        let fractional = humantime::parse_duration("1500ms").unwrap();
        assert!(matches!(
            cfg.effective_cpu_window(Some(fractional)),
            Err(ConfigError::Validation(_))
        ));
        assert!(cfg.effective_cpu_window(Some(Duration::ZERO)).is_err());
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let mut cfg = Config::default();
        cfg.webhook.url = Some("ftp://example.com/hook".to_string());
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn cli_override_wins_over_env_and_file() {
        let env = "SYSREPORT_TEST_URL_CLI_WINS";
        std::env::set_var(env, "https://env.example.com/hook");
        let mut cfg = config_with_env(env);
        cfg.webhook.url = Some("https://file.example.com/hook".to_string());

        let url = cfg
            .resolve_webhook_url(Some("https://cli.example.com/hook"))
            .expect("URL из CLI");
        assert_eq!(url.host_str(), Some("cli.example.com"));
        std::env::remove_var(env);
    }

    #[test]
    fn env_wins_over_file() {
        let env = "SYSREPORT_TEST_URL_ENV_WINS";
        std::env::set_var(env, "https://env.example.com/hook");
        let mut cfg = config_with_env(env);
        cfg.webhook.url = Some("https://file.example.com/hook".to_string());

        let url = cfg.resolve_webhook_url(None).expect("URL из окружения");
        assert_eq!(url.host_str(), Some("env.example.com"));
        std::env::remove_var(env);
    }

    #[test]
    fn blank_env_falls_through_to_file() {
        let env = "SYSREPORT_TEST_URL_BLANK_ENV";
        std::env::set_var(env, "   ");
        let mut cfg = config_with_env(env);
        cfg.webhook.url = Some("https://file.example.com/hook".to_string());

        let url = cfg.resolve_webhook_url(None).expect("URL из файла");
        assert_eq!(url.host_str(), Some("file.example.com"));
        std::env::remove_var(env);
    }

    #[test]
    fn missing_url_everywhere_is_an_error() {
        let env = "SYSREPORT_TEST_URL_MISSING_12345";
        std::env::remove_var(env);
        let cfg = config_with_env(env);
        assert!(matches!(
            cfg.resolve_webhook_url(None),
            Err(ConfigError::MissingWebhookUrl { .. })
        ));
    }
}
