pub mod command;
pub mod system;

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const SENTINEL: &str = "Not available";

/// A single metric value, or the marker that it could not be measured.
#[derive(Debug, Clone, PartialEq)]
pub enum Measured<T> {
    Value(T),
    NotAvailable,
}

impl<T> Measured<T> {
    fn from_result(metric: &'static str, result: Result<T, CollectError>) -> Self {
        match result {
            Ok(value) => Measured::Value(value),
            Err(err) => {
                warn!(metric, error = %err, "метрика недоступна");
                Measured::NotAvailable
            }
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Measured::Value(v) => Some(v),
            Measured::NotAvailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Measured::Value(_))
    }
}

impl<T: fmt::Display> fmt::Display for Measured<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measured::Value(v) => fmt::Display::fmt(v, f),
            Measured::NotAvailable => f.write_str(SENTINEL),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskInfo {
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
    pub usage_percent: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemSnapshot {
    pub system: Measured<String>,
    pub release: Measured<String>,
    pub distribution: Measured<String>,
    pub hostname: Measured<String>,
    pub ip_address: Measured<String>,
    pub uptime: Measured<String>,
    pub disk: Measured<DiskInfo>,
    pub running_processes: Measured<usize>,
    pub logged_in_users: Measured<usize>,
    pub cpu_usage_percent: Measured<f64>,
    pub cpu_window: Duration,
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("не удалось прочитать {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось запустить '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("'{program}' завершилась с кодом {status}")]
    CommandStatus { program: String, status: String },
    #[error("'{program}' не ответила за {timeout_ms} мс")]
    Timeout { program: String, timeout_ms: u128 },
    #[error("сетевой запрос не удался: {0}")]
    Net(#[source] std::io::Error),
    #[error("ошибка разбора: {0}")]
    Parse(String),
    #[error("источник не вернул данных: {0}")]
    Unavailable(String),
}

/// One query per metric. Implementations report failures as errors; the
/// sentinel is substituted only by [`collect_snapshot`].
pub trait SystemProbe {
    fn os_family(&mut self) -> Result<String, CollectError>;
    fn kernel_release(&mut self) -> Result<String, CollectError>;
    fn distribution(&mut self) -> Result<String, CollectError>;
    fn hostname(&mut self) -> Result<String, CollectError>;
    fn ip_address(&mut self) -> Result<String, CollectError>;
    fn uptime(&mut self) -> Result<Duration, CollectError>;
    fn disk_usage(&mut self) -> Result<DiskInfo, CollectError>;
    fn process_count(&mut self) -> Result<usize, CollectError>;
    fn logged_in_users(&mut self) -> Result<usize, CollectError>;
    /// Blocks the caller for the whole `window`.
    fn cpu_usage_percent(&mut self, window: Duration) -> Result<f64, CollectError>;
}

impl SystemSnapshot {
    /// Names of the metrics that fell back to the sentinel.
    pub fn missing_metrics(&self) -> Vec<&'static str> {
        [
            ("system", self.system.is_available()),
            ("release", self.release.is_available()),
            ("distribution", self.distribution.is_available()),
            ("hostname", self.hostname.is_available()),
            ("ip_address", self.ip_address.is_available()),
            ("uptime", self.uptime.is_available()),
            ("disk", self.disk.is_available()),
            ("running_processes", self.running_processes.is_available()),
            ("logged_in_users", self.logged_in_users.is_available()),
            ("cpu_usage_percent", self.cpu_usage_percent.is_available()),
        ]
        .into_iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| name)
        .collect()
    }
}

pub fn collect_snapshot<P: SystemProbe + ?Sized>(
    probe: &mut P,
    cpu_window: Duration,
) -> SystemSnapshot {
    let system = Measured::from_result("system", probe.os_family());
    let release = Measured::from_result("release", probe.kernel_release());
    let distribution = Measured::from_result("distribution", probe.distribution());
    let hostname = Measured::from_result("hostname", probe.hostname());
    let ip_address = Measured::from_result("ip_address", probe.ip_address());
    let uptime = Measured::from_result("uptime", probe.uptime().map(system::format_uptime));
    let disk = Measured::from_result("disk", probe.disk_usage());
    let running_processes = Measured::from_result("running_processes", probe.process_count());
    let logged_in_users = Measured::from_result("logged_in_users", probe.logged_in_users());

    info!(window_secs = cpu_window.as_secs(), "замер загрузки CPU");
    let cpu_usage_percent =
        Measured::from_result("cpu_usage_percent", probe.cpu_usage_percent(cpu_window));

    SystemSnapshot {
        system,
        release,
        distribution,
        hostname,
        ip_address,
        uptime,
        disk,
        running_processes,
        logged_in_users,
        cpu_usage_percent,
        cpu_window,
    }
}
