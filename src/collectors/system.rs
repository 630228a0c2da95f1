use crate::collectors::command::{CommandRunner, SystemCommandRunner};
use crate::collectors::{CollectError, DiskInfo, SystemProbe};
use crate::config::CollectConfig;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use sysinfo::{CpuExt, DiskExt, System, SystemExt};
use tracing::debug;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

// TEST-NET-1; connecting a UDP socket only selects a route, nothing is sent.
const ROUTE_PROBE_ADDR: (Ipv4Addr, u16) = (Ipv4Addr::new(192, 0, 2, 1), 9);

/// Live probe backed by `sysinfo`, `df` and `who`.
pub struct HostProbe<R = SystemCommandRunner> {
    system: System,
    runner: R,
    os_release_path: PathBuf,
}

impl HostProbe<SystemCommandRunner> {
    pub fn new(cfg: &CollectConfig) -> Self {
        Self::with_runner(
            SystemCommandRunner::new(cfg.command_timeout()),
            &cfg.os_release_path,
        )
    }
}

impl<R: CommandRunner> HostProbe<R> {
    pub fn with_runner(runner: R, os_release_path: impl Into<PathBuf>) -> Self {
        if !System::IS_SUPPORTED {
            debug!("sysinfo не поддерживает эту ОС, часть метрик будет недоступна");
        }
        Self {
            system: System::new(),
            runner,
            os_release_path: os_release_path.into(),
        }
    }

    /// sysinfo has no free-block count, so reserved blocks land in "used";
    /// it also skips pseudo filesystems like tmpfs.
    fn sysinfo_disk_usage(&mut self) -> Result<DiskInfo, CollectError> {
        self.system.refresh_disks_list();
        self.system.refresh_disks();
        let disks = self.system.disks();
        let (total, available) = disks.iter().fold((0_u64, 0_u64), |(t, a), d| {
            (
                t.saturating_add(d.total_space()),
                a.saturating_add(d.available_space()),
            )
        });
        debug!(disks = disks.len(), total, available, "сводка по дискам");
        disk_info_from_bytes(total, available)
    }
}

impl<R: CommandRunner> SystemProbe for HostProbe<R> {
    fn os_family(&mut self) -> Result<String, CollectError> {
        Ok(os_family_name(std::env::consts::OS))
    }

    fn kernel_release(&mut self) -> Result<String, CollectError> {
        self.system
            .kernel_version()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| CollectError::Unavailable("версия ядра".to_string()))
    }

    fn distribution(&mut self) -> Result<String, CollectError> {
        let text = fs::read_to_string(&self.os_release_path).map_err(|source| CollectError::Io {
            path: self.os_release_path.display().to_string(),
            source,
        })?;
        parse_pretty_name(&text).ok_or_else(|| {
            CollectError::Parse(format!(
                "в {} нет PRETTY_NAME",
                self.os_release_path.display()
            ))
        })
    }

    fn hostname(&mut self) -> Result<String, CollectError> {
        self.system
            .host_name()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| CollectError::Unavailable("имя хоста".to_string()))
    }

    fn ip_address(&mut self) -> Result<String, CollectError> {
        match outbound_ipv4() {
            Ok(ip) => Ok(ip.to_string()),
            Err(err) => {
                debug!(error = %err, "маршрутный запрос не дал адреса, пробуем hostname -I");
                let out = self.runner.run("hostname", &["-I"])?;
                first_ipv4(&out).map(|ip| ip.to_string())
            }
        }
    }

    fn uptime(&mut self) -> Result<Duration, CollectError> {
        match self.system.uptime() {
            0 => Err(CollectError::Unavailable("время работы".to_string())),
            secs => Ok(Duration::from_secs(secs)),
        }
    }

    fn disk_usage(&mut self) -> Result<DiskInfo, CollectError> {
        match self.runner.run("df", &["-h", "--total"]) {
            Ok(out) => df_total_from_output(&out),
            Err(err) => {
                debug!(error = %err, "df недоступен, суммируем диски через sysinfo");
                self.sysinfo_disk_usage()
            }
        }
    }

    fn process_count(&mut self) -> Result<usize, CollectError> {
        self.system.refresh_processes();
        match self.system.processes().len() {
            0 => Err(CollectError::Unavailable("таблица процессов пуста".to_string())),
            n => Ok(n),
        }
    }

    fn logged_in_users(&mut self) -> Result<usize, CollectError> {
        let out = self.runner.run("who", &[])?;
        Ok(count_sessions(&out))
    }

    fn cpu_usage_percent(&mut self, window: Duration) -> Result<f64, CollectError> {
        self.system.refresh_cpu();
        thread::sleep(window);
        self.system.refresh_cpu();

        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return Err(CollectError::Unavailable("список CPU пуст".to_string()));
        }
        let sum: f32 = cpus.iter().map(|c| c.cpu_usage()).sum();
        Ok((sum / cpus.len() as f32) as f64)
    }
}

fn os_family_name(os: &str) -> String {
    match os {
        "linux" => "Linux".to_string(),
        "macos" => "Darwin".to_string(),
        "windows" => "Windows".to_string(),
        "freebsd" => "FreeBSD".to_string(),
        "openbsd" => "OpenBSD".to_string(),
        "netbsd" => "NetBSD".to_string(),
        other => other.to_string(),
    }
}

fn parse_pretty_name(os_release: &str) -> Option<String> {
    os_release
        .lines()
        .find_map(|line| line.strip_prefix("PRETTY_NAME="))
        .map(|v| v.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|v| !v.is_empty())
}

fn outbound_ipv4() -> Result<Ipv4Addr, CollectError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(CollectError::Net)?;
    socket.connect(ROUTE_PROBE_ADDR).map_err(CollectError::Net)?;
    match socket.local_addr().map_err(CollectError::Net)?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Ok(ip),
        other => Err(CollectError::Unavailable(format!(
            "маршрутный адрес {other} не подходит"
        ))),
    }
}

fn first_ipv4(hostname_output: &str) -> Result<Ipv4Addr, CollectError> {
    hostname_output
        .split_whitespace()
        .filter_map(|token| token.parse::<Ipv4Addr>().ok())
        .find(|ip| !ip.is_loopback())
        .ok_or_else(|| CollectError::Parse("hostname -I не вернул IPv4-адрес".to_string()))
}

pub(crate) fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let mins = (secs % 3600) / 60;

    let mut parts = Vec::with_capacity(3);
    if days > 0 {
        parts.push(plural(days, "day"));
    }
    if hours > 0 {
        parts.push(plural(hours, "hour"));
    }
    if mins > 0 || parts.is_empty() {
        parts.push(plural(mins, "minute"));
    }
    format!("up {}", parts.join(", "))
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

fn count_sessions(who_output: &str) -> usize {
    who_output.lines().filter(|l| !l.trim().is_empty()).count()
}

fn disk_info_from_bytes(total: u64, available: u64) -> Result<DiskInfo, CollectError> {
    if total == 0 {
        return Err(CollectError::Unavailable(
            "суммарный объём дисков равен нулю".to_string(),
        ));
    }
    let used = total.saturating_sub(available);
    // df rounds the percentage up.
    let pct = ((used as f64 / total as f64) * 100.0).ceil() as u64;
    Ok(DiskInfo {
        total_gb: total as f64 / GIB,
        used_gb: used as f64 / GIB,
        free_gb: available.min(total) as f64 / GIB,
        usage_percent: format!("{pct}%"),
    })
}

fn df_total_from_output(output: &str) -> Result<DiskInfo, CollectError> {
    let last = output
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| CollectError::Parse("df вернул пустой вывод".to_string()))?;
    let fields: Vec<&str> = last.split_whitespace().collect();
    parse_df_total(&fields)
}

/// Parses the `total` row of `df -h --total`: label, size, used, avail, use%.
fn parse_df_total(fields: &[&str]) -> Result<DiskInfo, CollectError> {
    let [_, size, used, avail, pct, ..] = fields else {
        return Err(CollectError::Parse(format!(
            "строка df содержит {} полей, ожидалось не меньше 5",
            fields.len()
        )));
    };
    Ok(DiskInfo {
        total_gb: df_size_gb(size)?,
        used_gb: df_size_gb(used)?,
        free_gb: df_size_gb(avail)?,
        usage_percent: pct.to_string(),
    })
}

fn df_size_gb(raw: &str) -> Result<f64, CollectError> {
    convert_to_gb(raw).ok_or_else(|| CollectError::Parse(format!("размер '{raw}' не разобран")))
}

/// Converts a `df -h` size such as `2T` or `512M` to gigabytes. An unknown
/// unit yields `0.0`; a malformed number yields `None`.
pub fn convert_to_gb(size: &str) -> Option<f64> {
    let size = size.trim();
    let unit = size.chars().last()?;
    let numeric: f64 = size[..size.len() - unit.len_utf8()]
        .replace(',', ".")
        .parse()
        .ok()?;
    let gb = match unit.to_ascii_lowercase() {
        't' => numeric * 1024.0,
        'g' => numeric,
        'm' => numeric / 1024.0,
        _ => 0.0,
    };
    Some(gb)
}
