use crate::collectors::{DiskInfo, Measured, SystemSnapshot, SENTINEL};
use std::fmt::Write;

const FENCE: &str = "```";

/// Renders the snapshot as the fixed-layout block posted to the webhook.
pub fn render_report(snapshot: &SystemSnapshot) -> String {
    let mut out = String::with_capacity(512);
    let _ = writeln!(out, "{FENCE}");
    let _ = writeln!(out, "OS information:");
    let _ = writeln!(out, "System: {}", snapshot.system);
    let _ = writeln!(out, "Release: {}", snapshot.release);
    let _ = writeln!(out, "Distribution: {}", snapshot.distribution);
    let _ = writeln!(out, "Hostname: {}", snapshot.hostname);
    let _ = writeln!(out, "IP Address: {}", snapshot.ip_address);
    let _ = writeln!(out, "Uptime: {}", snapshot.uptime);

    let _ = writeln!(out, "\nDisk Info:");
    match snapshot.disk.value() {
        Some(DiskInfo {
            total_gb,
            used_gb,
            free_gb,
            usage_percent,
        }) => {
            let _ = writeln!(out, "Total Space: {total_gb:.2} GB");
            let _ = writeln!(out, "Used Space: {used_gb:.2} GB");
            let _ = writeln!(out, "Free Space: {free_gb:.2} GB");
            let _ = writeln!(out, "Usage Percentage: {usage_percent}");
        }
        None => {
            for label in ["Total Space", "Used Space", "Free Space", "Usage Percentage"] {
                let _ = writeln!(out, "{label}: {SENTINEL}");
            }
        }
    }

    let _ = writeln!(out, "\nRunning Processes: {}", snapshot.running_processes);
    let _ = writeln!(out, "Logged-in Users: {}", snapshot.logged_in_users);
    let window_secs = snapshot.cpu_window.as_secs();
    match &snapshot.cpu_usage_percent {
        Measured::Value(pct) => {
            let _ = writeln!(out, "CPU Usage (last {window_secs} seconds): {pct:.2}%");
        }
        Measured::NotAvailable => {
            let _ = writeln!(out, "CPU Usage (last {window_secs} seconds): {SENTINEL}");
        }
    }
    out.push_str(FENCE);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn snapshot() -> SystemSnapshot {
        SystemSnapshot {
            system: Measured::Value("Linux".to_string()),
            release: Measured::Value("6.1.0-18-amd64".to_string()),
            distribution: Measured::Value("Debian GNU/Linux 12 (bookworm)".to_string()),
            hostname: Measured::Value("web-01".to_string()),
            ip_address: Measured::Value("10.0.0.5".to_string()),
            uptime: Measured::Value("up 3 days, 2 hours".to_string()),
            disk: Measured::Value(DiskInfo {
                total_gb: 465.7612,
                used_gb: 120.25,
                free_gb: 345.511,
                usage_percent: "26%".to_string(),
            }),
            running_processes: Measured::Value(142),
            logged_in_users: Measured::Value(2),
            cpu_usage_percent: Measured::Value(12.3456),
            cpu_window: Duration::from_secs(10),
        }
    }

    #[test]
    fn renders_exact_layout() {
        let expected = "```
OS information:
System: Linux
Release: 6.1.0-18-amd64
Distribution: Debian GNU/Linux 12 (bookworm)
Hostname: web-01
IP Address: 10.0.0.5
Uptime: up 3 days, 2 hours

Disk Info:
Total Space: 465.76 GB
Used Space: 120.25 GB
Free Space: 345.51 GB
Usage Percentage: 26%

Running Processes: 142
Logged-in Users: 2
CPU Usage (last 10 seconds): 12.35%
```";
        assert_eq!(render_report(&snapshot()), expected);
    }

    #[test]
    fn unavailable_fields_render_sentinel() {
        let mut s = snapshot();
        s.ip_address = Measured::NotAvailable;
        s.disk = Measured::NotAvailable;
        s.running_processes = Measured::NotAvailable;
        s.cpu_usage_percent = Measured::NotAvailable;

        let text = render_report(&s);
        assert!(text.contains("IP Address: Not available\n"));
        assert!(text.contains(
            "Total Space: Not available\nUsed Space: Not available\nFree Space: Not available\nUsage Percentage: Not available\n"
        ));
        assert!(text.contains("Running Processes: Not available\n"));
        assert!(text.contains("CPU Usage (last 10 seconds): Not available\n```"));
    }

    #[test]
    fn window_label_follows_sample_window() {
        let mut s = snapshot();
        s.cpu_window = Duration::from_secs(30);
        assert!(render_report(&s).contains("CPU Usage (last 30 seconds): 12.35%"));
    }
}
