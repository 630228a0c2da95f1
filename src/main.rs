mod collectors;
mod config;
mod report;
mod webhook;

use clap::Parser;
use collectors::collect_snapshot;
use collectors::system::HostProbe;
use config::Config;
use std::time::{Duration, Instant, SystemTime};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use webhook::DeliveryOutcome;

#[derive(Parser, Debug)]
#[command(name = "sysreport")]
#[command(version)]
struct Cli {
    /// YAML config; defaults are used when omitted.
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
    /// Overrides the webhook URL from the environment and config.
    #[arg(long)]
    webhook_url: Option<String>,
    /// CPU sampling window, e.g. `10s` or `1m`.
    #[arg(long, value_parser = humantime::parse_duration)]
    cpu_window: Option<Duration>,
    /// Print the report instead of sending it.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match cli.config.as_deref() {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "не удалось загрузить конфигурацию");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    let webhook_url = if cli.dry_run {
        None
    } else {
        match cfg.resolve_webhook_url(cli.webhook_url.as_deref()) {
            Ok(url) => Some(url),
            Err(err) => {
                error!(error = %err, "не удалось определить адрес вебхука");
                std::process::exit(1);
            }
        }
    };

    let cpu_window = match cfg.collect.effective_cpu_window(cli.cpu_window) {
        Ok(window) => window,
        Err(err) => {
            error!(error = %err, "некорректное окно замера CPU");
            std::process::exit(1);
        }
    };

    info!(
        started_at = %humantime::format_rfc3339_seconds(SystemTime::now()),
        cpu_window = %humantime::format_duration(cpu_window),
        "сбор сведений о системе"
    );
    let started = Instant::now();
    let collect_cfg = cfg.collect.clone();
    let snapshot = match tokio::task::spawn_blocking(move || {
        let mut probe = HostProbe::new(&collect_cfg);
        collect_snapshot(&mut probe, cpu_window)
    })
    .await
    {
        Ok(snapshot) => snapshot,
        Err(err) => {
            error!(error = %err, "задача сбора метрик аварийно завершилась");
            std::process::exit(1);
        }
    };
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        missing = ?snapshot.missing_metrics(),
        "сбор завершён"
    );

    let text = report::render_report(&snapshot);
    let Some(url) = webhook_url else {
        println!("{text}");
        return;
    };

    let client = match webhook::build_client(cfg.webhook.timeout()) {
        Ok(client) => client,
        Err(err) => {
            error!(error = %err, "не удалось подготовить отправку");
            std::process::exit(1);
        }
    };

    let host = url.host_str().unwrap_or("-");
    match webhook::send_report(&client, &url, &text).await {
        Ok(DeliveryOutcome::Delivered) => {
            info!(host, "отчёт о системе отправлен");
        }
        Ok(DeliveryOutcome::Rejected { status }) => {
            error!(host, status = status.as_u16(), "вебхук отклонил отчёт");
        }
        Err(err) => {
            error!(error = %err, "отчёт не отправлен");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
