use std::path::PathBuf;
use std::time::Duration;

use kitchen_sync_lib::config::SyncConfig;
use kitchen_sync_lib::kitchen::KitchenView;
use kitchen_sync_lib::realtime::TransportKind;
use kitchen_sync_lib::{init_tracing, SyncService};

const DEFAULT_REPORT_SECS: u64 = 30;

#[derive(Debug, Default)]
struct CliOptions {
    config_path: Option<PathBuf>,
    base_url: Option<String>,
    transport: Option<TransportKind>,
    report_every: Option<Duration>,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();

    if let Err(error) = run().await {
        tracing::error!("{error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let Some(options) = parse_args()? else {
        return Ok(());
    };

    let mut config = match &options.config_path {
        Some(path) => SyncConfig::from_file(path).map_err(|e| e.to_string())?,
        None => SyncConfig::from_env().map_err(|e| e.to_string())?,
    };
    if let Some(base_url) = options.base_url {
        config.base_url = base_url;
    }
    if let Some(transport) = options.transport {
        config.transport = transport;
    }

    let service = SyncService::from_config(config).map_err(|e| e.to_string())?;
    let view = service.kitchen_view();
    let mut statuses = service.controller().watch_status();

    if let Err(error) = service.start().await {
        tracing::warn!("initial connect failed, retrying in background: {error}");
    }

    let mut report = tokio::time::interval(options.report_every.unwrap_or(Duration::from_secs(DEFAULT_REPORT_SECS)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
            changed = statuses.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *statuses.borrow_and_update();
                if status.is_terminal() {
                    let reason = view.last_error().map(|e| e.to_string()).unwrap_or_default();
                    tracing::error!("push channel down ({status}): {reason}");
                }
            }
            _ = report.tick() => log_board(&view),
        }
    }

    service.stop().await;
    Ok(())
}

fn log_board(view: &KitchenView) {
    let now = chrono::Local::now().naive_local();
    let rows = view.rows(now);
    tracing::info!(
        "kitchen board: {} orders, {} pending, status {}",
        rows.len(),
        view.pending_count(),
        view.status()
    );
    for (row, elapsed) in rows {
        let items: Vec<String> = row
            .order
            .line_items
            .iter()
            .map(|item| format!("{}x {}", item.quantity, item.dish_name))
            .collect();
        let flag = if row.done {
            "done"
        } else if row.in_progress {
            "cooking"
        } else {
            "new"
        };
        tracing::info!(
            "  #{} table {} [{flag}] {} ({})",
            row.order.id,
            row.order.table,
            elapsed.as_deref().unwrap_or("--:--"),
            items.join(", ")
        );
    }
}

fn parse_args() -> Result<Option<CliOptions>, String> {
    let mut options = CliOptions::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            print_help();
            return Ok(None);
        }
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg.clone(), None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match flag.as_str() {
            "--config" => options.config_path = Some(PathBuf::from(value()?)),
            "--base-url" => options.base_url = Some(value()?),
            "--transport" => options.transport = Some(value()?.parse::<TransportKind>()?),
            "--report-every" => {
                let raw = value()?;
                let secs = raw
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or_else(|| format!("--report-every must be a positive number of seconds, got '{raw}'"))?;
                options.report_every = Some(Duration::from_secs(secs));
            }
            _ => return Err(format!("unknown argument '{arg}'. Use --help for usage")),
        }
    }
    Ok(Some(options))
}

fn print_help() {
    println!(
        "kitchen-monitor: follow the kitchen order board from the command line\n\n\
         USAGE:\n    kitchen-monitor [OPTIONS]\n\n\
         OPTIONS:\n\
         \x20   --config <path>          JSON config file (default: KITCHEN_SYNC_* environment)\n\
         \x20   --base-url <url>         backend base URL\n\
         \x20   --transport <sse|stomp>  push channel flavour\n\
         \x20   --report-every <secs>    board log interval (default: {DEFAULT_REPORT_SECS})\n\
         \x20   -h, --help               print this help"
    );
}
