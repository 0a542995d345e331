use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
#[cfg(feature = "colors")]
use owo_colors::OwoColorize;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use claude_usage_monitor::automation::AutomationTrigger;
use claude_usage_monitor::cli::Args;
use claude_usage_monitor::credentials::{SecretStore, default_backend};
#[cfg(not(feature = "colors"))]
use claude_usage_monitor::display::color_shim::ColorizeShim as OwoColorize;
use claude_usage_monitor::display::{menu_bar_text, render_json, render_text};
use claude_usage_monitor::history::LogAggregator;
use claude_usage_monitor::logging::init_logging;
use claude_usage_monitor::orchestrator::{
    MonitorState, RefreshOrchestrator, RefreshState, Scheduler,
};
use claude_usage_monitor::settings::{SettingsFile, SettingsSource, default_settings_path};
use claude_usage_monitor::usage_api::{UreqTransport, UsageApiClient};
use claude_usage_monitor::utils::claude_dir;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.log_format)?;

    let claude_dir = claude_dir(args.claude_config_dir.as_deref());
    let settings_path = args.settings.clone().unwrap_or_else(default_settings_path);
    debug!(claude_dir = %claude_dir.display(), settings = %settings_path.display(), "paths resolved");

    let settings: Arc<dyn SettingsSource> =
        Arc::new(SettingsFile::new(settings_path).with_window_override(args.window_hours));
    let secrets = Arc::new(SecretStore::new(default_backend(&claude_dir)));
    let api = Arc::new(UsageApiClient::new(secrets, Box::new(UreqTransport::new())));
    let orchestrator = Arc::new(RefreshOrchestrator::new(
        api,
        LogAggregator::new(&claude_dir),
        AutomationTrigger::new(),
        settings.clone(),
    ));

    if args.once {
        orchestrator.refresh();
        let state = orchestrator.current();
        print_state(&state, settings.as_ref(), args.json)?;
        if matches!(state.state, RefreshState::Failed(_)) {
            std::process::exit(1);
        }
        return Ok(());
    }

    let updates = orchestrator.subscribe();
    let json = args.json;
    let printer_settings = settings.clone();
    thread::Builder::new()
        .name("usage-printer".to_string())
        .spawn(move || {
            for state in updates {
                if let Err(e) = print_state(&state, printer_settings.as_ref(), json) {
                    tracing::warn!(error = %format!("{e:#}"), "failed to render state");
                }
            }
        })
        .context("spawn printer thread")?;

    let scheduler = Scheduler::start(orchestrator, Duration::from_secs(args.interval))
        .context("start refresh scheduler")?;
    info!(interval_secs = args.interval, "monitor started; 'r' refreshes, 'q' quits");

    for line in io::stdin().lock().lines() {
        match line.context("read stdin")?.trim() {
            "r" | "R" => scheduler.request_manual_refresh(),
            "q" | "Q" => break,
            "" => {}
            other => debug!(input = other, "ignored input"),
        }
    }

    scheduler.stop();
    Ok(())
}

fn print_state(state: &MonitorState, settings: &dyn SettingsSource, json: bool) -> Result<()> {
    if json {
        println!("{}", render_json(state)?);
    } else {
        let now = Utc::now();
        println!("{}", menu_bar_text(state).bold());
        println!("{}\n", render_text(state, &settings.current(), now));
    }
    Ok(())
}
