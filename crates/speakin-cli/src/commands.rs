use std::fmt::Write as _;
use std::time::Duration;

use anyhow::{bail, Context};
use colored::Colorize;
use tracing::{debug, info, warn};

use speakin_booking::RecoveryReport;
use speakin_client::{ClientConfig, HttpTransport};
use speakin_protocol::endpoints;
use speakin_saga::{FileSagaLog, SagaJournal, SagaLog, SagaProgress, WalConfig};
use speakin_server::{ServiceKind, SpeakinConfig, SpeakinServer};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Recover(args) => cmd_recover(args, cli.format),
        Command::SagaLog(args) => cmd_saga_log(args, cli.format),
        Command::Config(args) => cmd_config(args),
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting the async runtime")
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<SpeakinConfig> {
    match path {
        Some(path) => SpeakinConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(SpeakinConfig::default()),
    }
}

/// Config file plus command-line overrides.
fn serve_config(args: &ServeArgs) -> anyhow::Result<SpeakinConfig> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        match args.service {
            ServiceArg::Ledger => config.ledger.bind_addr = bind,
            ServiceArg::Escrow => config.escrow.bind_addr = bind,
            ServiceArg::Booking => config.booking.bind_addr = bind,
            ServiceArg::All => bail!("--bind is ambiguous with `all`; set the addresses in the config file"),
        }
    }
    if let Some(path) = &args.saga_log {
        config.booking.saga_log = path.clone();
    }
    if args.no_recover {
        config.booking.recover_on_start = false;
    }
    Ok(config)
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = serve_config(&args)?;
    let kind = match args.service {
        ServiceArg::Ledger => ServiceKind::Ledger,
        ServiceArg::Escrow => ServiceKind::Escrow,
        ServiceArg::Booking => ServiceKind::Booking,
        ServiceArg::All => ServiceKind::All,
    };
    info!(service = ?kind, saga_log = %config.booking.saga_log.display(), "starting services");
    runtime()?.block_on(SpeakinServer::new(config).serve(kind))?;
    info!("services stopped");
    Ok(())
}

fn cmd_recover(args: RecoverArgs, format: OutputFormat) -> anyhow::Result<()> {
    let client = ClientConfig::new(args.url.clone()).with_timeout(Duration::from_secs(args.timeout_secs));
    let transport = HttpTransport::new(&client)?.with_bearer(args.token);
    info!(url = %args.url, "requesting recovery sweep");
    let report: RecoveryReport = runtime()?
        .block_on(transport.post_json("recover", endpoints::ADMIN_RECOVER, &serde_json::json!({})))
        .with_context(|| format!("recovery request to {}", args.url))?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", render_report(&report)),
    }
    if !report.is_clean() {
        warn!(failed = report.failed.len(), "recovery left sagas open");
        bail!("{} sagas are still open", report.failed.len());
    }
    Ok(())
}

fn render_report(report: &RecoveryReport) -> String {
    let mut out = String::new();
    let mark = if report.is_clean() { "✓".green().bold() } else { "✗".red().bold() };
    let _ = writeln!(out, "{mark} Recovery sweep finished");
    let _ = writeln!(out, "  Rolled forward: {}", report.rolled_forward.to_string().bold());
    let _ = writeln!(out, "  Compensated:    {}", report.compensated.to_string().bold());
    let _ = writeln!(out, "  Compacted:      {} records", report.compacted);
    for (saga, error) in &report.failed {
        let _ = writeln!(out, "  {} {saga}: {error}", "open".red());
    }
    out
}

fn cmd_saga_log(args: SagaLogArgs, format: OutputFormat) -> anyhow::Result<()> {
    let sagas = read_sagas(&args)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&sagas)?),
        OutputFormat::Text => print!("{}", render_sagas(&sagas, args.all)),
    }
    Ok(())
}

fn read_sagas(args: &SagaLogArgs) -> anyhow::Result<Vec<SagaProgress>> {
    if !args.path.exists() {
        bail!("no saga log at {}", args.path.display());
    }
    let log = FileSagaLog::open(&args.path, WalConfig::default())
        .with_context(|| format!("opening {}", args.path.display()))?;
    let records = log.records()?;
    debug!(path = %args.path.display(), records = records.len(), "saga log read");
    Ok(if args.all {
        SagaJournal::replay(&records).into_values().collect()
    } else {
        SagaJournal::open_sagas(&records)
    })
}

fn render_sagas(sagas: &[SagaProgress], all: bool) -> String {
    let mut out = String::new();
    if sagas.is_empty() {
        let what = if all { "No sagas recorded." } else { "No open sagas." };
        let _ = writeln!(out, "{} {what}", "✓".green());
        return out;
    }
    for saga in sagas {
        let state = if saga.is_open() { "open".yellow().bold() } else { "closed".green() };
        let last = saga.last_step().map_or_else(|| "begun".to_string(), ToString::to_string);
        let _ = writeln!(
            out,
            "{}  {state}  last: {}  started {}",
            saga.id.to_string().bold(),
            last.cyan(),
            saga.started_at.format("%Y-%m-%d %H:%M:%S")
        );
        for step in &saga.steps {
            let _ = writeln!(out, "    {step}");
        }
    }
    out
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    print!("{}", config.to_toml()?);
    Ok(())
}
