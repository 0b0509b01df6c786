#![deny(warnings)]

//! Headless CLI that runs a dashboard preset and prints its KPIs.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use pulse_core::{Emphasis, MetricStore};
use pulse_presets::{builtin_names, load_preset, DashboardPreset};
use pulse_runtime::{SessionSnapshot, TickContext, TickHook};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    preset: Option<String>,
    ticks: Option<u64>,
    seconds: Option<u64>,
    seed: Option<u64>,
    json: bool,
    version: bool,
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut args = Args::default();
    let mut it = raw.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--preset" => args.preset = Some(it.next().context("--preset needs a value")?),
            "--ticks" => args.ticks = Some(parse_number(&arg, it.next())?),
            "--seconds" => args.seconds = Some(parse_number(&arg, it.next())?),
            "--seed" => args.seed = Some(parse_number(&arg, it.next())?),
            "--json" => args.json = true,
            "--version" => args.version = true,
            other => bail!("unrecognized argument {other:?}"),
        }
    }
    if args.ticks.is_some() && args.seconds.is_some() {
        bail!("--ticks and --seconds are mutually exclusive");
    }
    Ok(args)
}

fn parse_number(flag: &str, value: Option<String>) -> Result<u64> {
    let value = value.with_context(|| format!("{flag} needs a value"))?;
    value
        .parse()
        .with_context(|| format!("{flag} expects a non-negative integer, got {value:?}"))
}

fn kpi_line(store: &MetricStore) -> String {
    store
        .iter()
        .map(|m| format!("{}: {}", m.label(), m.render(store.currency_symbol())))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn marker(emphasis: Emphasis) -> &'static str {
    match emphasis {
        Emphasis::Success => "+",
        Emphasis::Info => "*",
        Emphasis::Warning => "!",
    }
}

/// Prints one KPI line per tick in live mode.
struct KpiPrinter;

impl TickHook for KpiPrinter {
    fn name(&self) -> &str {
        "kpi-printer"
    }

    fn on_tick(&mut self, ctx: TickContext<'_>) -> Result<()> {
        println!("tick {} | {}", ctx.tick, kpi_line(ctx.store));
        if let Some(event) = ctx.log.latest() {
            println!("  {} {}", marker(event.emphasis()), event.message());
        }
        Ok(())
    }
}

fn print_summary(preset: &DashboardPreset, snap: &SessionSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snap)?);
        return Ok(());
    }
    println!(
        "{} | ticks: {} | failed: {} | status: {:?}",
        preset.title(),
        snap.tick_count,
        snap.failed_ticks,
        snap.status
    );
    for reading in snap.metrics.iter() {
        println!("KPI | {}: {}", reading.label, reading.display);
    }
    for event in &snap.events {
        println!("  {} {}", marker(event.emphasis()), event.message());
    }
    Ok(())
}

fn run_stepped(preset: &DashboardPreset, seed: Option<u64>, ticks: u64) -> Result<SessionSnapshot> {
    let mut scheduler = preset.scheduler(seed)?;
    scheduler.start_stepped()?;
    for _ in 0..ticks {
        scheduler.tick_now();
    }
    let snap = scheduler.snapshot();
    scheduler.stop();
    Ok(snap)
}

fn run_live(
    preset: &DashboardPreset,
    seed: Option<u64>,
    seconds: u64,
    echo: bool,
) -> Result<SessionSnapshot> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(async {
        let session = preset.build_session(seed);
        let session = if echo {
            session.with_hook(KpiPrinter)
        } else {
            session
        };
        let mut scheduler = pulse_runtime::PollScheduler::new(session, preset.tick_interval())?;
        scheduler.start()?;
        tokio::time::sleep(Duration::from_secs(seconds)).await;
        let snap = scheduler.snapshot();
        scheduler.stop();
        Ok::<_, anyhow::Error>(snap)
    })
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    if args.version {
        println!(
            "pulse {} ({} {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_SHA"),
            env!("BUILD_DATE")
        );
        return Ok(());
    }

    let name = args.preset.as_deref().unwrap_or("profit");
    let preset = load_preset(name).with_context(|| {
        format!(
            "could not load preset {name:?} (built-ins: {})",
            builtin_names().collect::<Vec<_>>().join(", ")
        )
    })?;
    info!(
        preset = %preset.name,
        ticks = ?args.ticks,
        seconds = ?args.seconds,
        "starting dashboard"
    );

    let snap = match args.seconds {
        Some(seconds) => run_live(&preset, args.seed, seconds, !args.json)?,
        None => run_stepped(&preset, args.seed, args.ticks.unwrap_or(10))?,
    };
    print_summary(&preset, &snap, args.json)
}
