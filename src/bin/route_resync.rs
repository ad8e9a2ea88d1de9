//! Diagnostics CLI for the route resynchronizer.
//!
//! Runs the nudge against the platform audio service (or the in-memory stub)
//! and prints the outcomes plus a telemetry summary.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use route_resync::backend::{self, FaultPlan, StubAudioService, StubTimeSource};
use route_resync::telemetry::{self, TelemetrySnapshot};
use route_resync::{
    AudioService, CoalescingResynchronizer, ResyncConfig, ResyncOutcome, RouteResynchronizer,
};

fn main() -> ExitCode {
    route_resync::init_logging();

    let cli = Cli::parse();
    match cli.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("route-resync error: {err:?}");
            ExitCode::from(1)
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "route-resync", about = "Audio output route resynchronization harness")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn execute(self) -> Result<()> {
        match self.command {
            Command::Resync(args) => resync_command(args),
            Command::Devices => devices_command(),
            Command::Config(args) => config_command(args),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the route nudge and print the outcome of each run as JSON.
    Resync(ResyncArgs),
    /// List output devices on the default audio host.
    Devices,
    /// Print the effective configuration as JSON.
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
struct ConfigArgs {
    /// JSON config file (defaults to assets/route_resync.json)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl ConfigArgs {
    fn load(&self) -> ResyncConfig {
        match &self.config {
            Some(path) => ResyncConfig::load_from_file(path),
            None => ResyncConfig::load(),
        }
    }
}

#[derive(Args, Debug, Clone)]
struct ResyncArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// Use the in-memory stub service instead of real audio hardware.
    #[arg(long)]
    stub: bool,
    /// Number of sequential runs.
    #[arg(long, default_value_t = 1)]
    repeat: u32,
    /// Route calls through the coalescing guard.
    #[arg(long)]
    coalesce: bool,
    /// Inject a failure into the stub service (repeatable, requires --stub).
    #[arg(long = "fail", value_enum)]
    faults: Vec<FaultArg>,
    /// Initial media volume of the stub service.
    #[arg(long, default_value_t = 7)]
    volume: i32,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FaultArg {
    VolumeQuery,
    VolumeUpdate,
    Open,
    Write,
    Start,
    Stop,
}

fn fault_plan(faults: &[FaultArg]) -> FaultPlan {
    faults.iter().fold(FaultPlan::none(), |mut plan, fault| {
        match fault {
            FaultArg::VolumeQuery => plan.volume_query = true,
            FaultArg::VolumeUpdate => plan.volume_update = true,
            FaultArg::Open => plan.open = true,
            FaultArg::Write => plan.write = true,
            FaultArg::Start => plan.start = true,
            FaultArg::Stop => plan.stop = true,
        }
        plan
    })
}

#[derive(Serialize)]
struct StubReport {
    volume_before: i32,
    volume_after: i32,
    volume_writes: u64,
    opened_streams: u64,
    released_streams: u64,
    active_streams: i64,
}

#[derive(Serialize)]
struct ResyncReport {
    config: ResyncConfig,
    runs: Vec<ResyncOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stub: Option<StubReport>,
    telemetry: TelemetrySnapshot,
}

fn run_all<S: AudioService + ?Sized>(
    resynchronizer: RouteResynchronizer,
    coalesce: bool,
    repeat: u32,
    service: &S,
) -> Vec<ResyncOutcome> {
    if coalesce {
        let guard = CoalescingResynchronizer::new(resynchronizer);
        (0..repeat).map(|_| guard.resync(service)).collect()
    } else {
        (0..repeat).map(|_| resynchronizer.resync(service)).collect()
    }
}

fn resync_command(args: ResyncArgs) -> Result<()> {
    if args.repeat == 0 {
        bail!("--repeat must be at least 1");
    }
    if !args.faults.is_empty() && !args.stub {
        bail!("--fail requires --stub");
    }

    let config = args.config.load();
    let resynchronizer = RouteResynchronizer::new(config.clone());

    let (runs, stub) = if args.stub {
        let service =
            StubAudioService::with_faults(fault_plan(&args.faults)).with_volume(args.volume);
        let volume_before = service.volume();
        let resynchronizer = resynchronizer.with_time_source(Arc::new(StubTimeSource::new()));
        let runs = run_all(resynchronizer, args.coalesce, args.repeat, &service);
        let report = StubReport {
            volume_before,
            volume_after: service.volume(),
            volume_writes: service.volume_writes(),
            opened_streams: service.opened_streams(),
            released_streams: service.released_streams(),
            active_streams: service.active_streams(),
        };
        (runs, Some(report))
    } else {
        match backend::default_service() {
            Ok(service) => (
                run_all(resynchronizer, args.coalesce, args.repeat, &service),
                None,
            ),
            Err(err) => {
                let runs = (0..args.repeat)
                    .map(|_| {
                        resynchronizer
                            .resync_if_available::<backend::PlatformAudioService>(Err(err.clone()))
                    })
                    .collect();
                (runs, None)
            }
        }
    };

    let report = ResyncReport {
        config,
        runs,
        stub,
        telemetry: telemetry::hub().snapshot(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize resync report")?
    );
    Ok(())
}

#[cfg(not(target_os = "android"))]
fn devices_command() -> Result<()> {
    let devices = backend::output_devices().context("enumerate output devices")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&devices).context("serialize device list")?
    );
    Ok(())
}

#[cfg(target_os = "android")]
fn devices_command() -> Result<()> {
    bail!("device listing is only available on desktop hosts")
}

fn config_command(args: ConfigArgs) -> Result<()> {
    let config = args.load();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context("serialize config")?
    );
    Ok(())
}
