//! LocalSpeed CLI — network speed test against a LocalSpeed server

use std::io::{self, IsTerminal, Write};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use localspeed::engine::TestEvent;
use localspeed::error::SpeedError;
use localspeed::options::{DeviceProfile, TestOptions};
use localspeed::orchestrator::{NoopSink, ResultSink, SpeedTest};
use localspeed::transfer::{HttpTransport, SimulatedTransport, Transport};
use localspeed::types::TestResult;
use localspeed_app::data::{HistoryMode, LocalHistory, Settings, SpeedUnit, Store};
use localspeed_app::error::{AppError, Result};
use localspeed_app::network::RemoteHistory;

#[derive(Parser)]
#[command(name = "localspeed", about = "Network speed test for a LocalSpeed server", version)]
struct Cli {
    /// Server base URL, e.g. http://192.168.1.10:8000
    server_url: Option<String>,

    /// Maximum parallel streams (1 = single connection)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Duration of each phase in milliseconds
    #[arg(short, long)]
    duration_ms: Option<u64>,

    #[arg(long, value_enum)]
    profile: Option<ProfileArg>,

    #[arg(short, long, value_enum)]
    unit: Option<UnitArg>,

    /// Where to save the result
    #[arg(long, value_enum)]
    history: Option<HistoryArg>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Run against a simulated link with this per-stream rate (Mbps)
    #[arg(long, value_name = "MBPS")]
    simulate: Option<f64>,

    /// Show the N most recent saved results and exit
    #[arg(long, value_name = "N")]
    recent: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProfileArg {
    Desktop,
    Constrained,
}

#[derive(Clone, Copy, ValueEnum)]
enum UnitArg {
    Mbps,
    Mbs,
}

#[derive(Clone, Copy, ValueEnum)]
enum HistoryArg {
    Remote,
    Local,
    None,
}

impl From<ProfileArg> for DeviceProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Desktop => DeviceProfile::Desktop,
            ProfileArg::Constrained => DeviceProfile::Constrained,
        }
    }
}

impl From<UnitArg> for SpeedUnit {
    fn from(arg: UnitArg) -> Self {
        match arg {
            UnitArg::Mbps => SpeedUnit::Mbps,
            UnitArg::Mbs => SpeedUnit::MegabytesPerSecond,
        }
    }
}

impl From<HistoryArg> for HistoryMode {
    fn from(arg: HistoryArg) -> Self {
        match arg {
            HistoryArg::Remote => HistoryMode::Remote,
            HistoryArg::Local => HistoryMode::Local,
            HistoryArg::None => HistoryMode::None,
        }
    }
}

impl Cli {
    /// Saved settings with command-line overrides applied
    fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(url) = &self.server_url {
            settings.test.server_url = url.clone();
        }
        if let Some(threads) = self.threads {
            settings.test.max_threads = threads;
        }
        if let Some(duration_ms) = self.duration_ms {
            settings.test.test_duration_ms = duration_ms;
        }
        if let Some(profile) = self.profile {
            settings.test.device_profile = profile.into();
        }
        if let Some(unit) = self.unit {
            settings.unit = unit.into();
        }
        if let Some(history) = self.history {
            settings.history = history.into();
        }
        settings
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        debug!(error = %e, "exiting with error");
        eprintln!("Error: {}", e.user_message());
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let store = Store::default_location()?;
    let settings = cli.apply(Settings::load(&store)?);

    if let Some(n) = cli.recent {
        return print_recent(&store, &settings, n, cli.json);
    }

    let options = settings.test_options()?;
    let (transport, sink): (Arc<dyn Transport>, Arc<dyn ResultSink>) = match cli.simulate {
        // Simulated runs are never saved
        Some(mbps) => (
            Arc::new(SimulatedTransport::new(mbps * 1_000_000.0)),
            Arc::new(NoopSink),
        ),
        None => (Arc::new(HttpTransport::new()?), sink_for(&store, &settings)?),
    };

    let outcome = run_test(options, transport, sink, settings.unit);
    match outcome {
        Ok(result) => {
            print_result(&result, settings.unit, cli.json)?;
            Ok(())
        }
        // The measurement finished; only saving it failed
        Err((SpeedError::Persistence(msg), Some(result))) => {
            print_result(&result, settings.unit, cli.json)?;
            Err(AppError::Storage(msg))
        }
        Err((e, _)) => Err(e.into()),
    }
}

fn sink_for(store: &Store, settings: &Settings) -> Result<Arc<dyn ResultSink>> {
    Ok(match settings.history {
        HistoryMode::Remote => Arc::new(RemoteHistory::new(
            &settings.test.server_url,
            &settings.language,
            settings.theme,
        )?),
        HistoryMode::Local => Arc::new(LocalHistory::new(store.clone())),
        HistoryMode::None => Arc::new(NoopSink),
    })
}

/// Run one test on a background thread, rendering progress from its events.
/// On failure, returns the error plus the result if the test got that far.
fn run_test(
    options: TestOptions,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn ResultSink>,
    unit: SpeedUnit,
) -> std::result::Result<TestResult, (SpeedError, Option<TestResult>)> {
    let test = Arc::new(SpeedTest::new(options, transport, sink));
    let events = test.subscribe();

    let runner = {
        let test = test.clone();
        thread::Builder::new()
            .name("speed-test".into())
            .spawn(move || test.run())
            .map_err(|e| (SpeedError::Spawn(e.to_string()), None))?
    };

    let mut progress = Progress::new(unit);
    while !runner.is_finished() {
        progress.drain(&events, Duration::from_millis(100));
    }
    progress.drain(&events, Duration::ZERO);
    progress.finish();

    let outcome = runner
        .join()
        .unwrap_or_else(|_| Err(SpeedError::Spawn("test thread panicked".to_string())));
    outcome.map_err(|e| (e, progress.result))
}

/// One-line live progress on stderr
struct Progress {
    unit: SpeedUnit,
    live: bool,
    drawn: bool,
    result: Option<TestResult>,
}

impl Progress {
    fn new(unit: SpeedUnit) -> Self {
        Self {
            unit,
            live: io::stderr().is_terminal(),
            drawn: false,
            result: None,
        }
    }

    fn drain(&mut self, events: &Receiver<TestEvent>, wait: Duration) {
        match events.recv_timeout(wait) {
            Ok(event) => self.handle(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return,
        }
        while let Ok(event) = events.try_recv() {
            self.handle(event);
        }
    }

    fn handle(&mut self, event: TestEvent) {
        match event {
            TestEvent::IdleLatency(stats) if stats.is_known() => {
                self.line(&format!(
                    "Ping {:.1} ms, jitter {:.1} ms",
                    stats.min_ms, stats.jitter_ms
                ));
            }
            TestEvent::IdleLatency(_) => self.line("Ping unavailable"),
            TestEvent::SpeedUpdate(update) if self.live => {
                let text = format!(
                    "{:<8} {:>14}  avg {:>14}  {} workers  {:.1}s",
                    update.direction.to_string(),
                    self.unit.format(update.ui_rate_bps),
                    self.unit.format(update.average_bps),
                    update.active_workers,
                    update.elapsed_secs,
                );
                eprint!("\r\x1b[2K{text}");
                let _ = io::stderr().flush();
                self.drawn = true;
            }
            TestEvent::PhaseComplete(phase) => {
                self.line(&format!(
                    "{:<8} {} ({} workers)",
                    phase.direction.to_string(),
                    self.unit.format(phase.speed_bits_per_second),
                    phase.workers
                ));
            }
            TestEvent::TestComplete(result) => self.result = Some(result),
            _ => {}
        }
    }

    fn line(&mut self, text: &str) {
        if self.drawn {
            eprint!("\r\x1b[2K");
            self.drawn = false;
        }
        eprintln!("{text}");
    }

    fn finish(&mut self) {
        if self.drawn {
            eprintln!();
            self.drawn = false;
        }
    }
}

fn print_result(result: &TestResult, unit: SpeedUnit, json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(result)
            .map_err(|e| AppError::Storage(format!("Failed to serialize result: {e}")))?;
        println!("{text}");
        return Ok(());
    }

    println!("Ping:      {:.1} ms (jitter {:.1} ms)", result.ping_ms, result.jitter_ms);
    for phase in [&result.download, &result.upload] {
        println!(
            "{:<10} {} (loaded ping {:.1} ms)",
            format!("{}:", phase.direction),
            unit.format(phase.speed_bits_per_second),
            phase.loaded_ping_ms
        );
    }
    println!("Mode:      {}", result.mode);
    Ok(())
}

fn print_recent(store: &Store, settings: &Settings, n: usize, json: bool) -> Result<()> {
    let unit = settings.unit;
    match settings.history {
        HistoryMode::Local => {
            let entries = LocalHistory::new(store.clone()).recent(n)?;
            if json {
                println!("{}", to_json(&entries)?);
                return Ok(());
            }
            for e in entries {
                println!(
                    "{}  ping {:>6.1} ms  down {:>14}  up {:>14}  {}",
                    e.timestamp,
                    e.ping_ms,
                    unit.format(e.download_mbps * 1_000_000.0),
                    unit.format(e.upload_mbps * 1_000_000.0),
                    e.mode
                );
            }
        }
        HistoryMode::Remote => {
            let history =
                RemoteHistory::new(&settings.test.server_url, &settings.language, settings.theme)?;
            let page = history.recent(n)?;
            if json {
                let rows: Vec<_> = page
                    .data
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "date": r.date,
                            "ping": r.ping,
                            "download": r.download,
                            "upload": r.upload,
                        })
                    })
                    .collect();
                println!("{}", to_json(&rows)?);
                return Ok(());
            }
            for r in page.data {
                println!(
                    "{}  ping {:>6.1} ms  down {:>14}  up {:>14}",
                    r.date.as_deref().unwrap_or("-"),
                    r.ping,
                    unit.format(r.download * 1_000_000.0),
                    unit.format(r.upload * 1_000_000.0)
                );
            }
            println!("({} saved on the server)", page.total);
        }
        HistoryMode::None => eprintln!("History is disabled"),
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Storage(format!("Failed to serialize history: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from([
            "localspeed",
            "http://10.0.0.2:8000",
            "--threads",
            "1",
            "--duration-ms",
            "5000",
            "--profile",
            "constrained",
            "--unit",
            "mbs",
            "--history",
            "none",
        ]);
        let settings = cli.apply(Settings::default());
        assert_eq!(settings.test.server_url, "http://10.0.0.2:8000");
        assert_eq!(settings.test.max_threads, 1);
        assert_eq!(settings.test.test_duration_ms, 5000);
        assert_eq!(settings.test.device_profile, DeviceProfile::Constrained);
        assert_eq!(settings.unit, SpeedUnit::MegabytesPerSecond);
        assert_eq!(settings.history, HistoryMode::None);
    }

    #[test]
    fn no_flags_keep_settings() {
        let cli = Cli::parse_from(["localspeed"]);
        let mut saved = Settings::default();
        saved.test.max_threads = 3;
        saved.history = HistoryMode::Local;
        assert_eq!(cli.apply(saved.clone()), saved);
    }

    #[test]
    fn simulated_run_completes() {
        let mut options = TestOptions::default();
        options.test_duration_ms = 600;
        options.cooldown_ms = 10;
        options.idle_probes = 3;
        options.idle_warmup_probes = 0;
        let transport = Arc::new(SimulatedTransport::new(50_000_000.0));

        let result = run_test(options, transport, Arc::new(NoopSink), SpeedUnit::Mbps)
            .map_err(|(e, _)| e)
            .unwrap();
        assert!(result.download.speed_bits_per_second > 0.0);
        assert!(result.upload.speed_bits_per_second > 0.0);
    }
}
