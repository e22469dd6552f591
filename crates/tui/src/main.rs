mod renderer;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use lanescope_core::mask::{self, ExecutionMaskSet};
use lanescope_core::rpc::ScriptedSession;
use lanescope_core::{JsonFileStore, MemoryStore, Settings, StateStore, StopEvent, ViewSync};
use lanescope_protocol::{CoreMessage, ThreadFilter};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lanescope")]
#[command(about = "SIMD lane inspection for GPU debug sessions", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level (overrides LANESCOPE_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a thread filter into the backend command.
    Filter {
        /// Thread ids, comma separated, or `*`.
        #[arg(long)]
        threads: Option<String>,
        /// Lane ids, comma separated, or `--all-lanes` / `--selected-lanes`.
        #[arg(long, allow_hyphen_values = true)]
        lanes: Option<String>,
        #[arg(long)]
        local_work_item: Option<String>,
        #[arg(long)]
        global_work_item: Option<String>,
        #[arg(long)]
        work_group: Option<String>,
        /// Free-form backend condition.
        #[arg(long)]
        expr: Option<String>,
    },

    /// Decode an execution mask into lane states.
    Decode {
        mask: String,
        #[arg(long, default_value_t = 8)]
        width: u32,
        #[arg(long)]
        hit: Option<String>,
        #[arg(long)]
        current: Option<u32>,
    },

    /// Replay a recorded debug session transcript.
    Replay {
        transcript: PathBuf,
        /// Stop reason to replay.
        #[arg(long, default_value = "breakpoint")]
        reason: String,
        #[arg(long)]
        thread: Option<u64>,
        #[arg(long)]
        lane: Option<u32>,
        #[arg(long)]
        hit_mask: Option<String>,
        /// View events to dispatch after the stop, one JSON object per line.
        #[arg(long)]
        events: Option<PathBuf>,
        /// Persist state to this JSON file instead of memory.
        #[arg(long)]
        state: Option<PathBuf>,
        /// Print the core messages as JSON lines instead of opening the
        /// terminal view.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Command::Filter {
            threads,
            lanes,
            local_work_item,
            global_work_item,
            work_group,
            expr,
        } => {
            let filter = ThreadFilter {
                filter: expr,
                thread_value: threads,
                lane_value: lanes,
                local_work_item_value: local_work_item,
                global_work_item_value: global_work_item,
                work_group_value: work_group,
            }
            .migrated();
            match lanescope_core::filter::compile(&filter) {
                Some(command) => writeln!(std::io::stdout().lock(), "{command}")?,
                None => eprintln!("nothing to send"),
            }
        }
        Command::Decode {
            mask: execution_mask,
            width,
            hit,
            current,
        } => {
            let set = ExecutionMaskSet {
                execution_mask,
                hit_lanes_mask: hit,
                length: width,
            };
            let lanes = mask::decode(&set, current)?;
            let symbols = settings.lane_symbols()?;
            let mut out = std::io::stdout().lock();
            for lane in &lanes {
                let symbol = symbols.for_lane(lane).unwrap_or(' ');
                let marker = if lane.current { " *" } else { "" };
                writeln!(out, "{:>3} {symbol} {}{marker}", lane.lane_id, lane.state)?;
            }
        }
        Command::Replay {
            transcript,
            reason,
            thread,
            lane,
            hit_mask,
            events,
            state,
            json,
        } => {
            let text = std::fs::read_to_string(&transcript)
                .with_context(|| format!("reading {}", transcript.display()))?;
            let session = ScriptedSession::from_json(&text)
                .with_context(|| format!("parsing {}", transcript.display()))?;
            let stop = StopEvent {
                reason,
                thread_id: thread,
                lane,
                hit_lanes_mask: hit_mask,
                breakpoint_type: None,
            };
            let replay = Replay {
                session,
                settings,
                stop,
                events,
                json,
            };
            match state {
                Some(path) => replay.run(JsonFileStore::open(path))?,
                None => replay.run(MemoryStore::new())?,
            }
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("LANESCOPE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(Settings::from_toml(&text)?)
}

struct Replay {
    session: ScriptedSession,
    settings: Settings,
    stop: StopEvent,
    events: Option<PathBuf>,
    json: bool,
}

impl Replay {
    fn run<St: StateStore>(self, store: St) -> Result<()> {
        let Replay {
            session,
            settings,
            stop,
            events,
            json,
        } = self;
        let runtime = tokio::runtime::Builder::new_current_thread().build()?;
        let sync = ViewSync::new(Some(session), store, settings)?;

        let messages = runtime.block_on(async {
            let mut messages = sync.on_stop(stop).await;
            if let Some(path) = &events {
                let events = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                for line in events.lines().filter(|l| !l.trim().is_empty()) {
                    messages.extend(sync.dispatch_json(line).await);
                }
            }
            anyhow::Ok(messages)
        })?;

        if json {
            let mut out = std::io::stdout().lock();
            for message in &messages {
                writeln!(out, "{}", serde_json::to_string(message)?)?;
            }
            return Ok(());
        }

        if let Some(CoreMessage::Error { message }) = messages
            .iter()
            .find(|m| matches!(m, CoreMessage::Error { .. }))
        {
            tracing::error!(%message, "replay reported an error");
        }
        let Some(snapshot) = sync.snapshot() else {
            bail!("replay produced no lane snapshot");
        };
        renderer::render_tui(&snapshot, &sync.watch_tree(), sync.symbols())
    }
}
