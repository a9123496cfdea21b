//! VDA5050 fleet simulator CLI
//!
//! Entry point for the `vda5050-sim` command-line tool.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing::{error, info, warn};
use vda5050_sim::signal::{SignalHandler, EXIT_CODE_INTERRUPTED};
use vda5050_sim::{
    init_tracing, EffectiveConfig, FleetRouter, FleetSupervisor, JsonLinesTransport, RobotExit,
    RobotInput, RobotMachine, RobotSpec, SimConfig, Transport,
};
use vda_protocol::{decode_inbound, Channel, InboundMessage};

/// Run failed (robot panicked, order rejected)
const EXIT_CODE_FAILURE: i32 = 1;
/// Bad configuration or input file
const EXIT_CODE_USAGE: i32 = 2;

#[derive(Parser)]
#[command(name = "vda5050-sim")]
#[command(about = "VDA5050 AGV fleet simulator", version)]
struct Cli {
    /// Path to a TOML config file layered over the built-in defaults
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// RNG seed for error and action-failure injection
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fleet: JSON lines in on stdin, snapshots out on stdout
    Run {
        /// Number of generated robots (ignored when robots are listed in config)
        #[arg(long, short = 'n')]
        robots: Option<usize>,

        /// Tick period in milliseconds
        #[arg(long)]
        tick_ms: Option<u64>,

        /// Stop after this many wall-clock seconds
        #[arg(long)]
        duration: Option<f64>,
    },

    /// Run one robot against an order file in simulated time
    Simulate {
        /// Order JSON file
        order: PathBuf,

        /// Simulated seconds to run
        #[arg(long, default_value_t = 60.0)]
        seconds: f64,

        /// Instant actions to deliver at a simulated time, as SECONDS:FILE
        #[arg(long = "instant", value_parser = parse_timed_file)]
        instants: Vec<(f64, PathBuf)>,

        /// Print every state snapshot instead of only the last
        #[arg(long)]
        trace: bool,

        /// Start position x
        #[arg(long)]
        x: Option<f64>,

        /// Start position y
        #[arg(long)]
        y: Option<f64>,
    },

    /// Classify an order against an idle robot
    Validate {
        /// Order JSON file
        order: PathBuf,

        /// Robot position x
        #[arg(long, default_value_t = 0.0)]
        x: f64,

        /// Robot position y
        #[arg(long, default_value_t = 0.0)]
        y: f64,
    },

    /// Print the effective configuration with provenance
    Config {
        /// Number of generated robots
        #[arg(long, short = 'n')]
        robots: Option<usize>,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Run {
            robots,
            tick_ms,
            duration,
        } => {
            let overrides = cli_overrides(robots, tick_ms, cli.seed);
            run_fleet(cli.config.as_deref(), overrides, duration)
        }
        Commands::Simulate {
            order,
            seconds,
            instants,
            trace,
            x,
            y,
        } => {
            let overrides = cli_overrides(None, None, cli.seed);
            run_simulate(cli.config.as_deref(), overrides, &order, seconds, &instants, trace, x, y)
        }
        Commands::Validate { order, x, y } => {
            let overrides = cli_overrides(None, None, cli.seed);
            run_validate(cli.config.as_deref(), overrides, &order, x, y)
        }
        Commands::Config { robots } => {
            let overrides = cli_overrides(robots, None, cli.seed);
            run_config(cli.config.as_deref(), overrides)
        }
    };

    process::exit(code);
}

/// CLI flags as a config layer; `None` when no flag was given.
fn cli_overrides(robots: Option<usize>, tick_ms: Option<u64>, seed: Option<u64>) -> Option<Value> {
    let mut layer = serde_json::Map::new();
    if let Some(count) = robots {
        layer.insert("fleet".to_string(), json!({ "robot_count": count }));
    }
    if let Some(period) = tick_ms {
        layer.insert("tick".to_string(), json!({ "period_ms": period }));
    }
    if let Some(seed) = seed {
        layer.insert("errors".to_string(), json!({ "seed": seed }));
    }
    if layer.is_empty() {
        None
    } else {
        Some(Value::Object(layer))
    }
}

fn load_config(path: Option<&Path>, overrides: Option<Value>) -> Result<(EffectiveConfig, SimConfig), i32> {
    let effective = EffectiveConfig::build(path, overrides).map_err(|e| {
        eprintln!("Configuration error: {}", e);
        EXIT_CODE_USAGE
    })?;
    let settings = effective.settings().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        EXIT_CODE_USAGE
    })?;
    Ok((effective, settings))
}

fn read_file(path: &Path) -> Result<Vec<u8>, i32> {
    std::fs::read(path).map_err(|e| {
        eprintln!("Error reading {}: {}", path.display(), e);
        EXIT_CODE_USAGE
    })
}

/// Negative and NaN become zero, overflow saturates.
fn seconds_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

fn parse_timed_file(s: &str) -> Result<(f64, PathBuf), String> {
    let (at, file) = s
        .split_once(':')
        .ok_or_else(|| format!("expected SECONDS:FILE, got '{}'", s))?;
    let at: f64 = at
        .parse()
        .map_err(|_| format!("invalid time '{}'", at))?;
    if !at.is_finite() || at < 0.0 {
        return Err(format!("time must be non-negative, got {}", at));
    }
    Ok((at, PathBuf::from(file)))
}

/// One inbound message on stdin
#[derive(Debug, Deserialize)]
struct InboundLine {
    robot: String,
    channel: Channel,
    payload: Value,
}

fn run_fleet(config_path: Option<&Path>, overrides: Option<Value>, duration: Option<f64>) -> i32 {
    let (_, config) = match load_config(config_path, overrides) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    let signals = SignalHandler::new();
    if let Err(e) = signals.install() {
        eprintln!("Error installing signal handler: {}", e);
        return EXIT_CODE_FAILURE;
    }

    let output = JsonLinesTransport::stdout();
    let mut fleet = FleetSupervisor::new(config);
    if let Err(e) = fleet.start_all(|_| Box::new(output.clone()) as Box<dyn Transport>) {
        eprintln!("Error starting fleet: {}", e);
        fleet.stop_all();
        return EXIT_CODE_FAILURE;
    }
    info!(robots = fleet.robot_ids().len(), "fleet running");

    let router = fleet.router();
    // Detached: a blocking stdin read cannot be interrupted.
    let reader = std::thread::Builder::new()
        .name("stdin-router".to_string())
        .spawn(move || route_stdin(router));
    if let Err(e) = reader {
        warn!(error = %e, "stdin reader not started; running without inbound messages");
    }

    let limit = duration.map(seconds_to_duration);
    let interrupted = signals.wait_for_shutdown(Duration::from_millis(50), limit);

    let exits = fleet.stop_all();
    let panicked: Vec<&String> = exits
        .iter()
        .filter(|(_, exit)| **exit == RobotExit::Panicked)
        .map(|(id, _)| id)
        .collect();
    if !panicked.is_empty() {
        error!(robots = ?panicked, "robots ended by panic");
        return EXIT_CODE_FAILURE;
    }

    if interrupted {
        EXIT_CODE_INTERRUPTED
    } else {
        0
    }
}

fn route_stdin(router: FleetRouter) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let inbound: InboundLine = match serde_json::from_str(&line) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, "ignoring malformed input line");
                continue;
            }
        };
        let payload = match serde_json::to_vec(&inbound.payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "ignoring unencodable payload");
                continue;
            }
        };
        if let Err(e) = router.deliver(&inbound.robot, inbound.channel, payload) {
            warn!(robot = %inbound.robot, error = %e, "delivery failed");
        }
    }
    info!("stdin closed");
}

#[allow(clippy::too_many_arguments)]
fn run_simulate(
    config_path: Option<&Path>,
    overrides: Option<Value>,
    order_path: &Path,
    seconds: f64,
    instants: &[(f64, PathBuf)],
    trace: bool,
    x: Option<f64>,
    y: Option<f64>,
) -> i32 {
    let (_, config) = match load_config(config_path, overrides) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    let Some(mut spec) = config.robot_specs().into_iter().next() else {
        eprintln!("Configuration error: no robots configured");
        return EXIT_CODE_USAGE;
    };
    if let Some(x) = x {
        spec.start.x = x;
    }
    if let Some(y) = y {
        spec.start.y = y;
    }

    let order = match read_file(order_path) {
        Ok(bytes) => bytes,
        Err(code) => return code,
    };
    let mut pending: Vec<(Duration, Vec<u8>)> = Vec::new();
    for (at, path) in instants {
        match read_file(path) {
            Ok(bytes) => pending.push((seconds_to_duration(*at), bytes)),
            Err(code) => return code,
        }
    }
    pending.sort_by_key(|(at, _)| *at);

    let robot_id = spec.robot_id.clone();
    let mut machine = match RobotMachine::new(spec, &config) {
        Ok(machine) => machine,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return EXIT_CODE_USAGE;
        }
    };

    let topic = |channel: Channel| channel.topic(&config.fleet.topic_prefix, &robot_id);
    let dt = config.tick_delta();
    let end = seconds_to_duration(seconds);

    let mut inputs = vec![RobotInput::decode(Channel::Order, &topic(Channel::Order), &order)];
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let last = loop {
        // Instant actions due by the end of this tick join its inputs.
        let tick_end = machine.sim_time() + dt;
        while pending.first().map(|(at, _)| *at <= tick_end).unwrap_or(false) {
            let (_, bytes) = pending.remove(0);
            inputs.push(RobotInput::decode(
                Channel::InstantActions,
                &topic(Channel::InstantActions),
                &bytes,
            ));
        }

        let output = machine.tick(std::mem::take(&mut inputs), dt);
        if trace {
            let written = serde_json::to_string(&output.state)
                .map_err(|e| e.to_string())
                .and_then(|line| writeln!(out, "{}", line).map_err(|e| e.to_string()));
            if let Err(e) = written {
                eprintln!("Error writing state: {}", e);
                return EXIT_CODE_FAILURE;
            }
        }
        if machine.sim_time() >= end {
            break output.state;
        }
    };

    if !trace {
        match serde_json::to_string_pretty(&last) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing state: {}", e);
                return EXIT_CODE_FAILURE;
            }
        }
    }
    0
}

fn run_validate(
    config_path: Option<&Path>,
    overrides: Option<Value>,
    order_path: &Path,
    x: f64,
    y: f64,
) -> i32 {
    let (_, config) = match load_config(config_path, overrides) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let bytes = match read_file(order_path) {
        Ok(bytes) => bytes,
        Err(code) => return code,
    };

    let order = match decode_inbound(Channel::Order, &bytes) {
        Ok(InboundMessage::Order(order)) => order,
        Ok(InboundMessage::InstantActions(_)) => {
            eprintln!("Error: {} is not an order", order_path.display());
            return EXIT_CODE_USAGE;
        }
        Err(e) => {
            let report = json!({ "verdict": "REJECT", "reason": e.to_string() });
            println!("{}", report);
            return EXIT_CODE_FAILURE;
        }
    };

    let machine = match RobotMachine::new(RobotSpec::at("validator", x, y, 0.0), &config) {
        Ok(machine) => machine,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return EXIT_CODE_USAGE;
        }
    };

    let verdict = vda5050_sim::validate(&order, &machine.robot_context());
    let reason = match &verdict {
        vda5050_sim::Verdict::Reject(reason) => Some(reason.to_string()),
        _ => None,
    };
    let report = json!({
        "verdict": verdict.label(),
        "orderId": order.order_id,
        "orderUpdateId": order.order_update_id,
        "reason": reason,
    });
    println!("{}", report);

    if verdict.is_accepted() {
        0
    } else {
        EXIT_CODE_FAILURE
    }
}

fn run_config(config_path: Option<&Path>, overrides: Option<Value>) -> i32 {
    let (effective, _) = match load_config(config_path, overrides) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    match effective.to_json() {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            EXIT_CODE_FAILURE
        }
    }
}
