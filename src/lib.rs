//! VDA5050 AGV fleet simulator
//!
//! Simulates a fleet of automated guided vehicles speaking the VDA5050
//! protocol: each robot accepts orders and instant actions, drives its
//! order graph in simulated time, runs actions, drains its battery and
//! reports state and visualization snapshots every tick.
//!
//! Wire types live in the `vda-protocol` crate; this crate holds the
//! simulation core and the fleet runtime around it.

pub mod action;
pub mod config;
pub mod fleet;
pub mod health;
pub mod motion;
pub mod order;
pub mod robot;
pub mod schedule;
pub mod signal;
pub mod timeout;
pub mod transport;

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use config::{EffectiveConfig, RobotSpec, SimConfig};
pub use fleet::{FleetError, FleetRouter, FleetSupervisor, RobotExit};
pub use order::{validate, RejectReason, Verdict};
pub use robot::{Phase, RobotInput, RobotMachine, TickOutput};
pub use transport::{JsonLinesTransport, MemoryTransport, Transport, TransportError};

static INIT: Once = Once::new();

/// Install the global tracing subscriber.
///
/// Logs go to stderr so stdout stays machine-readable. `RUST_LOG` overrides
/// the default `info` filter. Subsequent calls are no-ops.
pub fn init_tracing() {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init();
    });
}
