//! Fleet supervisor
//!
//! Owns the mapping from robot id to the thread running that robot. Each
//! robot has its own state machine, inbox and transport; the supervisor only
//! holds inbox senders and join handles, so it never touches robot state.
//! A robot whose thread panics is reported when stopped and leaves the
//! others running.

mod runner;

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use tracing::{error, info};
use vda_protocol::{AgvError, Channel};

use crate::config::{ConfigError, RobotSpec, SimConfig};
use crate::robot::{InboxMessage, RobotMachine};
use crate::transport::Transport;
use runner::RobotRunner;

/// Fleet errors
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("Unknown robot: {0}")]
    UnknownRobot(String),

    #[error("Robot already running: {0}")]
    AlreadyRunning(String),

    #[error("Inbox of robot {0} is closed")]
    InboxClosed(String),

    #[error("Channel {0} is not inbound")]
    NotInbound(Channel),

    #[error("Failed to spawn robot thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// How a robot thread ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotExit {
    Stopped,
    Panicked,
}

struct RobotHandle {
    inbox: Sender<InboxMessage>,
    thread: JoinHandle<()>,
}

/// Enqueues inbound payloads onto robot inboxes.
///
/// Cloneable and `Send`, so reader threads can route messages without
/// holding the supervisor.
#[derive(Debug, Clone, Default)]
pub struct FleetRouter {
    inboxes: BTreeMap<String, Sender<InboxMessage>>,
}

impl FleetRouter {
    /// Queue `payload` for `robot`; it is decoded at the robot's next tick.
    pub fn deliver(&self, robot: &str, channel: Channel, payload: Vec<u8>) -> Result<(), FleetError> {
        if !channel.is_inbound() {
            return Err(FleetError::NotInbound(channel));
        }
        send(&self.inboxes, robot, InboxMessage::Deliver { channel, payload })
    }

    pub fn robot_ids(&self) -> Vec<String> {
        self.inboxes.keys().cloned().collect()
    }
}

/// Supervisor of all running robots
pub struct FleetSupervisor {
    config: SimConfig,
    robots: BTreeMap<String, RobotHandle>,
}

impl FleetSupervisor {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            robots: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Spawn a thread running the robot described by `spec`.
    pub fn start_robot(&mut self, spec: RobotSpec, transport: Box<dyn Transport>) -> Result<(), FleetError> {
        let robot_id = spec.robot_id.clone();
        if self.robots.contains_key(&robot_id) {
            return Err(FleetError::AlreadyRunning(robot_id));
        }

        let machine = RobotMachine::new(spec, &self.config)?;
        let (inbox, receiver) = mpsc::channel();
        let runner = RobotRunner::new(
            machine,
            receiver,
            transport,
            self.config.timeouts().tick_period(),
            self.config.tick_delta(),
            self.config.fleet.topic_prefix.clone(),
        );

        let thread = thread::Builder::new()
            .name(format!("robot-{}", robot_id))
            .spawn(move || runner.run())?;

        self.robots.insert(robot_id, RobotHandle { inbox, thread });
        Ok(())
    }

    /// Start every configured robot, each with the transport `make` returns.
    pub fn start_all<F>(&mut self, mut make: F) -> Result<(), FleetError>
    where
        F: FnMut(&RobotSpec) -> Box<dyn Transport>,
    {
        for spec in self.config.robot_specs() {
            let transport = make(&spec);
            self.start_robot(spec, transport)?;
        }
        Ok(())
    }

    /// Queue an inbound payload for `robot`.
    pub fn deliver(&self, robot: &str, channel: Channel, payload: Vec<u8>) -> Result<(), FleetError> {
        self.router().deliver(robot, channel, payload)
    }

    /// Raise `error` on `robot` at its next tick.
    pub fn force_error(&self, robot: &str, error: AgvError) -> Result<(), FleetError> {
        let handle = self
            .robots
            .get(robot)
            .ok_or_else(|| FleetError::UnknownRobot(robot.to_string()))?;
        handle
            .inbox
            .send(InboxMessage::ForceError(error))
            .map_err(|_| FleetError::InboxClosed(robot.to_string()))
    }

    /// Router over the robots running now.
    pub fn router(&self) -> FleetRouter {
        FleetRouter {
            inboxes: self
                .robots
                .iter()
                .map(|(id, handle)| (id.clone(), handle.inbox.clone()))
                .collect(),
        }
    }

    pub fn robot_ids(&self) -> Vec<String> {
        self.robots.keys().cloned().collect()
    }

    pub fn is_running(&self, robot: &str) -> bool {
        self.robots
            .get(robot)
            .map(|handle| !handle.thread.is_finished())
            .unwrap_or(false)
    }

    /// Stop one robot and wait for its thread.
    pub fn stop_robot(&mut self, robot: &str) -> Result<RobotExit, FleetError> {
        let handle = self
            .robots
            .remove(robot)
            .ok_or_else(|| FleetError::UnknownRobot(robot.to_string()))?;
        Ok(join(robot, handle))
    }

    /// Stop every robot; returns how each one ended.
    pub fn stop_all(&mut self) -> BTreeMap<String, RobotExit> {
        let robots = std::mem::take(&mut self.robots);
        robots
            .into_iter()
            .map(|(id, handle)| {
                let exit = join(&id, handle);
                (id, exit)
            })
            .collect()
    }
}

impl Drop for FleetSupervisor {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn send(
    inboxes: &BTreeMap<String, Sender<InboxMessage>>,
    robot: &str,
    message: InboxMessage,
) -> Result<(), FleetError> {
    let inbox = inboxes
        .get(robot)
        .ok_or_else(|| FleetError::UnknownRobot(robot.to_string()))?;
    inbox
        .send(message)
        .map_err(|_| FleetError::InboxClosed(robot.to_string()))
}

fn join(robot: &str, handle: RobotHandle) -> RobotExit {
    // A dead thread has already dropped its receiver.
    let _ = handle.inbox.send(InboxMessage::Shutdown);
    match handle.thread.join() {
        Ok(()) => {
            info!(robot = %robot, "robot joined");
            RobotExit::Stopped
        }
        Err(_) => {
            error!(robot = %robot, "robot thread panicked");
            RobotExit::Panicked
        }
    }
}
