//! Tick loop of one robot thread

use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use vda_protocol::Channel;

use crate::robot::{InboxMessage, RobotInput, RobotMachine};
use crate::schedule::TickScheduler;
use crate::transport::{publish_json, Transport};

/// Why an inbox drain ended the loop
enum Drain {
    Continue(Vec<RobotInput>),
    Stop,
}

pub(super) struct RobotRunner {
    machine: RobotMachine,
    inbox: Receiver<InboxMessage>,
    transport: Box<dyn Transport>,
    scheduler: TickScheduler,
    dt: Duration,
    topic_prefix: String,
}

impl RobotRunner {
    pub(super) fn new(
        machine: RobotMachine,
        inbox: Receiver<InboxMessage>,
        transport: Box<dyn Transport>,
        period: Duration,
        dt: Duration,
        topic_prefix: String,
    ) -> Self {
        Self {
            machine,
            inbox,
            transport,
            scheduler: TickScheduler::new(period, Instant::now()),
            dt,
            topic_prefix,
        }
    }

    /// Tick until shutdown is requested or the inbox sender is gone.
    pub(super) fn run(mut self) {
        let robot = self.machine.robot_id().to_string();
        info!(robot = %robot, period_ms = self.scheduler.period().as_millis() as u64, "robot started");

        loop {
            self.scheduler.wait(&robot);

            let inputs = match self.drain() {
                Drain::Continue(inputs) => inputs,
                Drain::Stop => break,
            };

            let output = self.machine.tick(inputs, self.dt);
            self.publish(Channel::State, &output.state);
            self.publish(Channel::Visualization, &output.visualization);
        }

        info!(
            robot = %robot,
            ticks = self.scheduler.ticks(),
            late_ticks = self.scheduler.late_ticks(),
            "robot stopped"
        );
    }

    /// Take everything queued since the previous tick.
    fn drain(&mut self) -> Drain {
        let mut inputs = Vec::new();
        loop {
            match self.inbox.try_recv() {
                Ok(InboxMessage::Deliver { channel, payload }) => {
                    let topic = self.topic(channel);
                    inputs.push(RobotInput::decode(channel, &topic, &payload));
                }
                Ok(InboxMessage::ForceError(error)) => inputs.push(RobotInput::ForceError(error)),
                Ok(InboxMessage::Shutdown) => return Drain::Stop,
                Err(TryRecvError::Empty) => return Drain::Continue(inputs),
                Err(TryRecvError::Disconnected) => {
                    debug!(robot = %self.machine.robot_id(), "inbox closed");
                    return Drain::Stop;
                }
            }
        }
    }

    fn topic(&self, channel: Channel) -> String {
        channel.topic(&self.topic_prefix, self.machine.robot_id())
    }

    fn publish<T: serde::Serialize>(&mut self, channel: Channel, message: &T) {
        let topic = self.topic(channel);
        if let Err(e) = publish_json(self.transport.as_mut(), channel, &topic, message) {
            warn!(robot = %self.machine.robot_id(), %topic, error = %e, "publish failed");
        }
    }
}
