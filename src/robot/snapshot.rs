//! State and visualization snapshots

use vda_protocol::{
    AgvPosition, BatteryState, Channel, EdgeState, Header, NodeState, SafetyState, State,
    Velocity, Visualization,
};

use super::machine::RobotMachine;

/// Per-channel `headerId` counters; the first message on a channel is 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderCounters {
    state: u32,
    visualization: u32,
}

impl HeaderCounters {
    /// Next header id for an outbound channel.
    pub fn next(&mut self, channel: Channel) -> u32 {
        let counter = match channel {
            Channel::Visualization => &mut self.visualization,
            _ => &mut self.state,
        };
        *counter = counter.wrapping_add(1);
        *counter
    }
}

impl RobotMachine {
    fn header(&mut self, channel: Channel) -> Header {
        Header::new(
            self.headers.next(channel),
            self.version.as_str(),
            self.manufacturer.as_str(),
            self.spec.serial_number.as_str(),
        )
    }

    fn agv_position(&self) -> AgvPosition {
        AgvPosition {
            x: self.pose.x,
            y: self.pose.y,
            theta: self.pose.theta,
            map_id: self.map_id.clone(),
            position_initialized: self.position_initialized,
        }
    }

    fn velocity(&self) -> Velocity {
        Velocity {
            vx: self.speed,
            vy: 0.0,
            omega: 0.0,
        }
    }

    pub(super) fn state_snapshot(&mut self) -> State {
        let header = self.header(Channel::State);
        let last = self.last_node_sequence_id;

        let (order_id, order_update_id, zone_set_id, node_states, edge_states) = match &self.order {
            Some(order) => (
                order.order_id.clone(),
                order.order_update_id,
                order.zone_set_id.clone(),
                order
                    .remaining_nodes(last)
                    .map(|n| NodeState {
                        node_id: n.node_id.clone(),
                        sequence_id: n.sequence_id,
                        released: n.released,
                        node_description: n.node_description.clone(),
                        node_position: n.node_position.clone(),
                    })
                    .collect(),
                order
                    .remaining_edges(last)
                    .map(|e| EdgeState {
                        edge_id: e.edge_id.clone(),
                        sequence_id: e.sequence_id,
                        released: e.released,
                        edge_description: e.edge_description.clone(),
                    })
                    .collect(),
            ),
            None => (String::new(), 0, None, Vec::new(), Vec::new()),
        };

        let fatal = self.health.has_fatal();
        State {
            header,
            order_id,
            order_update_id,
            zone_set_id,
            last_node_id: self.last_node_id.clone(),
            last_node_sequence_id: last,
            node_states,
            edge_states,
            agv_position: Some(self.agv_position()),
            velocity: Some(self.velocity()),
            loads: self.loads.clone(),
            driving: self.driving,
            paused: self.paused,
            new_base_request: self.new_base_request,
            distance_since_last_node: Some(self.distance_since_last_node),
            action_states: self.executor.action_states(),
            battery_state: BatteryState {
                battery_charge: self.health.battery().charge(),
                charging: self.health.battery().is_charging(),
                reach: None,
            },
            operating_mode: self.operating_mode,
            errors: self.health.errors().errors().to_vec(),
            information: Vec::new(),
            safety_state: SafetyState {
                e_stop: "NONE".to_string(),
                field_violation: false,
            },
            execution_state: self.phase.execution_state(self.paused, fatal),
        }
    }

    pub(super) fn visualization_snapshot(&mut self) -> Visualization {
        Visualization {
            header: self.header(Channel::Visualization),
            agv_position: Some(self.agv_position()),
            velocity: Some(self.velocity()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_independent_per_channel() {
        let mut counters = HeaderCounters::default();
        assert_eq!(counters.next(Channel::State), 1);
        assert_eq!(counters.next(Channel::State), 2);
        assert_eq!(counters.next(Channel::Visualization), 1);
        assert_eq!(counters.next(Channel::State), 3);
    }
}
