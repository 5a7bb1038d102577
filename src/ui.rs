use embedded_io::{Read, Write};
use log::info;
use ratatui::{prelude::*, widgets::*};

use crate::comm::write_goal_position;
use crate::health::{JointSnapshot, snapshot_joint};
use crate::{BusError, FULL_TURN_TICKS};

#[derive(Default, Debug, Clone, Copy)]
pub struct GoalCommand {
    pub id: u8,
    pub position: u16,
    pub time: Option<u16>,
    pub speed: Option<u16>,
}

#[derive(Debug)]
pub struct MonitorState<const N: usize> {
    pub infos: [JointSnapshot; N],
    pub servo_ids: [u8; N],
    pub names: [&'static str; N],
    pub selected_index: usize,
    pub queued_commands: heapless::Vec<GoalCommand, 16>,
}

impl<const N: usize> MonitorState<N> {
    pub fn new(servo_ids: &[u8; N], names: &[&'static str; N]) -> Self {
        Self {
            servo_ids: *servo_ids,
            names: *names,
            infos: [JointSnapshot::default(); N],
            selected_index: 0,
            queued_commands: heapless::Vec::new(),
        }
    }

    pub fn update<P: Read + Write>(&mut self, port: &mut P, buffer: &mut [u8]) {
        for (index, &id) in self.servo_ids.iter().enumerate() {
            self.infos[index] = snapshot_joint(port, buffer, id);
        }
    }

    pub fn select_next(&mut self) {
        if self.selected_index < N.saturating_sub(1) {
            self.selected_index += 1;
        }
    }

    pub fn select_previous(&mut self) {
        if self.selected_index > 0 {
            self.selected_index -= 1;
        }
    }

    pub fn selected_servo_id(&self) -> u8 {
        self.servo_ids[self.selected_index]
    }

    /// Queue a relative jog of the selected joint; wraps at a full turn.
    pub fn jog(&mut self, delta: i16) -> Result<(), BusError> {
        let id = self.selected_servo_id();
        let index = self.selected_index;
        let new_position = self.infos[index].goal_position as i32 + delta as i32;
        self.infos[index].goal_position =
            new_position.rem_euclid(FULL_TURN_TICKS as i32) as u16;
        info!(
            "Queued position command for servo {}: new_position={}",
            id, self.infos[index].goal_position
        );
        self.queued_commands
            .push(GoalCommand {
                id,
                position: self.infos[index].goal_position,
                time: None,
                speed: None,
            })
            .map_err(|_| BusError::CommandOverflow)
    }

    pub fn process_queued_commands<P: Read + Write>(
        &mut self,
        port: &mut P,
        buffer: &mut [u8],
    ) -> Result<(), BusError> {
        if let Some(command) = self.queued_commands.pop() {
            write_goal_position(
                port,
                buffer,
                command.id,
                command.position,
                command.time,
                command.speed,
            )?
            .ensure_ok()?;
            info!(
                "Sent position command to servo {}: position={}",
                command.id, command.position
            );
        }
        Ok(())
    }
}

pub fn render<const N: usize>(f: &mut Frame, state: &MonitorState<N>) {
    let area = f.area();

    let header = Row::new(vec![
        Cell::from("ID"),
        Cell::from("Joint"),
        Cell::from("Position"),
        Cell::from("Goal"),
        Cell::from("Speed"),
        Cell::from("Temp (°C)"),
        Cell::from("Load"),
        Cell::from("Voltage"),
        Cell::from("Current"),
        Cell::from("Moving"),
        Cell::from("Error"),
    ])
    .style(Style::default().fg(Color::Yellow).bold());

    let rows: Vec<Row> = state
        .infos
        .iter()
        .enumerate()
        .map(|(index, info)| {
            let is_selected = index == state.selected_index;
            let row = Row::new(vec![
                Cell::from(info.id.to_string()),
                Cell::from(state.names[index]),
                Cell::from(info.position.to_string()),
                Cell::from(info.goal_position.to_string()),
                Cell::from(info.speed.to_string()),
                Cell::from(info.temperature.to_string()),
                Cell::from(info.load.to_string()),
                Cell::from(format!("{:.1}V", info.voltage as f32 / 10.0)),
                Cell::from(info.current.to_string()),
                Cell::from(if info.is_moving { "Yes" } else { "No" }).style(if info.is_moving {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::Gray)
                }),
                Cell::from(if info.has_error { "Yes" } else { "No" }).style(if info.has_error {
                    Style::default().fg(Color::Red)
                } else {
                    Style::default().fg(Color::Green)
                }),
            ]);

            if is_selected {
                row.style(Style::default().bg(Color::DarkGray).fg(Color::White))
            } else {
                row
            }
        })
        .collect();

    let table = Table::new(
        rows,
        vec![
            Constraint::Length(4),  // ID
            Constraint::Length(14), // Joint
            Constraint::Length(10), // Position
            Constraint::Length(8),  // Goal
            Constraint::Length(8),  // Speed
            Constraint::Length(12), // Temperature
            Constraint::Length(8),  // Load
            Constraint::Length(10), // Voltage
            Constraint::Length(10), // Current
            Constraint::Length(8),  // Moving
            Constraint::Length(8),  // Error
        ],
    )
    .header(header)
    .block(
        Block::default()
            .title("Joint Status Monitor (↑↓: Select, ←→: Jog, q: Quit)")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    )
    .style(Style::default().fg(Color::White));

    f.render_widget(table, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::{JOINT_IDS, JOINT_NAMES};

    #[test]
    fn jog_wraps_at_a_full_turn() {
        let mut state: MonitorState<6> = MonitorState::new(&JOINT_IDS, &JOINT_NAMES);
        state.infos[0].goal_position = 100;

        state.jog(-90).unwrap();
        assert_eq!(state.infos[0].goal_position, 10);
        state.jog(-20).unwrap();
        assert_eq!(state.infos[0].goal_position, 4086);
        state.jog(20).unwrap();
        assert_eq!(state.infos[0].goal_position, 10);
    }

    #[test]
    fn jog_targets_the_selected_joint() {
        let mut state: MonitorState<6> = MonitorState::new(&JOINT_IDS, &JOINT_NAMES);
        state.select_next();
        state.jog(40).unwrap();

        let queued = state.queued_commands[0];
        assert_eq!(queued.id, JOINT_IDS[1]);
        assert_eq!(queued.position, 40);
    }
}
