// The troubleshooting history of these arms is full of control-table guesses:
// torque enable was poked at both 0x28 and 0x32, goal position at both 0x2A
// and 0x3C. This module reads the candidates back and reports which ones
// behave like the register they are supposed to be.

use embedded_io::{Read, Write};

use crate::{BusError, FULL_TURN_TICKS, read_position, read_u8_register, read_u16_register};

pub const TORQUE_CANDIDATES: [u8; 2] = [0x28, 0x32];
pub const GOAL_CANDIDATES: [u8; 2] = [0x2A, 0x3C];

/// A holding servo keeps its goal within this many ticks of its present
/// position; anything further off is some other register.
const GOAL_AGREEMENT_TICKS: u16 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterGuess {
    pub address: u8,
    pub value: u16,
}

#[derive(Debug)]
pub struct ProbeReport {
    pub servo_id: u8,
    pub present_position: u16,
    pub torque_candidates: heapless::Vec<RegisterGuess, 4>,
    pub goal_candidates: heapless::Vec<RegisterGuess, 4>,
}

impl ProbeReport {
    pub fn best_torque_address(&self) -> Option<u8> {
        self.torque_candidates.first().map(|guess| guess.address)
    }

    pub fn best_goal_address(&self) -> Option<u8> {
        self.goal_candidates.first().map(|guess| guess.address)
    }
}

/// A torque-enable register only ever holds 0 or 1.
pub fn probe_torque_register<P: Read + Write>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> heapless::Vec<RegisterGuess, 4> {
    let mut plausible = heapless::Vec::new();
    for address in TORQUE_CANDIDATES {
        if let Ok(value) = read_u8_register(port, buffer, servo_id, address) {
            if value <= 1 {
                let _ = plausible.push(RegisterGuess {
                    address,
                    value: value as u16,
                });
            }
        }
    }
    plausible
}

/// A goal-position register holds a tick value close to where the joint
/// actually is while the joint is at rest.
pub fn probe_goal_register<P: Read + Write>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
    present_position: u16,
) -> heapless::Vec<RegisterGuess, 4> {
    let mut plausible = heapless::Vec::new();
    for address in GOAL_CANDIDATES {
        if let Ok(value) = read_u16_register(port, buffer, servo_id, address) {
            if value < FULL_TURN_TICKS && present_position.abs_diff(value) <= GOAL_AGREEMENT_TICKS {
                let _ = plausible.push(RegisterGuess { address, value });
            }
        }
    }
    plausible
}

pub fn probe_servo<P: Read + Write>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> Result<ProbeReport, BusError> {
    let present_position = read_position(port, buffer, servo_id)?;
    let torque_candidates = probe_torque_register(port, buffer, servo_id);
    let goal_candidates = probe_goal_register(port, buffer, servo_id, present_position);
    Ok(ProbeReport {
        servo_id,
        present_position,
        torque_candidates,
        goal_candidates,
    })
}
