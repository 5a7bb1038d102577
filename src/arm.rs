use std::time::Duration;

use embedded_io_adapters::std::FromStd;
use log::{info, warn};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::{
    BusError, clamp_position, disable_torque, enable_torque, is_torque_enabled, move_to_position,
    ping_servo, read_model, read_position, read_status, read_temperature, read_voltage, set_torque,
};

pub const JOINT_COUNT: usize = 6;
pub const JOINT_IDS: [u8; JOINT_COUNT] = [1, 2, 3, 4, 5, 6];
pub const JOINT_NAMES: [&str; JOINT_COUNT] = [
    "shoulder_pan",
    "shoulder_lift",
    "elbow_flex",
    "wrist_flex",
    "wrist_roll",
    "gripper",
];

/// All joints centered.
pub const HOME_POSE: [u16; JOINT_COUNT] = [2048; JOINT_COUNT];
/// Folded resting pose, safe to cut power in.
pub const REST_POSE: [u16; JOINT_COUNT] = [2048, 2700, 1500, 1800, 2048, 2048];

pub const DEFAULT_BAUD: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

pub fn open_serial_port(
    port_name: &str,
    baud: u32,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, serialport::Error> {
    let port = serialport::new(port_name, baud)
        .timeout(timeout)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None)
        .flow_control(FlowControl::None)
        .open()?;

    info!("Port opened successfully: {}", port_name);
    Ok(port)
}

/// One six-joint arm on its own serial adapter.
pub struct Arm {
    port: FromStd<Box<dyn SerialPort>>,
    buffer: [u8; 256],
}

impl Arm {
    pub fn open(port_name: &str) -> Result<Self, BusError> {
        Self::open_with_baud(port_name, DEFAULT_BAUD)
    }

    pub fn open_with_baud(port_name: &str, baud: u32) -> Result<Self, BusError> {
        let port = open_serial_port(port_name, baud, DEFAULT_TIMEOUT).map_err(|e| {
            warn!("Failed to open {}: {}", port_name, e);
            BusError::IoError
        })?;
        Ok(Self {
            port: FromStd::new(port),
            buffer: [0u8; 256],
        })
    }

    /// Borrow the port and scratch buffer separately, for the generic
    /// bus helpers.
    pub fn split(&mut self) -> (&mut FromStd<Box<dyn SerialPort>>, &mut [u8]) {
        (&mut self.port, self.buffer.as_mut_slice())
    }

    pub fn ping(&mut self, servo_id: u8) -> Result<(), BusError> {
        ping_servo(&mut self.port, &mut self.buffer, servo_id)
    }

    pub fn read_position(&mut self, servo_id: u8) -> Result<u16, BusError> {
        read_position(&mut self.port, &mut self.buffer, servo_id)
    }

    pub fn read_position_retry(&mut self, servo_id: u8, attempts: usize) -> Result<u16, BusError> {
        let mut last = Err(BusError::NoResponse(servo_id));
        for _ in 0..attempts.max(1) {
            last = self.read_position(servo_id);
            if last.is_ok() {
                return last;
            }
            std::thread::sleep(READ_RETRY_DELAY);
        }
        last
    }

    pub fn read_voltage(&mut self, servo_id: u8) -> Result<u8, BusError> {
        read_voltage(&mut self.port, &mut self.buffer, servo_id)
    }

    pub fn read_temperature(&mut self, servo_id: u8) -> Result<u8, BusError> {
        read_temperature(&mut self.port, &mut self.buffer, servo_id)
    }

    pub fn read_status(&mut self, servo_id: u8) -> Result<u8, BusError> {
        read_status(&mut self.port, &mut self.buffer, servo_id)
    }

    pub fn read_model(&mut self, servo_id: u8) -> Result<u16, BusError> {
        read_model(&mut self.port, &mut self.buffer, servo_id)
    }

    pub fn is_torque_enabled(&mut self, servo_id: u8) -> Result<bool, BusError> {
        is_torque_enabled(&mut self.port, &mut self.buffer, servo_id)
    }

    pub fn set_torque(&mut self, servo_id: u8, enabled: bool) -> Result<(), BusError> {
        set_torque(&mut self.port, &mut self.buffer, servo_id, enabled)
    }

    /// Set torque on every joint, returning how many writes failed.
    pub fn set_torque_all(&mut self, enabled: bool) -> usize {
        let mut failures = 0;
        for id in JOINT_IDS {
            let result = if enabled {
                enable_torque(&mut self.port, &mut self.buffer, id)
            } else {
                disable_torque(&mut self.port, &mut self.buffer, id)
            };
            if let Err(e) = result {
                warn!("Failed to set torque on servo {}: {}", id, e);
                failures += 1;
            }
        }
        failures
    }

    pub fn move_joint(&mut self, servo_id: u8, position: u16) -> Result<(), BusError> {
        let position = clamp_position(position as i32);
        move_to_position(&mut self.port, &mut self.buffer, servo_id, position, None, None)
    }

    /// Read every joint; a joint that does not answer keeps its fallback
    /// value. Returns the positions and the number of failed reads.
    pub fn read_all_positions(
        &mut self,
        fallback: &[u16; JOINT_COUNT],
    ) -> ([u16; JOINT_COUNT], usize) {
        let mut positions = *fallback;
        let mut failures = 0;
        for (index, id) in JOINT_IDS.into_iter().enumerate() {
            match self.read_position(id) {
                Ok(position) => positions[index] = position,
                Err(e) => {
                    warn!("Failed to read servo {}: {}", id, e);
                    failures += 1;
                }
            }
        }
        (positions, failures)
    }

    /// Command every joint of a pose, returning how many writes failed.
    pub fn write_all_goals(&mut self, pose: &[u16; JOINT_COUNT]) -> usize {
        let mut failures = 0;
        for (index, id) in JOINT_IDS.into_iter().enumerate() {
            if let Err(e) = self.move_joint(id, pose[index]) {
                warn!("Failed to command servo {}: {}", id, e);
                failures += 1;
            }
        }
        failures
    }

    pub fn move_home(&mut self) -> usize {
        self.write_all_goals(&HOME_POSE)
    }

    pub fn move_rest(&mut self) -> usize {
        self.write_all_goals(&REST_POSE)
    }
}
