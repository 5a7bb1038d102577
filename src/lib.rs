#![cfg_attr(not(feature = "std"), no_std)]

use embedded_io::{Read, Write};

use crate::comm::{
    CURRENT_REGISTER, LOAD_REGISTER, MODEL_REGISTER, MOVING_REGISTER, POSITION_REGISTER,
    SPEED_REGISTER, STATUS_REGISTER, TEMPERATURE_REGISTER, TORQUE_ENABLE_REGISTER,
    VOLTAGE_REGISTER, Command, send_ping, send_reset, write_goal_position,
};

pub mod comm;
pub mod probe;
pub mod teleop;

#[cfg(feature = "std")]
pub mod arm;
#[cfg(feature = "std")]
pub mod health;
#[cfg(feature = "std")]
pub mod scan;
#[cfg(feature = "ui")]
pub mod ui;

/// One full mechanical revolution in encoder ticks.
pub const FULL_TURN_TICKS: u16 = 4096;
/// Mid-range tick value, the zero-degree pose of every joint.
pub const CENTER_POSITION: u16 = 2048;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Serial port write error")]
    WriteError,
    #[error("No response from servo {0}")]
    NoResponse(u8),
    #[error("Failed to parse servo response")]
    ResponseParseError,
    #[error("Response too short: {0} bytes")]
    ShortResponse(usize),
    #[error("Invalid header bytes: {0:#X}, {1:#X}")]
    InvalidHeader(u8, u8),
    #[error("Queried servo {queried} but servo {answered} answered")]
    IdMismatch { queried: u8, answered: u8 },
    #[error("Checksum mismatch: calculated {0:#X}, received {1:#X}")]
    ChecksumMismatch(u8, u8),
    #[error("Servo returned error status: {0:#04x}")]
    StatusError(u8),
    #[error("Command queue overflow")]
    CommandOverflow,
    #[error("Serial port error")]
    IoError,
}

/// Clamp an arbitrary tick computation back into the valid servo range.
pub fn clamp_position(position: i32) -> u16 {
    position.clamp(0, (FULL_TURN_TICKS - 1) as i32) as u16
}

pub fn read_u8_register<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
    register_id: u8,
) -> Result<u8, BusError> {
    let result = Command::Read(servo_id, register_id, 1).send_command(port, buffer)?;
    result.data_as_u8().ok_or(BusError::ResponseParseError)
}

pub fn read_u16_register<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
    register_id: u8,
) -> Result<u16, BusError> {
    let result = Command::Read(servo_id, register_id, 2).send_command(port, buffer)?;
    result.data_as_u16().ok_or(BusError::ResponseParseError)
}

pub fn write_u8_register<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
    register_id: u8,
    value: u8,
) -> Result<(), BusError> {
    Command::Write(servo_id, register_id, &[value])
        .send_command(port, buffer)
        .and_then(|response| response.ensure_ok())
}

pub fn write_u16_register<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
    register_id: u8,
    value: u16,
) -> Result<(), BusError> {
    Command::Write(servo_id, register_id, &value.to_le_bytes())
        .send_command(port, buffer)
        .and_then(|response| response.ensure_ok())
}

pub fn read_position<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> Result<u16, BusError> {
    read_u16_register(port, buffer, servo_id, POSITION_REGISTER)
}

pub fn read_speed<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> Result<u16, BusError> {
    read_u16_register(port, buffer, servo_id, SPEED_REGISTER)
}

pub fn read_load<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> Result<u16, BusError> {
    read_u16_register(port, buffer, servo_id, LOAD_REGISTER)
}

/// Bus voltage in decivolts, e.g. 74 for a healthy 7.4 V rail.
pub fn read_voltage<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> Result<u8, BusError> {
    read_u8_register(port, buffer, servo_id, VOLTAGE_REGISTER)
}

pub fn read_temperature<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> Result<u8, BusError> {
    read_u8_register(port, buffer, servo_id, TEMPERATURE_REGISTER)
}

pub fn read_current<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> Result<u16, BusError> {
    read_u16_register(port, buffer, servo_id, CURRENT_REGISTER)
}

pub fn read_model<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> Result<u16, BusError> {
    read_u16_register(port, buffer, servo_id, MODEL_REGISTER)
}

pub fn is_moving<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> Result<bool, BusError> {
    read_u8_register(port, buffer, servo_id, MOVING_REGISTER).map(|value| value != 0)
}

/// Raw alarm bitfield from the status register; zero means no fault latched.
pub fn read_status<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> Result<u8, BusError> {
    read_u8_register(port, buffer, servo_id, STATUS_REGISTER)
}

pub fn has_error<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> Result<bool, BusError> {
    read_status(port, buffer, servo_id).map(|value| value != 0)
}

pub fn is_torque_enabled<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> Result<bool, BusError> {
    read_u8_register(port, buffer, servo_id, TORQUE_ENABLE_REGISTER).map(|value| value != 0)
}

pub fn set_torque<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
    enabled: bool,
) -> Result<(), BusError> {
    write_u8_register(
        port,
        buffer,
        servo_id,
        TORQUE_ENABLE_REGISTER,
        if enabled { 0x01 } else { 0x00 },
    )
}

pub fn enable_torque<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> Result<(), BusError> {
    set_torque(port, buffer, servo_id, true)
}

pub fn disable_torque<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> Result<(), BusError> {
    set_torque(port, buffer, servo_id, false)
}

pub fn move_to_position<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
    position: u16,
    time: Option<u16>,
    speed: Option<u16>,
) -> Result<(), BusError> {
    write_goal_position(port, buffer, servo_id, position, time, speed)?.ensure_ok()
}

pub fn ping_servo<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> Result<(), BusError> {
    send_ping(port, buffer, servo_id)?.ensure_ok()
}

/// Factory-reset instruction. Rebooting servos usually swallow the status
/// packet, so a missing reply is not treated as a failure by callers.
pub fn reset_servo<P: Write + Read>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> Result<(), BusError> {
    send_reset(port, buffer, servo_id)?.ensure_ok()
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::comm::checksum;

    /// Loopback port that replays canned status packets, recording every
    /// byte written to it.
    pub struct ScriptedPort {
        replies: heapless::Vec<heapless::Vec<u8, 32>, 16>,
        cursor: usize,
        pub sent: heapless::Vec<u8, 512>,
    }

    impl ScriptedPort {
        pub fn new() -> Self {
            Self {
                replies: heapless::Vec::new(),
                cursor: 0,
                sent: heapless::Vec::new(),
            }
        }

        pub fn push_status_reply(&mut self, id: u8, status: u8, data: &[u8]) {
            let mut reply: heapless::Vec<u8, 32> = heapless::Vec::new();
            reply
                .extend_from_slice(&[0xFF, 0xFF, id, (data.len() + 2) as u8, status])
                .unwrap();
            reply.extend_from_slice(data).unwrap();
            let chk = checksum(&reply[2..]);
            reply.push(chk).unwrap();
            self.replies.push(reply).unwrap();
        }
    }

    impl embedded_io::ErrorType for ScriptedPort {
        type Error = core::convert::Infallible;
    }

    impl embedded_io::Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let Some(reply) = self.replies.get(self.cursor) else {
                return Ok(0);
            };
            self.cursor += 1;
            let len = reply.len().min(buf.len());
            buf[..len].copy_from_slice(&reply[..len]);
            Ok(len)
        }
    }

    impl embedded_io::Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.sent.extend_from_slice(buf).unwrap();
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedPort;

    #[test]
    fn ping_sends_golden_packet() {
        let mut port = ScriptedPort::new();
        port.push_status_reply(6, 0, &[]);
        let mut buffer = [0u8; 64];

        ping_servo(&mut port, &mut buffer, 6).unwrap();
        assert_eq!(&port.sent[..], &[0xFF, 0xFF, 0x06, 0x02, 0x01, 0xF6]);
    }

    #[test]
    fn ping_without_reply_is_no_response() {
        let mut port = ScriptedPort::new();
        let mut buffer = [0u8; 64];

        assert!(matches!(
            ping_servo(&mut port, &mut buffer, 4),
            Err(BusError::NoResponse(4))
        ));
    }

    #[test]
    fn read_position_decodes_little_endian() {
        let mut port = ScriptedPort::new();
        port.push_status_reply(3, 0, &2048u16.to_le_bytes());
        let mut buffer = [0u8; 64];

        assert_eq!(read_position(&mut port, &mut buffer, 3).unwrap(), 2048);
    }

    #[test]
    fn torque_write_targets_enable_register() {
        let mut port = ScriptedPort::new();
        port.push_status_reply(2, 0, &[]);
        let mut buffer = [0u8; 64];

        enable_torque(&mut port, &mut buffer, 2).unwrap();
        // FF FF id len inst addr value chk
        assert_eq!(port.sent[5], comm::TORQUE_ENABLE_REGISTER);
        assert_eq!(port.sent[6], 0x01);
    }

    #[test]
    fn clamping_stays_in_tick_range() {
        assert_eq!(clamp_position(-10), 0);
        assert_eq!(clamp_position(2048), 2048);
        assert_eq!(clamp_position(9000), 4095);
    }
}
