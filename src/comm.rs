// Feetech SCS half-duplex packet protocol: ping / read / write / reset
// with the STS3215 register map.

use embedded_io::{Read, Write};

use log::debug;

use crate::BusError;

const PING_ID: u8 = 0x01;
const READ_DATA_ID: u8 = 0x02;
const WRITE_DATA_ID: u8 = 0x03;
const RESET_ID: u8 = 0x06;

pub const BROADCAST_ID: u8 = 0xFE;
pub const MAX_SERVO_ID: u8 = 0xFC;

// EEPROM registers
pub const MODEL_REGISTER: u8 = 0x03;
pub const ID_REGISTER: u8 = 0x05;
pub const BAUD_RATE_REGISTER: u8 = 0x06;
pub const MIN_ANGLE_LIMIT_REGISTER: u8 = 0x09;
pub const MAX_ANGLE_LIMIT_REGISTER: u8 = 0x0B;

// SRAM registers
pub const TORQUE_ENABLE_REGISTER: u8 = 0x28;
pub const ACCELERATION_REGISTER: u8 = 0x29;
pub const GOAL_POSITION_REGISTER: u8 = 0x2A;
pub const GOAL_TIME_REGISTER: u8 = 0x2C;
pub const GOAL_SPEED_REGISTER: u8 = 0x2E;
pub const LOCK_REGISTER: u8 = 0x37;
pub const POSITION_REGISTER: u8 = 0x38;
pub const SPEED_REGISTER: u8 = 0x3A;
pub const LOAD_REGISTER: u8 = 0x3C;
pub const VOLTAGE_REGISTER: u8 = 0x3E;
pub const TEMPERATURE_REGISTER: u8 = 0x3F;
pub const STATUS_REGISTER: u8 = 0x41;
pub const MOVING_REGISTER: u8 = 0x42;
pub const CURRENT_REGISTER: u8 = 0x45;

// Alarm bits in the status register
pub const ALARM_VOLTAGE: u8 = 1 << 0;
pub const ALARM_ANGLE: u8 = 1 << 1;
pub const ALARM_OVERHEAT: u8 = 1 << 2;
pub const ALARM_OVERCURRENT: u8 = 1 << 3;
pub const ALARM_OVERLOAD: u8 = 1 << 5;

/// Shortest possible status packet: header, id, length, status, checksum.
pub const MIN_RESPONSE_LEN: usize = 6;

pub enum Command<'a> {
    Ping(u8),
    Read(u8, u8, u8),
    Write(u8, u8, &'a [u8]),
    Reset(u8),
}

impl<'cmd> Command<'cmd> {
    pub fn servo_id(&self) -> u8 {
        match self {
            Command::Ping(id)
            | Command::Read(id, _, _)
            | Command::Write(id, _, _)
            | Command::Reset(id) => *id,
        }
    }

    pub fn write_buffer(&self, buffer: &mut [u8]) -> usize {
        buffer[0] = 0xff;
        buffer[1] = 0xff;
        let checksum_index = match self {
            Command::Ping(servo_id) => {
                buffer[2] = *servo_id;
                buffer[3] = 0x02;
                buffer[4] = PING_ID;
                5
            }
            Command::Reset(servo_id) => {
                buffer[2] = *servo_id;
                buffer[3] = 0x02;
                buffer[4] = RESET_ID;
                5
            }
            Command::Read(servo_id, addr, reply_length) => {
                buffer[2] = *servo_id;
                buffer[3] = 0x04;
                buffer[4] = READ_DATA_ID;
                buffer[5] = *addr;
                buffer[6] = *reply_length;
                7
            }
            Command::Write(servo_id, addr, data) => {
                buffer[2] = *servo_id;
                buffer[3] = (3 + data.len()) as u8; // length = instruction + addr + data
                buffer[4] = WRITE_DATA_ID;
                buffer[5] = *addr;
                for (i, &byte) in data.iter().enumerate() {
                    buffer[6 + i] = byte;
                }
                6 + data.len()
            }
        };
        buffer[checksum_index] = checksum(&buffer[2..checksum_index]);
        checksum_index + 1
    }

    pub fn send_command<'a, P: Write + Read>(
        &self,
        port: &mut P,
        buffer: &'a mut [u8],
    ) -> Result<CommandResponse<'a>, BusError> {
        let index = self.write_buffer(buffer);
        port.write_all(&buffer[..index])
            .map_err(|_| BusError::WriteError)?;
        debug!("Command buffer: {:02x?}", &buffer[..index]);
        let read_count = port
            .read(buffer)
            .map_err(|_| BusError::NoResponse(self.servo_id()))?;
        debug!("Response buffer: {:02x?}", &buffer[..read_count]);
        if read_count == 0 {
            return Err(BusError::NoResponse(self.servo_id()));
        }
        CommandResponse::parse(&buffer[..read_count], self.servo_id())
    }
}

/// Inverted mod-256 sum over id, length, instruction/status and parameters.
pub fn checksum(payload: &[u8]) -> u8 {
    let mut counter = 0_u8;
    for &value in payload {
        counter = counter.wrapping_add(value);
    }
    !counter
}

#[derive(Debug)]
pub struct CommandResponse<'a> {
    id: u8,
    status: u8,
    data: &'a [u8],
}

impl<'a> CommandResponse<'a> {
    pub fn parse(buffer: &'a [u8], expected_id: u8) -> Result<CommandResponse<'a>, BusError> {
        if buffer.len() < MIN_RESPONSE_LEN {
            return Err(BusError::ShortResponse(buffer.len()));
        }
        if buffer[0] != 0xFF || buffer[1] != 0xFF {
            return Err(BusError::InvalidHeader(buffer[0], buffer[1]));
        }

        let id = buffer[2];
        if id != expected_id {
            return Err(BusError::IdMismatch {
                queried: expected_id,
                answered: id,
            });
        }

        // length counts status byte, parameters and checksum
        let length = buffer[3] as usize;
        if length < 2 || buffer.len() < 4 + length {
            return Err(BusError::ShortResponse(buffer.len()));
        }
        let status = buffer[4];
        let received = buffer[3 + length];
        let calculated = checksum(&buffer[2..3 + length]);
        if calculated != received {
            return Err(BusError::ChecksumMismatch(calculated, received));
        }

        let data = &buffer[5..3 + length];
        Ok(Self { id, status, data })
    }

    pub fn servo_id(&self) -> u8 {
        self.id
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == 0
    }

    pub fn ensure_ok(&self) -> Result<(), BusError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(BusError::StatusError(self.status))
        }
    }

    pub fn data(&self) -> &[u8] {
        self.data
    }

    pub fn data_as_u8(&self) -> Option<u8> {
        self.data.first().copied()
    }

    pub fn data_as_u16(&self) -> Option<u16> {
        if self.data.len() >= 2 {
            Some(u16::from_le_bytes(self.data[0..2].try_into().ok()?))
        } else {
            None
        }
    }
}

pub fn send_ping<'a, P: Write + Read>(
    port: &mut P,
    buffer: &'a mut [u8],
    servo_id: u8,
) -> Result<CommandResponse<'a>, BusError> {
    Command::Ping(servo_id).send_command(port, buffer)
}

pub fn send_reset<'a, P: Write + Read>(
    port: &mut P,
    buffer: &'a mut [u8],
    servo_id: u8,
) -> Result<CommandResponse<'a>, BusError> {
    Command::Reset(servo_id).send_command(port, buffer)
}

/// Write a goal position, optionally with travel time and speed which sit in
/// the registers directly after the goal. A speed without a time still has to
/// carry the time field, zeroed.
pub fn write_goal_position<'a, P: Write + Read>(
    port: &mut P,
    buffer: &'a mut [u8],
    servo_id: u8,
    position: u16,
    time: Option<u16>,
    speed: Option<u16>,
) -> Result<CommandResponse<'a>, BusError> {
    let mut data = [0u8; 6];
    let mut len = 2;
    data[0..2].copy_from_slice(&position.to_le_bytes());

    if time.is_some() || speed.is_some() {
        data[2..4].copy_from_slice(&time.unwrap_or(0).to_le_bytes());
        len = 4;
    }
    if let Some(s) = speed {
        data[4..6].copy_from_slice(&s.to_le_bytes());
        len = 6;
    }

    debug!("Goal for servo {}: {:02x?}", servo_id, &data[..len]);
    Command::Write(servo_id, GOAL_POSITION_REGISTER, &data[..len]).send_command(port, buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_packet_layout() {
        let mut buffer = [0u8; 16];
        let len = Command::Ping(6).write_buffer(&mut buffer);
        assert_eq!(&buffer[..len], &[0xFF, 0xFF, 0x06, 0x02, 0x01, 0xF6]);
    }

    #[test]
    fn checksum_closes_packet_to_0xff() {
        let mut buffer = [0u8; 32];
        let commands = [
            Command::Ping(1),
            Command::Reset(7),
            Command::Read(3, POSITION_REGISTER, 2),
            Command::Write(6, GOAL_POSITION_REGISTER, &[0x00, 0x08, 0xE8, 0x03]),
        ];
        for cmd in commands {
            let len = cmd.write_buffer(&mut buffer);
            let sum = buffer[2..len].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
            assert_eq!(sum, 0xFF);
        }
    }

    #[test]
    fn write_packet_layout() {
        // Goal 2048 with time 0 and speed 1000 on servo 1.
        let mut data = [0u8; 6];
        data[0..2].copy_from_slice(&2048u16.to_le_bytes());
        data[2..4].copy_from_slice(&0u16.to_le_bytes());
        data[4..6].copy_from_slice(&1000u16.to_le_bytes());

        let mut buffer = [0u8; 32];
        let len = Command::Write(1, GOAL_POSITION_REGISTER, &data).write_buffer(&mut buffer);

        assert_eq!(len, 13);
        assert_eq!(buffer[0], 0xFF);
        assert_eq!(buffer[1], 0xFF);
        assert_eq!(buffer[2], 1);
        assert_eq!(buffer[3], 9); // instruction + addr + 6 data bytes
        assert_eq!(buffer[4], WRITE_DATA_ID);
        assert_eq!(buffer[5], GOAL_POSITION_REGISTER);
        assert_eq!(&buffer[6..8], &[0x00, 0x08]);
        assert_eq!(&buffer[8..10], &[0x00, 0x00]);
        assert_eq!(&buffer[10..12], &[0xE8, 0x03]);
        assert_eq!(buffer[12], checksum(&buffer[2..12]));
    }

    #[test]
    fn read_packet_layout() {
        let mut buffer = [0u8; 16];
        let len = Command::Read(3, POSITION_REGISTER, 2).write_buffer(&mut buffer);
        assert_eq!(
            &buffer[..len],
            &[0xFF, 0xFF, 0x03, 0x04, 0x02, 0x38, 0x02, 0xBC]
        );
    }

    fn status_reply(id: u8, status: u8, data: &[u8]) -> heapless::Vec<u8, 32> {
        let mut reply: heapless::Vec<u8, 32> = heapless::Vec::new();
        reply
            .extend_from_slice(&[0xFF, 0xFF, id, (data.len() + 2) as u8, status])
            .unwrap();
        reply.extend_from_slice(data).unwrap();
        let chk = checksum(&reply[2..]);
        reply.push(chk).unwrap();
        reply
    }

    #[test]
    fn parse_recovers_fields() {
        let reply = status_reply(3, 0, &[0x00, 0x08]);
        let response = CommandResponse::parse(&reply, 3).unwrap();
        assert_eq!(response.servo_id(), 3);
        assert!(response.is_ok());
        assert_eq!(response.data(), &[0x00, 0x08]);
        assert_eq!(response.data_as_u16(), Some(2048));
    }

    #[test]
    fn parse_surfaces_servo_status() {
        let reply = status_reply(2, ALARM_OVERLOAD, &[]);
        let response = CommandResponse::parse(&reply, 2).unwrap();
        assert!(!response.is_ok());
        assert!(matches!(
            response.ensure_ok(),
            Err(BusError::StatusError(s)) if s == ALARM_OVERLOAD
        ));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            CommandResponse::parse(&[0xFF, 0xFF, 1, 2], 1),
            Err(BusError::ShortResponse(4))
        ));
        assert!(matches!(
            CommandResponse::parse(&[0x00, 0xFF, 1, 2, 0, 0xFC], 1),
            Err(BusError::InvalidHeader(0x00, 0xFF))
        ));

        let reply = status_reply(5, 0, &[]);
        assert!(matches!(
            CommandResponse::parse(&reply, 4),
            Err(BusError::IdMismatch {
                queried: 4,
                answered: 5
            })
        ));

        let mut corrupted = status_reply(5, 0, &[0x10]);
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xA5;
        assert!(matches!(
            CommandResponse::parse(&corrupted, 5),
            Err(BusError::ChecksumMismatch(_, _))
        ));
    }

    #[test]
    fn parse_rejects_truncated_length_field() {
        // Length field claims more bytes than were received.
        let reply = [0xFF, 0xFF, 1, 6, 0, 0x00, 0xF8];
        assert!(matches!(
            CommandResponse::parse(&reply, 1),
            Err(BusError::ShortResponse(7))
        ));
    }
}
