use embedded_io::{Read, Write};

use crate::arm::{Arm, JOINT_COUNT, JOINT_IDS, JOINT_NAMES};
use crate::comm::{
    ALARM_ANGLE, ALARM_OVERCURRENT, ALARM_OVERHEAT, ALARM_OVERLOAD, ALARM_VOLTAGE,
};
use crate::{
    has_error, is_moving, is_torque_enabled, ping_servo, read_current, read_load, read_position,
    read_speed, read_status, read_temperature, read_voltage,
};

/// The voltage register reports decivolts. Anything below the servo's
/// operating floor means the motor rail is down and only USB is powering
/// the adapter.
pub const RAIL_ABSENT_DECIVOLTS: u8 = 45;
pub const RAIL_SAGGING_DECIVOLTS: u8 = 60;
pub const RAIL_MAX_DECIVOLTS: u8 = 84;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerVerdict {
    /// Rail effectively dead; the servos enumerate but cannot hold torque.
    UsbOnly,
    /// Rail present but below spec, typically a weak supply or thin wiring.
    Sagging,
    Healthy,
    Overvoltage,
}

pub fn power_verdict(voltage_dv: u8) -> PowerVerdict {
    if voltage_dv < RAIL_ABSENT_DECIVOLTS {
        PowerVerdict::UsbOnly
    } else if voltage_dv < RAIL_SAGGING_DECIVOLTS {
        PowerVerdict::Sagging
    } else if voltage_dv <= RAIL_MAX_DECIVOLTS {
        PowerVerdict::Healthy
    } else {
        PowerVerdict::Overvoltage
    }
}

pub fn describe_alarms(bits: u8) -> String {
    let mut names = Vec::new();
    if bits & ALARM_VOLTAGE != 0 {
        names.push("voltage");
    }
    if bits & ALARM_ANGLE != 0 {
        names.push("angle");
    }
    if bits & ALARM_OVERHEAT != 0 {
        names.push("overheat");
    }
    if bits & ALARM_OVERCURRENT != 0 {
        names.push("overcurrent");
    }
    if bits & ALARM_OVERLOAD != 0 {
        names.push("overload");
    }
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JointHealth {
    pub id: u8,
    pub name: &'static str,
    pub responding: bool,
    pub position: Option<u16>,
    pub voltage_dv: Option<u8>,
    pub temperature_c: Option<u8>,
    pub torque_enabled: Option<bool>,
    pub moving: Option<bool>,
    pub alarms: Option<u8>,
}

impl JointHealth {
    pub fn is_alarmed(&self) -> bool {
        self.alarms.is_some_and(|bits| bits != 0)
    }
}

pub fn check_joint<P: Read + Write>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
    name: &'static str,
) -> JointHealth {
    let mut health = JointHealth {
        id: servo_id,
        name,
        ..JointHealth::default()
    };

    if ping_servo(port, buffer, servo_id).is_err() {
        return health;
    }
    health.responding = true;
    health.position = read_position(port, buffer, servo_id).ok();
    health.voltage_dv = read_voltage(port, buffer, servo_id).ok();
    health.temperature_c = read_temperature(port, buffer, servo_id).ok();
    health.torque_enabled = is_torque_enabled(port, buffer, servo_id).ok();
    health.moving = is_moving(port, buffer, servo_id).ok();
    health.alarms = read_status(port, buffer, servo_id).ok();
    health
}

#[derive(Debug)]
pub struct ArmHealth {
    pub joints: [JointHealth; JOINT_COUNT],
}

impl ArmHealth {
    pub fn responding_count(&self) -> usize {
        self.joints.iter().filter(|j| j.responding).count()
    }

    pub fn torque_enabled_count(&self) -> usize {
        self.joints
            .iter()
            .filter(|j| j.torque_enabled == Some(true))
            .count()
    }

    pub fn alarmed_count(&self) -> usize {
        self.joints.iter().filter(|j| j.is_alarmed()).count()
    }

    pub fn first_responder(&self) -> Option<u8> {
        self.joints.iter().find(|j| j.responding).map(|j| j.id)
    }

    /// Verdict from the first joint that reported a voltage.
    pub fn power(&self) -> Option<PowerVerdict> {
        self.joints
            .iter()
            .find_map(|j| j.voltage_dv)
            .map(power_verdict)
    }
}

pub fn check_arm(arm: &mut Arm) -> ArmHealth {
    let (port, buffer) = arm.split();
    let mut joints = [JointHealth::default(); JOINT_COUNT];
    for (index, id) in JOINT_IDS.into_iter().enumerate() {
        joints[index] = check_joint(port, buffer, id, JOINT_NAMES[index]);
    }
    ArmHealth { joints }
}

/// Everything the live monitor shows for one joint. Reads that fail fall
/// back to zero rather than killing the refresh.
#[derive(Default, Debug, Clone, Copy)]
pub struct JointSnapshot {
    pub id: u8,
    pub position: u16,
    pub goal_position: u16,
    pub speed: u16,
    pub load: u16,
    pub voltage: u8,
    pub temperature: u8,
    pub current: u16,
    pub is_moving: bool,
    pub has_error: bool,
}

pub fn snapshot_joint<P: Read + Write>(
    port: &mut P,
    buffer: &mut [u8],
    servo_id: u8,
) -> JointSnapshot {
    let position = read_position(port, buffer, servo_id).unwrap_or(0);
    JointSnapshot {
        id: servo_id,
        position,
        goal_position: position,
        speed: read_speed(port, buffer, servo_id).unwrap_or(0),
        load: read_load(port, buffer, servo_id).unwrap_or(0),
        voltage: read_voltage(port, buffer, servo_id).unwrap_or(0),
        temperature: read_temperature(port, buffer, servo_id).unwrap_or(0),
        current: read_current(port, buffer, servo_id).unwrap_or(0),
        is_moving: is_moving(port, buffer, servo_id).unwrap_or(false),
        has_error: has_error(port, buffer, servo_id).unwrap_or(true),
    }
}
