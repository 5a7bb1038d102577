use std::env;

use so101_diag::arm::Arm;
use so101_diag::health::{ArmHealth, PowerVerdict, check_arm, describe_alarms};
use so101_diag::probe::probe_servo;

const DEFAULT_LEADER_PORT: &str = "COM3";
const DEFAULT_FOLLOWER_PORT: &str = "COM4";

pub fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = env::args().collect();
    let leader_port = args.get(1).map(String::as_str).unwrap_or(DEFAULT_LEADER_PORT);
    let follower_port = args
        .get(2)
        .map(String::as_str)
        .unwrap_or(DEFAULT_FOLLOWER_PORT);

    for (label, port_name) in [("leader", leader_port), ("follower", follower_port)] {
        println!("\n=== Checking {} arm on {} ===", label, port_name);
        match Arm::open(port_name) {
            Ok(mut arm) => {
                let report = check_arm(&mut arm);
                print_report(&report);
                probe_register_layout(&mut arm, &report);
            }
            Err(e) => println!("✗ Failed to open {}: {}", port_name, e),
        }
    }
}

fn print_report(report: &ArmHealth) {
    for joint in &report.joints {
        if !joint.responding {
            println!("✗ Servo {} ({}) not responding", joint.id, joint.name);
            continue;
        }
        println!(
            "✓ Servo {} ({}): position={} voltage={} temp={}°C torque={} alarms={}",
            joint.id,
            joint.name,
            joint
                .position
                .map(|p| p.to_string())
                .unwrap_or_else(|| "?".to_string()),
            joint
                .voltage_dv
                .map(|v| format!("{:.1}V", v as f32 / 10.0))
                .unwrap_or_else(|| "?".to_string()),
            joint
                .temperature_c
                .map(|t| t.to_string())
                .unwrap_or_else(|| "?".to_string()),
            match joint.torque_enabled {
                Some(true) => "on",
                Some(false) => "off",
                None => "?",
            },
            joint.alarms.map(describe_alarms).unwrap_or_default(),
        );
    }

    println!(
        "Summary: {}/{} responding, {} torque-enabled, {} alarmed",
        report.responding_count(),
        report.joints.len(),
        report.torque_enabled_count(),
        report.alarmed_count()
    );
    match report.power() {
        Some(PowerVerdict::UsbOnly) => {
            println!("✗ Motor rail looks dead: check the external power supply")
        }
        Some(PowerVerdict::Sagging) => {
            println!("! Motor rail is sagging: weak supply or thin wiring")
        }
        Some(PowerVerdict::Healthy) => println!("✓ Motor rail voltage is healthy"),
        Some(PowerVerdict::Overvoltage) => println!("! Motor rail is above 8.4V"),
        None => println!("? No joint reported a voltage"),
    }
}

fn probe_register_layout(arm: &mut Arm, report: &ArmHealth) {
    let Some(servo_id) = report.first_responder() else {
        return;
    };
    let (port, buffer) = arm.split();
    match probe_servo(port, buffer, servo_id) {
        Ok(probe) => {
            println!(
                "Register layout (probed on servo {}): torque={} goal={}",
                servo_id,
                probe
                    .best_torque_address()
                    .map(|a| format!("{:#04x}", a))
                    .unwrap_or_else(|| "unknown".to_string()),
                probe
                    .best_goal_address()
                    .map(|a| format!("{:#04x}", a))
                    .unwrap_or_else(|| "unknown".to_string()),
            );
        }
        Err(e) => println!("✗ Register probe failed on servo {}: {}", servo_id, e),
    }
}
