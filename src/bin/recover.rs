use std::env;
use std::thread::sleep;
use std::time::Duration;

use so101_diag::arm::{Arm, JOINT_IDS, JOINT_NAMES};
use so101_diag::{disable_torque, enable_torque, ping_servo, reset_servo};

const TORQUE_CYCLES: usize = 3;
const CYCLE_DELAY: Duration = Duration::from_millis(200);
const REBOOT_DELAY: Duration = Duration::from_millis(1000);

pub fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = env::args().collect();
    let Some(port_name) = args.get(1) else {
        println!("Usage: recover <port>");
        return;
    };

    let mut arm = match Arm::open(port_name) {
        Ok(arm) => arm,
        Err(e) => {
            println!("✗ Failed to open {}: {}", port_name, e);
            return;
        }
    };

    println!("=== Recovery pass on {} ===", port_name);
    let mut responsive = Vec::new();
    let mut dead = Vec::new();
    for (index, id) in JOINT_IDS.into_iter().enumerate() {
        if arm.ping(id).is_ok() {
            println!("✓ Servo {} ({}) is responsive", id, JOINT_NAMES[index]);
            responsive.push(id);
        } else {
            println!("✗ Servo {} ({}) not responding", id, JOINT_NAMES[index]);
            dead.push(id);
        }
    }

    if responsive.is_empty() {
        println!("\nNo servos are responding. Check connections and power.");
        return;
    }

    // Torque-cycling the live ones clears latched overload faults.
    println!("\nTorque-cycling {} responsive servo(s)...", responsive.len());
    let (port, buffer) = arm.split();
    for &id in &responsive {
        for _ in 0..TORQUE_CYCLES {
            let _ = disable_torque(port, buffer, id);
            sleep(CYCLE_DELAY);
            let _ = enable_torque(port, buffer, id);
            sleep(CYCLE_DELAY);
        }
        let _ = disable_torque(port, buffer, id);
        match ping_servo(port, buffer, id) {
            Ok(()) => println!("✓ Servo {} survived torque cycling", id),
            Err(e) => println!("✗ Servo {} stopped answering after torque cycling: {}", id, e),
        }
    }

    if dead.is_empty() {
        println!("\nAll servos answered; nothing to recover.");
        return;
    }

    println!("\nAttempting to recover {} dead servo(s)...", dead.len());
    let mut recovered = 0;
    for &id in &dead {
        // A silent servo sometimes comes back after a torque poke, and
        // failing that, after a reset. The reset reply is usually swallowed
        // by the reboot, so its result is ignored.
        let _ = disable_torque(port, buffer, id);
        sleep(CYCLE_DELAY);
        let _ = enable_torque(port, buffer, id);
        sleep(CYCLE_DELAY);
        if ping_servo(port, buffer, id).is_ok() {
            println!("✓ Servo {} recovered after torque cycle", id);
            recovered += 1;
            continue;
        }

        let _ = reset_servo(port, buffer, id);
        sleep(REBOOT_DELAY);
        if ping_servo(port, buffer, id).is_ok() {
            println!("✓ Servo {} recovered after reset", id);
            recovered += 1;
        } else {
            println!("✗ Servo {} still not responding", id);
        }
    }

    println!(
        "\nSummary: {}/{} dead servo(s) recovered",
        recovered,
        dead.len()
    );
}
