use std::env;
use std::thread::sleep;
use std::time::Duration;

use so101_diag::FULL_TURN_TICKS;
use so101_diag::arm::{Arm, JOINT_IDS, JOINT_NAMES};
use so101_diag::clamp_position;

const DEFAULT_PERCENT: i32 = 5;
const SETTLE_TIME: Duration = Duration::from_millis(800);

pub fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = env::args().collect();
    let Some(port_name) = args.get(1) else {
        println!("Usage: move-test <port> [percent]  (default ±{}%)", DEFAULT_PERCENT);
        return;
    };
    let percent: i32 = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_PERCENT)
        .clamp(1, 25);
    let delta = FULL_TURN_TICKS as i32 * percent / 100;

    let mut arm = match Arm::open(port_name) {
        Ok(arm) => arm,
        Err(e) => {
            println!("✗ Failed to open {}: {}", port_name, e);
            return;
        }
    };

    println!(
        "=== Move test on {} (±{}% = ±{} ticks) ===",
        port_name, percent, delta
    );
    let mut tested = 0;
    let mut moved = 0;

    for (index, id) in JOINT_IDS.into_iter().enumerate() {
        let name = JOINT_NAMES[index];
        let start = match arm.read_position_retry(id, 3) {
            Ok(position) => position,
            Err(e) => {
                println!("✗ Servo {} ({}): no position, skipping ({})", id, name, e);
                continue;
            }
        };
        tested += 1;

        if let Err(e) = arm.set_torque(id, true) {
            println!("✗ Servo {} ({}): torque enable failed ({})", id, name, e);
            continue;
        }

        let up = clamp_position(start as i32 + delta);
        let down = clamp_position(start as i32 - delta);
        let mut reached = [0u16; 2];

        for (slot, target) in reached.iter_mut().zip([up, down]) {
            if let Err(e) = arm.move_joint(id, target) {
                println!("✗ Servo {} ({}): goal write failed ({})", id, name, e);
            }
            sleep(SETTLE_TIME);
            *slot = arm.read_position_retry(id, 3).unwrap_or(start);
        }

        // back to where the joint started, then release it
        let _ = arm.move_joint(id, start);
        sleep(SETTLE_TIME);
        let _ = arm.set_torque(id, false);

        let travelled = reached[0].abs_diff(reached[1]);
        if travelled >= (delta / 2) as u16 {
            moved += 1;
            println!(
                "✓ Servo {} ({}): start={} up={} down={} travelled={}",
                id, name, start, reached[0], reached[1], travelled
            );
        } else {
            println!(
                "✗ Servo {} ({}): commanded ±{} ticks but only travelled {} — check torque and power",
                id, name, delta, travelled
            );
        }
    }

    println!(
        "Summary: {}/{} joints readable, {} moved as commanded",
        tested,
        JOINT_IDS.len(),
        moved
    );
}
