use std::env;
use std::io::Write as _;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use so101_diag::arm::{Arm, HOME_POSE, JOINT_COUNT, JOINT_IDS, REST_POSE};
use so101_diag::set_torque;
use so101_diag::teleop::{DEFAULT_ALPHA, Teleop, write_pose};

const DEFAULT_LEADER_PORT: &str = "COM3";
const DEFAULT_FOLLOWER_PORT: &str = "COM4";
const LOOP_PERIOD: Duration = Duration::from_millis(50);
const STATUS_INTERVAL: u32 = 20;

/// Flags set by the keyboard watcher thread, drained by the control loop.
#[derive(Default)]
struct Controls {
    quit: bool,
    toggle_pause: bool,
    go_home: bool,
    go_rest: bool,
    toggle_torque: bool,
}

fn watch_keyboard(controls: Arc<Mutex<Controls>>) {
    loop {
        if !event::poll(Duration::from_millis(100)).unwrap_or(false) {
            continue;
        }
        let Ok(Event::Key(key)) = event::read() else {
            continue;
        };
        let mut controls = controls.lock().unwrap();
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => controls.quit = true,
            KeyCode::Char(' ') => controls.toggle_pause = true,
            KeyCode::Char('h') => controls.go_home = true,
            KeyCode::Char('r') => controls.go_rest = true,
            KeyCode::Char('t') => controls.toggle_torque = true,
            _ => {}
        }
    }
}

pub fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let args: Vec<String> = env::args().collect();
    let leader_port = args.get(1).map(String::as_str).unwrap_or(DEFAULT_LEADER_PORT);
    let follower_port = args
        .get(2)
        .map(String::as_str)
        .unwrap_or(DEFAULT_FOLLOWER_PORT);

    println!("=== SO-101 Teleoperation ===");
    println!("Leader:   {}", leader_port);
    println!("Follower: {}", follower_port);
    println!("Keys: SPACE pause/resume, h home, r rest, t follower torque, q/ESC quit");

    let mut leader = match Arm::open(leader_port) {
        Ok(arm) => arm,
        Err(e) => {
            println!("✗ Failed to open leader port {}: {}", leader_port, e);
            return;
        }
    };
    let mut follower = match Arm::open(follower_port) {
        Ok(arm) => arm,
        Err(e) => {
            println!("✗ Failed to open follower port {}: {}", follower_port, e);
            return;
        }
    };

    // The leader is moved by hand, the follower does the holding.
    if leader.set_torque_all(false) > 0 {
        println!("! Not all leader servos released torque");
    }
    let mut follower_torque_on = true;
    if follower.set_torque_all(true) > 0 {
        println!("! Not all follower servos enabled torque. Check connections and power.");
    }

    if enable_raw_mode().is_err() {
        println!("✗ Failed to switch the terminal to raw mode");
        return;
    }
    let controls = Arc::new(Mutex::new(Controls::default()));
    {
        let controls = Arc::clone(&controls);
        thread::spawn(move || watch_keyboard(controls));
    }

    let mut session: Teleop<JOINT_COUNT> = Teleop::new(&JOINT_IDS, DEFAULT_ALPHA);
    let (leader_port, buffer) = leader.split();
    let (follower_port, _) = follower.split();

    loop {
        let (quit, pause, home, rest, torque) = {
            let mut controls = controls.lock().unwrap();
            let drained = (
                controls.quit,
                controls.toggle_pause,
                controls.go_home,
                controls.go_rest,
                controls.toggle_torque,
            );
            *controls = Controls::default();
            drained
        };
        if quit {
            break;
        }
        if pause {
            session.toggle_active();
            print!(
                "\r\nTeleoperation {}\r\n",
                if session.is_active() { "resumed" } else { "paused" }
            );
        }
        if home {
            write_pose(follower_port, buffer, &JOINT_IDS, &HOME_POSE);
        }
        if rest {
            write_pose(follower_port, buffer, &JOINT_IDS, &REST_POSE);
        }
        if torque {
            follower_torque_on = !follower_torque_on;
            for id in JOINT_IDS {
                let _ = set_torque(follower_port, buffer, id, follower_torque_on);
            }
            print!(
                "\r\nFollower torque {}\r\n",
                if follower_torque_on { "on" } else { "off" }
            );
        }

        session.step(leader_port, follower_port, buffer);

        if session.iterations % STATUS_INTERVAL == 0 {
            print!(
                "\r{} | leader {:?} | follower {:?} | {} read / {} write failures   ",
                if session.is_active() { "ACTIVE" } else { "PAUSED" },
                session.leader_positions,
                session.follower_positions,
                session.read_failures,
                session.write_failures
            );
            let _ = std::io::stdout().flush();
        }

        thread::sleep(LOOP_PERIOD);
    }

    // Leave the follower limp, as the leader already is.
    for id in JOINT_IDS {
        let _ = set_torque(follower_port, buffer, id, false);
    }
    let _ = disable_raw_mode();
    println!("\nExiting teleoperation");
}
