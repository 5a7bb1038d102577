use std::{
    env,
    fs::OpenOptions,
    io::{self},
    time::Duration,
};

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use embedded_io::{Read, Write};
use embedded_io_adapters::std::FromStd;
use log::info;
use ratatui::prelude::*;

use so101_diag::arm::{DEFAULT_BAUD, DEFAULT_TIMEOUT, JOINT_IDS, JOINT_NAMES, open_serial_port};
use so101_diag::ui::{MonitorState, render};

const MAX_BUFFER_SIZE: usize = 256;

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Raw mode owns the terminal, so logs go to a file.
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("servo_monitor.log")?;

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = env::args().collect();
    let Some(port_name) = args.get(1) else {
        println!("Usage: monitor <port>");
        return Ok(());
    };

    info!("Starting joint monitor on {}", port_name);

    let serialport = open_serial_port(port_name, DEFAULT_BAUD, DEFAULT_TIMEOUT)?;
    let mut port = FromStd::new(serialport);
    let mut buffer = [0u8; MAX_BUFFER_SIZE];

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut port, &mut buffer);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app<B: Backend, P: Read + Write>(
    terminal: &mut Terminal<B>,
    port: &mut P,
    buffer: &mut [u8],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut state = MonitorState::new(&JOINT_IDS, &JOINT_NAMES);

    loop {
        if let Err(e) = state.process_queued_commands(port, buffer) {
            info!("Error processing queued commands: {:?}", e);
        }
        state.update(port, buffer);

        terminal.draw(|f| {
            render(f, &state);
        })?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        return Ok(());
                    }
                    KeyCode::Up => {
                        state.select_previous();
                    }
                    KeyCode::Down => {
                        state.select_next();
                    }
                    KeyCode::Left => {
                        let delta = if key.modifiers.contains(KeyModifiers::SHIFT) {
                            -200
                        } else {
                            -20
                        };
                        let _ = state.jog(delta);
                    }
                    KeyCode::Right => {
                        let delta = if key.modifiers.contains(KeyModifiers::SHIFT) {
                            200
                        } else {
                            20
                        };
                        let _ = state.jog(delta);
                    }
                    _ => {}
                }
            }
        }
    }
}
