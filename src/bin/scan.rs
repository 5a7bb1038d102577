use std::env;

use so101_diag::scan::{SCS_BAUD_RATES, list_ports, sweep_baud_rates};

const SCAN_ID_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

pub fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    println!("=== Serial Ports ===");
    match list_ports() {
        Ok(ports) if ports.is_empty() => println!("No serial ports found"),
        Ok(ports) => {
            for port in ports {
                println!("  {} ({:?})", port.port_name, port.port_type);
            }
        }
        Err(e) => println!("✗ Failed to enumerate ports: {}", e),
    }

    let args: Vec<String> = env::args().collect();
    let Some(port_name) = args.get(1) else {
        println!("\nUsage: scan <port>  (e.g. scan COM3) to sweep baud rates");
        return;
    };

    println!(
        "\n=== Sweeping {} baud rates on {} (ids {}..={}) ===",
        SCS_BAUD_RATES.len(),
        port_name,
        SCAN_ID_RANGE.start(),
        SCAN_ID_RANGE.end()
    );
    let hits = sweep_baud_rates(port_name, SCAN_ID_RANGE);
    if hits.is_empty() {
        println!("✗ No servos answered at any baud rate. Check wiring and power.");
        return;
    }
    for hit in hits {
        println!("✓ {} baud: servos {:?}", hit.baud, hit.responders);
    }
}
