use std::ops::RangeInclusive;
use std::time::Duration;

use embedded_io::{Read, Write};
use embedded_io_adapters::std::FromStd;
use log::{info, warn};
use serialport::SerialPortInfo;

use crate::arm::open_serial_port;
use crate::{BusError, ping_servo};

/// Every rate an SCS-series servo can be configured to speak, fastest first.
pub const SCS_BAUD_RATES: [u32; 8] = [
    1_000_000, 500_000, 250_000, 128_000, 115_200, 76_800, 57_600, 38_400,
];

/// Pings during a sweep get a short leash, a present servo answers within
/// a couple of milliseconds.
const SWEEP_TIMEOUT: Duration = Duration::from_millis(50);

pub fn list_ports() -> Result<Vec<SerialPortInfo>, BusError> {
    serialport::available_ports().map_err(|e| {
        warn!("Failed to enumerate serial ports: {}", e);
        BusError::IoError
    })
}

/// Ping every id in the range, collecting the ones that answer.
pub fn scan_bus<P: Read + Write>(
    port: &mut P,
    buffer: &mut [u8],
    ids: RangeInclusive<u8>,
) -> Vec<u8> {
    ids.filter(|&id| ping_servo(port, buffer, id).is_ok())
        .collect()
}

#[derive(Debug)]
pub struct BaudScanHit {
    pub baud: u32,
    pub responders: Vec<u8>,
}

/// Re-open the port at every SCS baud rate and scan the id range at each.
/// Servos configured to a non-default rate show up here and nowhere else.
pub fn sweep_baud_rates(port_name: &str, ids: RangeInclusive<u8>) -> Vec<BaudScanHit> {
    let mut hits = Vec::new();
    for &baud in SCS_BAUD_RATES.iter() {
        let port = match open_serial_port(port_name, baud, SWEEP_TIMEOUT) {
            Ok(port) => port,
            Err(e) => {
                warn!("Could not open {} at {} baud: {}", port_name, baud, e);
                continue;
            }
        };
        let mut port = FromStd::new(port);
        let mut buffer = [0u8; 256];

        let responders = scan_bus(&mut port, &mut buffer, ids.clone());
        info!("{} baud: {} responder(s)", baud, responders.len());
        if !responders.is_empty() {
            hits.push(BaudScanHit { baud, responders });
        }
        // port drops here so the next rate can re-open it
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedPort;

    #[test]
    fn scan_collects_only_responders() {
        let mut port = ScriptedPort::new();
        port.push_status_reply(1, 0, &[]);
        // id 2 stays silent: no reply queued
        let mut buffer = [0u8; 64];

        assert_eq!(scan_bus(&mut port, &mut buffer, 1..=2), vec![1]);
    }

    #[test]
    fn scan_ignores_replies_from_the_wrong_id() {
        let mut port = ScriptedPort::new();
        port.push_status_reply(9, 0, &[]); // crosstalk while pinging id 1
        let mut buffer = [0u8; 64];

        assert!(scan_bus(&mut port, &mut buffer, 1..=1).is_empty());
    }
}
