//! Serial port transport.

use crate::transport::Transport;
use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use sinterkit_core::config::{ParityMode, SerialSettings};
use sinterkit_core::error::{Result, TransportError};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Granularity of the byte-read loop; the per-call deadline is enforced
/// on top of this.
const READ_SLICE_MS: u64 = 50;

/// Pause between open retries.
const RETRY_DELAY_MS: u64 = 250;

/// List available serial port names.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(|e| TransportError::ReadFailed {
        reason: format!("port enumeration failed: {}", e),
    })?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// A real serial port speaking CR/LF-terminated ASCII lines.
pub struct SerialTransport {
    port_name: String,
    port: Mutex<Box<dyn SerialPort>>,
    open: AtomicBool,
}

impl SerialTransport {
    /// Open a port with bounded retries.
    pub fn open(port_name: &str, settings: &SerialSettings) -> Result<Self> {
        let attempts = settings.open_retries.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match Self::try_open(port_name, settings) {
                Ok(port) => {
                    debug!(port = port_name, baud = settings.baud_rate, "serial port open");
                    return Ok(Self {
                        port_name: port_name.to_string(),
                        port: Mutex::new(port),
                        open: AtomicBool::new(true),
                    });
                }
                Err(e) => {
                    warn!(
                        port = port_name,
                        attempt,
                        attempts,
                        error = %e,
                        "serial open failed"
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
                    }
                }
            }
        }
        Err(map_open_error(
            port_name,
            last_error.unwrap_or_else(|| {
                serialport::Error::new(serialport::ErrorKind::Unknown, "no attempt was made")
            }),
        ))
    }

    fn try_open(
        port_name: &str,
        settings: &SerialSettings,
    ) -> std::result::Result<Box<dyn SerialPort>, serialport::Error> {
        let data_bits = match settings.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };
        let parity = match settings.parity {
            ParityMode::None => Parity::None,
            ParityMode::Even => Parity::Even,
            ParityMode::Odd => Parity::Odd,
        };
        let stop_bits = match settings.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        };
        serialport::new(port_name, settings.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(READ_SLICE_MS))
            .open()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Disconnected {
                reason: format!("{} is closed", self.port_name),
            }
            .into())
        }
    }
}

impl Transport for SerialTransport {
    fn write_line(&self, line: &str) -> Result<()> {
        self.ensure_open()?;
        let mut port = self.port.lock();
        let frame = format!("{}\r\n", line);
        port.write_all(frame.as_bytes())
            .and_then(|_| port.flush())
            .map_err(|e| TransportError::WriteFailed {
                reason: format!("{}: {}", self.port_name, e),
            })?;
        trace!(port = %self.port_name, line = %line, "tx");
        Ok(())
    }

    fn read_line(&self, timeout: Duration) -> Result<String> {
        self.ensure_open()?;
        let deadline = Instant::now() + timeout;
        let mut buffer: Vec<u8> = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let read = { self.port.lock().read(&mut byte) };
            match read {
                Ok(0) => {
                    self.open.store(false, Ordering::SeqCst);
                    return Err(TransportError::Disconnected {
                        reason: format!("{}: end of stream", self.port_name),
                    }
                    .into());
                }
                Ok(_) => match byte[0] {
                    b'\n' => {
                        let line = String::from_utf8_lossy(&buffer).trim().to_string();
                        trace!(port = %self.port_name, line = %line, "rx");
                        return Ok(line);
                    }
                    b'\r' => {}
                    other => buffer.push(other),
                },
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    if Instant::now() >= deadline {
                        return Err(TransportError::ReadTimeout {
                            timeout_ms: timeout.as_millis() as u64,
                        }
                        .into());
                    }
                }
                Err(e) => {
                    return Err(TransportError::ReadFailed {
                        reason: format!("{}: {}", self.port_name, e),
                    }
                    .into());
                }
            }
        }
    }

    fn name(&self) -> String {
        self.port_name.clone()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        debug!(port = %self.port_name, "serial port closed");
        Ok(())
    }
}

fn map_open_error(port_name: &str, error: serialport::Error) -> sinterkit_core::Error {
    match error.kind() {
        serialport::ErrorKind::NoDevice => TransportError::PortNotFound {
            port: port_name.to_string(),
        }
        .into(),
        _ => TransportError::FailedToOpen {
            port: port_name.to_string(),
            reason: error.to_string(),
        }
        .into(),
    }
}
