//! Serial port transport for the knob box
//!
//! Wraps a `serialport` handle so that [`KnobTransport`] never blocks: reads
//! only pull bytes the driver already has, and a partial line is kept in
//! `pending` until its terminator arrives.

use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use ledcam_knob_lib::KnobTransport;
use log::{debug, info};
use serialport::SerialPort;

/// Upper bound on a blocking read or write. Reads only ask for bytes the
/// driver already reported, so this only matters for writes.
const PORT_TIMEOUT: Duration = Duration::from_millis(10);

/// Drop buffered input beyond this; the knob box never sends lines this long.
const MAX_PENDING: usize = 256;

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    pending: Vec<u8>,
}

impl SerialTransport {
    /// Returns `true` if a device node exists at `path`
    pub fn is_present(path: &str) -> bool {
        Path::new(path).exists()
    }

    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        debug!("Opening knob serial port {path} at {baud_rate} baud");
        let port = serialport::new(path, baud_rate)
            .timeout(PORT_TIMEOUT)
            .open()
            .with_context(|| format!("opening serial port {path}"))?;

        // Anything queued before we opened belongs to no request of ours
        port.clear(serialport::ClearBuffer::Input)
            .with_context(|| format!("clearing serial port {path}"))?;

        info!("Knob serial port {path} open");
        Ok(Self {
            port,
            pending: Vec::new(),
        })
    }

    /// Move whatever the driver has buffered into `pending`
    fn fill_pending(&mut self) -> io::Result<()> {
        let ready = usize::try_from(self.port.bytes_to_read()?).unwrap_or(usize::MAX);
        if ready == 0 {
            return Ok(());
        }

        let mut buf = vec![0u8; ready.min(MAX_PENDING)];
        let read = self.port.read(&mut buf)?;
        self.pending.extend_from_slice(&buf[..read]);

        if self.pending.len() > MAX_PENDING {
            let before = self.pending.len();
            keep_newest_line(&mut self.pending);
            debug!(
                "Discarded {} bytes of excess knob input",
                before - self.pending.len()
            );
        }
        Ok(())
    }
}

impl KnobTransport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let ready = usize::try_from(self.port.bytes_to_read()?).unwrap_or(usize::MAX);
        Ok(self.pending.len().saturating_add(ready))
    }

    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.fill_pending()?;
        Ok(take_line(&mut self.pending))
    }
}

/// Remove and return the first complete line from `pending`
fn take_line(pending: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = pending.iter().position(|&b| b == b'\n')?;
    Some(pending.drain(..=end).collect())
}

/// Shrink `pending` to its newest complete line, dropping older lines and any
/// unterminated tail. Clears it if no line is complete.
fn keep_newest_line(pending: &mut Vec<u8>) {
    let Some(end) = pending.iter().rposition(|&b| b == b'\n') else {
        pending.clear();
        return;
    };
    pending.truncate(end + 1);
    let start = pending[..end]
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |prev| prev + 1);
    pending.drain(..start);
}
