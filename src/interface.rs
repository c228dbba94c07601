//! Serial line abstraction
//!
//! The ROM bootloader is reached through a plain byte pipe with a read
//! timeout plus the two modem control lines used for resetting the chip.
//! [Interface] captures exactly that surface so the protocol layers can be
//! exercised against a scripted peer as well as a real port.

use std::{
    io::{self, Read, Write},
    time::Duration,
};

use serialport::{ClearBuffer, FlowControl, Parity, SerialPort};

use crate::error::Error;

/// Response timeout used for the initial SYNC and all short commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);

/// Baud rate the ROM bootloader listens on after reset.
pub const SYNC_BAUD: u32 = 9600;

/// A byte-oriented serial line with a read timeout and modem line control.
pub trait Interface: Read + Write + Send {
    /// Set the deadline for blocking reads.
    fn set_timeout(&mut self, timeout: Duration) -> serialport::Result<()>;

    /// The currently configured read deadline.
    fn timeout(&self) -> Duration;

    /// Drive the DTR line. Wired to GPIO0 on the target.
    fn set_dtr(&mut self, level: bool) -> serialport::Result<()>;

    /// Drive the RTS line. Wired to RESET on the target.
    fn set_rts(&mut self, level: bool) -> serialport::Result<()>;

    /// Discard any bytes already received but not yet read.
    fn clear_input(&mut self) -> serialport::Result<()>;
}

/// [Interface] implementation over a host serial port.
pub struct SerialInterface {
    port: Box<dyn SerialPort>,
}

impl SerialInterface {
    /// Open `path` with the configuration the ROM bootloader expects:
    /// 9600 baud, no parity, no flow control.
    pub fn open(path: &str) -> Result<Self, Error> {
        let port = serialport::new(path, SYNC_BAUD)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(DEFAULT_TIMEOUT)
            .open()?;

        Ok(Self { port })
    }

    pub fn into_serial(self) -> Box<dyn SerialPort> {
        self.port
    }
}

impl From<Box<dyn SerialPort>> for SerialInterface {
    fn from(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialInterface {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialInterface {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Interface for SerialInterface {
    fn set_timeout(&mut self, timeout: Duration) -> serialport::Result<()> {
        self.port.set_timeout(timeout)
    }

    fn timeout(&self) -> Duration {
        self.port.timeout()
    }

    fn set_dtr(&mut self, level: bool) -> serialport::Result<()> {
        self.port.write_data_terminal_ready(level)
    }

    fn set_rts(&mut self, level: bool) -> serialport::Result<()> {
        self.port.write_request_to_send(level)
    }

    fn clear_input(&mut self) -> serialport::Result<()> {
        self.port.clear(ClearBuffer::Input)
    }
}
