//! Bootloader session over a serial line
//!
//! The [Connection] struct abstracts over the serial interface and the
//! sending/decoding of commands, and provides the session-level operations
//! (reset sequencing, sync, register reads) the flasher builds on.

use std::{
    io::{BufWriter, Write},
    time::Duration,
};

use log::debug;

use crate::{
    command::{Command, CommandType},
    error::{ConnectionError, Error, ResultExt, RomError},
    interface::Interface,
    slip::{self, SlipEncoder},
};

pub mod reset;

const SYNC_ATTEMPTS: usize = 3;
const SYNC_RESPONSE_FRAMES: usize = 8;

/// A response from the target device following a command
#[derive(Debug, Clone)]
pub struct Response {
    pub command: u8,
    pub value: u32,
    pub body: Vec<u8>,
    pub status: u8,
    pub last_error: u8,
}

impl Response {
    /// Whether the target reported success.
    pub fn ok(&self) -> bool {
        self.status == 0 && self.last_error == 0
    }
}

/// A command session with a target device held in its ROM bootloader
pub struct Connection<'a> {
    interface: &'a mut dyn Interface,
}

impl<'a> Connection<'a> {
    pub fn new(interface: &'a mut dyn Interface) -> Self {
        Connection { interface }
    }

    /// Reset into the ROM bootloader and establish sync.
    pub fn reboot_into_bootloader(&mut self) -> Result<(), Error> {
        reset::enter_bootloader(self.interface)?;
        self.try_sync(SYNC_ATTEMPTS)
    }

    /// Reset so the firmware in flash boots.
    pub fn reboot_into_firmware(&mut self) -> Result<(), Error> {
        reset::enter_firmware(self.interface)
    }

    /// Repeat the SYNC handshake until it succeeds or `attempts` runs out.
    pub fn try_sync(&mut self, attempts: usize) -> Result<(), Error> {
        for _ in 0..attempts {
            if self.sync().is_ok() {
                return Ok(());
            }
        }

        Err(Error::Connection(ConnectionError::NoSyncReply))
    }

    /// One SYNC handshake: a single SYNC command followed by a burst of
    /// response frames, all of which must parse.
    pub fn sync(&mut self) -> Result<(), Error> {
        self.with_timeout(CommandType::Sync.timeout(), |connection| {
            connection.write_command(Command::Sync)?;

            for _ in 0..SYNC_RESPONSE_FRAMES {
                connection.read_response().for_command(CommandType::Sync)?;
            }

            Ok(())
        })
    }

    /// Run `f` with the read deadline set to `timeout`, restoring the
    /// previous deadline afterwards.
    pub fn with_timeout<T, F>(&mut self, timeout: Duration, mut f: F) -> Result<T, Error>
    where
        F: FnMut(&mut Self) -> Result<T, Error>,
    {
        let old_timeout = self.interface.timeout();
        self.interface.set_timeout(timeout)?;

        let result = f(self);

        self.interface.set_timeout(old_timeout)?;

        result
    }

    /// Write a SLIP-framed command packet.
    pub fn write_command(&mut self, command: Command) -> Result<(), Error> {
        debug!("writing command: {:?}", command);

        self.interface.clear_input()?;
        let mut writer = BufWriter::new(&mut self.interface);
        let mut encoder = SlipEncoder::new(&mut writer)?;
        command.write(&mut encoder)?;
        encoder.finish()?;
        writer.flush()?;

        Ok(())
    }

    /// Read and parse one response frame.
    pub fn read_response(&mut self) -> Result<Response, Error> {
        let frame = slip::read_frame(&mut self.interface)?;
        if frame.is_empty() {
            return Err(Error::Connection(ConnectionError::NoResponse));
        }
        if frame.len() < 10 {
            return Err(Error::Connection(ConnectionError::IncompleteResponse(
                frame.len(),
            )));
        }

        let direction = frame[0];
        if direction != 1 {
            return Err(Error::Connection(ConnectionError::InvalidDirection(
                direction,
            )));
        }

        let command = frame[1];
        let size = u16::from_le_bytes([frame[2], frame[3]]) as usize;
        let value = u32::from_le_bytes(frame[4..8].try_into().unwrap());
        let body = frame[8..].to_vec();
        if body.len() != size {
            return Err(Error::Connection(ConnectionError::SizeMismatch {
                expected: size,
                got: body.len(),
            }));
        }

        let (status, last_error) = if body.len() == 2 {
            (body[0], body[1])
        } else {
            (0, 0)
        };

        Ok(Response {
            command,
            value,
            body,
            status,
            last_error,
        })
    }

    /// Write `command` and read its response under the command's timeout,
    /// enforcing the command echo and the status bytes.
    pub fn command(&mut self, command: Command) -> Result<Response, Error> {
        let ty = command.command_type();

        self.with_timeout(ty.timeout(), |connection| {
            connection.write_command(command)?;

            let response = connection.read_response().for_command(ty)?;
            if response.command != ty as u8 {
                return Err(Error::Connection(ConnectionError::UnexpectedResponse {
                    expected: ty,
                    got: response.command,
                }));
            }
            if !response.ok() {
                return Err(Error::RomError(RomError::new(
                    ty,
                    response.status,
                    response.last_error,
                )));
            }

            Ok(response)
        })
    }

    /// Read a 32-bit register.
    pub fn read_reg(&mut self, address: u32) -> Result<u32, Error> {
        Ok(self.command(Command::ReadReg { address })?.value)
    }

    /// Read one raw SLIP frame, outside of the command/response protocol.
    ///
    /// Used for the output stream of code running from RAM.
    pub fn read_frame(&mut self) -> Result<Vec<u8>, Error> {
        Ok(slip::read_frame(&mut self.interface)?)
    }
}
