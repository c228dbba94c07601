//! Library and application errors

use std::{
    fmt::{Display, Formatter},
    io,
    path::PathBuf,
};

use miette::Diagnostic;
use strum::VariantNames;
use thiserror::Error;

use crate::{
    command::CommandType,
    params::{FlashFrequency, FlashMode, FlashSize},
};

#[derive(Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("Error while connecting to device")]
    #[diagnostic(transparent)]
    Connection(#[source] ConnectionError),

    #[error("Communication error while flashing device")]
    #[diagnostic(transparent)]
    Flashing(#[source] ConnectionError),

    #[error("The bootloader returned an error")]
    #[diagnostic(transparent)]
    RomError(#[from] RomError),

    #[error("The flash parameter string '{0}' is not valid")]
    #[diagnostic(
        code(esp8266flash::invalid_flash_params),
        help(
            "Pass either a single number or '<mode>,<size>,<freq>' with mode in {:?}, size in {:?}, freq in {:?}",
            FlashMode::VARIANTS,
            FlashSize::VARIANTS,
            FlashFrequency::VARIANTS
        )
    )]
    InvalidFlashParams(String),

    #[error("The image directory {0:?} does not exist")]
    #[diagnostic(code(esp8266flash::image_dir_not_found))]
    ImageDirectoryNotFound(PathBuf),

    #[error("No images to flash in {0:?}")]
    #[diagnostic(
        code(esp8266flash::no_images),
        help("Image files are named by their flash offset, e.g. '0x00000.bin'")
    )]
    NoImages(PathBuf),

    #[error("'{0}' is not a valid flash offset")]
    #[diagnostic(code(esp8266flash::invalid_image_name))]
    InvalidImageName(String),

    #[error("'{file}' maps to flash offset {offset:#x}, which is already taken")]
    #[diagnostic(code(esp8266flash::duplicate_image_offset))]
    DuplicateImageOffset { offset: u32, file: String },

    #[error("Failed to read image {file:?}")]
    #[diagnostic(code(esp8266flash::image_read))]
    ImageRead {
        file: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No serial port has been assigned to the flasher")]
    #[diagnostic(code(esp8266flash::no_port))]
    NoPort,

    #[error("failed to read flash params from the existing firmware")]
    #[diagnostic(code(esp8266flash::flash_params))]
    FlashParams(#[source] Box<Error>),

    #[error("The existing firmware has no recognizable image header")]
    #[diagnostic(code(esp8266flash::missing_image_header))]
    MissingImageHeader,

    #[error("failed to check for an existing device identity")]
    #[diagnostic(code(esp8266flash::identity_probe))]
    IdentityProbe(#[source] Box<Error>),

    #[cfg(feature = "fs-merge")]
    #[error("failed to merge flash filesystem")]
    #[diagnostic(code(esp8266flash::fs_merge))]
    FilesystemMerge(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("failed to flash image at {addr:#x}")]
    #[diagnostic(code(esp8266flash::write_failed))]
    WriteFailed { addr: u32 },

    #[error("failed to leave flashing mode")]
    #[diagnostic(
        code(esp8266flash::leave_flash_mode),
        help("Most likely flashing was successful, but you need to reboot your device manually")
    )]
    LeaveFlashMode(#[source] Box<Error>),

    #[error("Flash read returned {got} bytes, expected at least {expected}")]
    #[diagnostic(code(esp8266flash::truncated_read))]
    TruncatedRead { expected: usize, got: usize },

    #[error("Device did not return to the bootloader after reading flash")]
    #[diagnostic(code(esp8266flash::no_reboot_after_read))]
    NoRebootAfterRead,

    #[error("Unknown OUI selector {0:#04x} in the efuse MAC registers")]
    #[diagnostic(code(esp8266flash::unknown_oui))]
    UnknownOui(u8),
}

#[derive(Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum ConnectionError {
    #[error("IO error while using serial port: {0}")]
    #[diagnostic(code(esp8266flash::serial_error))]
    Serial(#[source] serialport::Error),

    #[error("Serial port not found")]
    #[diagnostic(
        code(esp8266flash::device_not_found),
        help("Ensure that the device is connected and your host recognizes the serial adapter")
    )]
    DeviceNotFound,

    #[error("Timeout while running {0}command")]
    #[diagnostic(code(esp8266flash::timeout))]
    Timeout(TimedOutCommand),

    #[error("No response from the device")]
    #[diagnostic(code(esp8266flash::no_response))]
    NoResponse,

    #[error("Response frame is too short: {0} bytes")]
    #[diagnostic(code(esp8266flash::incomplete_response))]
    IncompleteResponse(usize),

    #[error("Invalid direction byte {0:#04x} in response")]
    #[diagnostic(code(esp8266flash::invalid_direction))]
    InvalidDirection(u8),

    #[error("Response body length mismatch: header says {expected}, frame carries {got}")]
    #[diagnostic(code(esp8266flash::size_mismatch))]
    SizeMismatch { expected: usize, got: usize },

    #[error("Response to unexpected command: expected {expected}, got {got:#04x}")]
    #[diagnostic(code(esp8266flash::unexpected_response))]
    UnexpectedResponse { expected: CommandType, got: u8 },

    #[error("Failed to sync with the ROM bootloader")]
    #[diagnostic(
        code(esp8266flash::no_sync_reply),
        help("Check the wiring: RTS must drive RESET and DTR must drive GPIO0")
    )]
    NoSyncReply,
}

#[derive(Debug, Default, Clone)]
pub struct TimedOutCommand {
    command: Option<CommandType>,
}

impl From<CommandType> for TimedOutCommand {
    fn from(command: CommandType) -> Self {
        TimedOutCommand {
            command: Some(command),
        }
    }
}

impl Display for TimedOutCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.command {
            Some(command) => write!(f, "{} ", command),
            None => Ok(()),
        }
    }
}

impl From<serialport::Error> for ConnectionError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::Io(kind) => from_error_kind(kind, err),
            serialport::ErrorKind::NoDevice => ConnectionError::DeviceNotFound,
            _ => ConnectionError::Serial(err),
        }
    }
}

impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Self {
        Self::Connection(err.into())
    }
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        from_error_kind(err.kind(), err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Connection(err.into())
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Self::Connection(err)
    }
}

fn from_error_kind<E: Into<serialport::Error>>(kind: io::ErrorKind, err: E) -> ConnectionError {
    match kind {
        io::ErrorKind::TimedOut => ConnectionError::Timeout(TimedOutCommand::default()),
        io::ErrorKind::NotFound => ConnectionError::DeviceNotFound,
        _ => ConnectionError::Serial(err.into()),
    }
}

/// Error codes reported by the ROM loader in the last-error byte
#[derive(Copy, Clone, Debug, Error, Diagnostic)]
#[repr(u8)]
#[non_exhaustive]
pub enum RomErrorKind {
    #[error("Invalid message received")]
    #[diagnostic(code(esp8266flash::rom::invalid_message))]
    InvalidMessage = 0x05,

    #[error("Bootloader failed to execute command")]
    #[diagnostic(code(esp8266flash::rom::failed))]
    FailedToAct = 0x06,

    #[error("Received message has invalid crc")]
    #[diagnostic(code(esp8266flash::rom::crc))]
    InvalidCrc = 0x07,

    #[error("Bootloader failed to write to flash")]
    #[diagnostic(code(esp8266flash::rom::flash_write))]
    FlashWriteError = 0x08,

    #[error("Bootloader failed to read from flash")]
    #[diagnostic(code(esp8266flash::rom::flash_read))]
    FlashReadError = 0x09,

    #[error("Invalid length for flash read")]
    #[diagnostic(code(esp8266flash::rom::flash_read_length))]
    FlashReadLengthError = 0x0a,

    #[error("Other")]
    #[diagnostic(code(esp8266flash::rom::other))]
    Other = 0xff,
}

impl From<u8> for RomErrorKind {
    fn from(raw: u8) -> Self {
        match raw {
            0x05 => RomErrorKind::InvalidMessage,
            0x06 => RomErrorKind::FailedToAct,
            0x07 => RomErrorKind::InvalidCrc,
            0x08 => RomErrorKind::FlashWriteError,
            0x09 => RomErrorKind::FlashReadError,
            0x0a => RomErrorKind::FlashReadLengthError,
            _ => RomErrorKind::Other,
        }
    }
}

#[derive(Copy, Clone, Debug, Error, Diagnostic)]
#[non_exhaustive]
#[error("Error while running {command} command: status {status}")]
pub struct RomError {
    command: CommandType,
    status: u8,
    #[source]
    kind: RomErrorKind,
}

impl RomError {
    pub fn new(command: CommandType, status: u8, last_error: u8) -> RomError {
        RomError {
            command,
            status,
            kind: RomErrorKind::from(last_error),
        }
    }
}

pub(crate) trait ResultExt {
    /// mark an error as having occurred during the flashing stage
    fn flashing(self) -> Self;
    /// mark the command from which this error originates
    fn for_command(self, command: CommandType) -> Self;
}

impl<T> ResultExt for Result<T, Error> {
    fn flashing(self) -> Self {
        match self {
            Err(Error::Connection(err)) => Err(Error::Flashing(err)),
            res => res,
        }
    }

    fn for_command(self, command: CommandType) -> Self {
        match self {
            Err(Error::Connection(ConnectionError::Timeout(_))) => {
                Err(Error::Connection(ConnectionError::Timeout(command.into())))
            }
            Err(Error::Flashing(ConnectionError::Timeout(_))) => {
                Err(Error::Flashing(ConnectionError::Timeout(command.into())))
            }
            res => res,
        }
    }
}
