//! Flash parameter encoding
//!
//! Bytes 2 and 3 of a firmware image header tell the SDK how to drive the
//! SPI flash chip: `(mode << 8) | (size << 4) | freq`. The string forms
//! accepted here are either a bare number or a `mode,size,freq` triple
//! such as `dio,4m,40m`.

use std::{fmt::Display, str::FromStr};

use strum_macros::{Display, EnumVariantNames};

use crate::error::Error;

/// SPI data line configuration
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumVariantNames)]
#[repr(u8)]
pub enum FlashMode {
    #[strum(serialize = "qio")]
    Qio = 0,
    #[strum(serialize = "qout")]
    Qout = 1,
    #[strum(serialize = "dio")]
    Dio = 2,
    #[strum(serialize = "dout")]
    Dout = 3,
}

impl FromStr for FlashMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mode = match s {
            "qio" => FlashMode::Qio,
            "qout" => FlashMode::Qout,
            "dio" => FlashMode::Dio,
            "dout" => FlashMode::Dout,
            _ => return Err(Error::InvalidFlashParams(s.to_string())),
        };

        Ok(mode)
    }
}

impl FlashMode {
    fn from_nibble(value: u8) -> Option<Self> {
        match value {
            0 => Some(FlashMode::Qio),
            1 => Some(FlashMode::Qout),
            2 => Some(FlashMode::Dio),
            3 => Some(FlashMode::Dout),
            _ => None,
        }
    }
}

/// Flash chip capacity, in the SDK's megabit naming
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumVariantNames)]
#[repr(u8)]
pub enum FlashSize {
    #[strum(serialize = "4m")]
    Flash4M = 0,
    #[strum(serialize = "2m")]
    Flash2M = 1,
    #[strum(serialize = "8m")]
    Flash8M = 2,
    #[strum(serialize = "16m")]
    Flash16M = 3,
    #[strum(serialize = "32m")]
    Flash32M = 4,
    #[strum(serialize = "16m-c1")]
    Flash16MC1 = 5,
    #[strum(serialize = "32m-c1")]
    Flash32MC1 = 6,
    #[strum(serialize = "32m-c2")]
    Flash32MC2 = 7,
}

impl FromStr for FlashSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let size = match s {
            "4m" => FlashSize::Flash4M,
            "2m" => FlashSize::Flash2M,
            "8m" => FlashSize::Flash8M,
            "16m" => FlashSize::Flash16M,
            "32m" => FlashSize::Flash32M,
            "16m-c1" => FlashSize::Flash16MC1,
            "32m-c1" => FlashSize::Flash32MC1,
            "32m-c2" => FlashSize::Flash32MC2,
            _ => return Err(Error::InvalidFlashParams(s.to_string())),
        };

        Ok(size)
    }
}

impl FlashSize {
    fn from_nibble(value: u8) -> Option<Self> {
        match value {
            0 => Some(FlashSize::Flash4M),
            1 => Some(FlashSize::Flash2M),
            2 => Some(FlashSize::Flash8M),
            3 => Some(FlashSize::Flash16M),
            4 => Some(FlashSize::Flash32M),
            5 => Some(FlashSize::Flash16MC1),
            6 => Some(FlashSize::Flash32MC1),
            7 => Some(FlashSize::Flash32MC2),
            _ => None,
        }
    }
}

/// SPI clock frequency
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumVariantNames)]
#[repr(u8)]
pub enum FlashFrequency {
    #[strum(serialize = "40m")]
    Flash40M = 0,
    #[strum(serialize = "26m")]
    Flash26M = 1,
    #[strum(serialize = "20m")]
    Flash20M = 2,
    #[strum(serialize = "80m")]
    Flash80M = 0xF,
}

impl FromStr for FlashFrequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let freq = match s {
            "40m" => FlashFrequency::Flash40M,
            "26m" => FlashFrequency::Flash26M,
            "20m" => FlashFrequency::Flash20M,
            "80m" => FlashFrequency::Flash80M,
            _ => return Err(Error::InvalidFlashParams(s.to_string())),
        };

        Ok(freq)
    }
}

impl FlashFrequency {
    fn from_nibble(value: u8) -> Option<Self> {
        match value {
            0 => Some(FlashFrequency::Flash40M),
            1 => Some(FlashFrequency::Flash26M),
            2 => Some(FlashFrequency::Flash20M),
            0xF => Some(FlashFrequency::Flash80M),
            _ => None,
        }
    }
}

/// The two flash parameter bytes as stored in an image header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FlashParams(u16);

impl FlashParams {
    pub const fn new(mode: FlashMode, size: FlashSize, freq: FlashFrequency) -> Self {
        FlashParams(((mode as u16) << 8) | ((size as u16) << 4) | freq as u16)
    }

    /// Rebuild from header bytes 2 and 3.
    pub const fn from_bytes(bytes: [u8; 2]) -> Self {
        FlashParams(u16::from_be_bytes(bytes))
    }

    /// The pair as it is stored in the header: byte 2 then byte 3.
    pub const fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    pub const fn value(self) -> u16 {
        self.0
    }

    /// The mode byte; 2 marks a DIO image.
    pub const fn mode(self) -> u8 {
        (self.0 >> 8) as u8
    }
}

impl FromStr for FlashParams {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        match parts.len() {
            1 => match parse_number(parts[0]) {
                Some(value) => Ok(FlashParams((value & 0xFFFF) as u16)),
                None => Err(Error::InvalidFlashParams(s.to_string())),
            },
            3 => {
                let mode: FlashMode = parts[0].parse()?;
                let size: FlashSize = parts[1].parse()?;
                let freq: FlashFrequency = parts[2].parse()?;
                Ok(FlashParams::new(mode, size, freq))
            }
            _ => Err(Error::InvalidFlashParams(s.to_string())),
        }
    }
}

impl Display for FlashParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = FlashMode::from_nibble(self.mode());
        let size = FlashSize::from_nibble(((self.0 >> 4) & 0xF) as u8);
        let freq = FlashFrequency::from_nibble((self.0 & 0xF) as u8);

        match (mode, size, freq) {
            (Some(mode), Some(size), Some(freq)) => {
                write!(f, "{},{},{}", mode, size, freq)
            }
            _ => write!(f, "{:#06x}", self.0),
        }
    }
}

/// Parse an unsigned number with automatic base detection.
fn parse_number(s: &str) -> Option<u32> {
    let s = s.trim();
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if let Some(oct) = s.strip_prefix("0o") {
        (oct, 8)
    } else if let Some(bin) = s.strip_prefix("0b") {
        (bin, 2)
    } else {
        (s, 10)
    };

    u32::from_str_radix(digits, radix).ok()
}
