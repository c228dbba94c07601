//! Bootloader command packets
//!
//! Every command is an 8-byte header followed by a payload: direction (0
//! for host to target), command byte, little-endian payload length, and a
//! 32-bit field that carries the payload checksum for the data commands
//! and zero otherwise. The whole packet is SLIP-framed as a unit.

use std::{io::Write, mem::size_of, time::Duration};

use bytemuck::{bytes_of, Pod, Zeroable};
use strum_macros::Display;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);
const FLASH_BEGIN_TIMEOUT: Duration = Duration::from_secs(30);
const FLASH_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Seed for the XOR payload checksum.
pub const CHECKSUM_INIT: u8 = 0xEF;

/// XOR all bytes of `data` into `checksum`.
pub fn checksum(data: &[u8], mut checksum: u8) -> u8 {
    for byte in data {
        checksum ^= *byte;
    }

    checksum
}

/// Operations understood by the ESP8266 ROM loader.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
#[repr(u8)]
#[non_exhaustive]
pub enum CommandType {
    FlashBegin = 0x02,
    FlashData = 0x03,
    FlashEnd = 0x04,
    MemBegin = 0x05,
    MemEnd = 0x06,
    MemData = 0x07,
    Sync = 0x08,
    ReadReg = 0x0A,
}

impl CommandType {
    /// How long to wait for the response to this command.
    ///
    /// Erasing before a flash write can take tens of seconds; everything
    /// else answers quickly.
    pub fn timeout(&self) -> Duration {
        match self {
            CommandType::FlashBegin => FLASH_BEGIN_TIMEOUT,
            CommandType::FlashData | CommandType::FlashEnd => FLASH_WRITE_TIMEOUT,
            _ => DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Copy, Clone, Debug)]
#[non_exhaustive]
pub enum Command<'a> {
    FlashBegin {
        erase_size: u32,
        blocks: u32,
        block_size: u32,
        offset: u32,
    },
    FlashData {
        data: &'a [u8],
        pad_to: usize,
        pad_byte: u8,
        sequence: u32,
    },
    FlashEnd {
        reboot: bool,
    },
    MemBegin {
        total_size: u32,
        blocks: u32,
        block_size: u32,
        load_addr: u32,
    },
    MemData {
        data: &'a [u8],
        pad_to: usize,
        pad_byte: u8,
        sequence: u32,
    },
    MemEnd {
        no_entry: bool,
        entry: u32,
    },
    Sync,
    ReadReg {
        address: u32,
    },
}

impl Command<'_> {
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::FlashBegin { .. } => CommandType::FlashBegin,
            Command::FlashData { .. } => CommandType::FlashData,
            Command::FlashEnd { .. } => CommandType::FlashEnd,
            Command::MemBegin { .. } => CommandType::MemBegin,
            Command::MemData { .. } => CommandType::MemData,
            Command::MemEnd { .. } => CommandType::MemEnd,
            Command::Sync => CommandType::Sync,
            Command::ReadReg { .. } => CommandType::ReadReg,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.command_type().timeout()
    }

    pub fn write<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_all(&[0, self.command_type() as u8])?;
        match *self {
            Command::FlashBegin {
                erase_size,
                blocks,
                block_size,
                offset,
            } => {
                begin_command(writer, erase_size, blocks, block_size, offset)?;
            }
            Command::FlashData {
                data,
                pad_to,
                pad_byte,
                sequence,
            } => {
                data_command(writer, data, pad_to, pad_byte, sequence)?;
            }
            Command::FlashEnd { reboot } => {
                let flag: u32 = if reboot { 0 } else { 1 };
                write_basic(writer, &flag.to_le_bytes(), 0)?;
            }
            Command::MemBegin {
                total_size,
                blocks,
                block_size,
                load_addr,
            } => {
                begin_command(writer, total_size, blocks, block_size, load_addr)?;
            }
            Command::MemData {
                data,
                pad_to,
                pad_byte,
                sequence,
            } => {
                data_command(writer, data, pad_to, pad_byte, sequence)?;
            }
            Command::MemEnd { no_entry, entry } => {
                #[derive(Zeroable, Pod, Copy, Clone)]
                #[repr(C)]
                struct EntryParams {
                    no_entry: u32,
                    entry: u32,
                }
                let params = EntryParams {
                    no_entry: if no_entry { 1 } else { 0 },
                    entry,
                };
                write_basic(writer, bytes_of(&params), 0)?;
            }
            Command::Sync => {
                write_basic(
                    writer,
                    &[
                        0x07, 0x07, 0x12, 0x20, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55,
                        0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55,
                        0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55,
                    ],
                    0,
                )?;
            }
            Command::ReadReg { address } => {
                write_basic(writer, &address.to_le_bytes(), 0)?;
            }
        };
        Ok(())
    }
}

fn write_basic<W: Write>(mut writer: W, data: &[u8], checksum: u32) -> std::io::Result<()> {
    writer.write_all(&((data.len() as u16).to_le_bytes()))?;
    writer.write_all(&(checksum.to_le_bytes()))?;
    writer.write_all(data)?;
    Ok(())
}

/// FLASH_BEGIN and MEM_BEGIN share the same four-word payload layout.
fn begin_command<W: Write>(
    writer: W,
    size: u32,
    blocks: u32,
    block_size: u32,
    offset: u32,
) -> std::io::Result<()> {
    #[derive(Zeroable, Pod, Copy, Clone, Debug)]
    #[repr(C)]
    struct BeginParams {
        size: u32,
        blocks: u32,
        block_size: u32,
        offset: u32,
    }
    let params = BeginParams {
        size,
        blocks,
        block_size,
        offset,
    };

    write_basic(writer, bytes_of(&params), 0)
}

fn data_command<W: Write>(
    mut writer: W,
    block_data: &[u8],
    pad_to: usize,
    pad_byte: u8,
    sequence: u32,
) -> std::io::Result<()> {
    #[derive(Zeroable, Pod, Copy, Clone, Debug)]
    #[repr(C)]
    struct BlockParams {
        size: u32,
        sequence: u32,
        dummy1: u32,
        dummy2: u32,
    }

    let pad_length = pad_to.saturating_sub(block_data.len());

    let params = BlockParams {
        size: (block_data.len() + pad_length) as u32,
        sequence,
        dummy1: 0,
        dummy2: 0,
    };

    let mut check = checksum(block_data, CHECKSUM_INIT);

    for _ in 0..pad_length {
        check = checksum(&[pad_byte], check);
    }

    let total_length = size_of::<BlockParams>() + block_data.len() + pad_length;
    writer.write_all(&((total_length as u16).to_le_bytes()))?;
    writer.write_all(&((check as u32).to_le_bytes()))?;
    writer.write_all(bytes_of(&params))?;
    writer.write_all(block_data)?;
    for _ in 0..pad_length {
        writer.write_all(&[pad_byte])?;
    }
    Ok(())
}
