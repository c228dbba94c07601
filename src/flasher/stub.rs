//! Flash read-back through a RAM stub
//!
//! The ROM loader has no read command, so reading flash means uploading a
//! small Xtensa routine into RAM and letting it stream the data back. The
//! stub calls the ROM's `SPIRead` for each block, hands the buffer to the
//! ROM's `send_packet` (which SLIP-frames it onto the UART), and finally
//! jumps to the reset vector so the chip reboots into the loader.

use log::debug;

use crate::{
    command::Command,
    connection::Connection,
    error::Error,
    flasher::FLASH_WRITE_SIZE,
};

/// Where the stub is loaded in instruction RAM.
const STUB_LOAD_ADDR: u32 = 0x4010_0000;

/// Entry point: the first instruction after the stub's data words.
const STUB_ENTRY_ADDR: u32 = 0x4010_001C;

/// Sync attempts granted to the chip to come back up after the stub runs.
const REBOOT_SYNC_ATTEMPTS: usize = 5;

/// Xtensa machine code, prefixed at runtime with three little-endian
/// words: read offset, block length, block count.
const READ_FLASH_STUB: [u8; 64] = [
    0x80, 0x3C, 0x00, 0x40, // send_packet
    0x1C, 0x4B, 0x00, 0x40, // SPIRead
    0x80, 0x00, 0x00, 0x40, // reset vector
    0x00, 0x80, 0xFE, 0x3F, // buffer
    0xC1, 0xFB, 0xFF, //       l32r   a12, <blockcount>
    0xD1, 0xF8, 0xFF, //       l32r   a13, <offset>
    0x2D, 0x0D, //       loop: mov.n  a2, a13
    0x31, 0xFD, 0xFF, //       l32r   a3, <buffer>
    0x41, 0xF7, 0xFF, //       l32r   a4, <blocklen>
    0x4A, 0xDD, //             add.n  a13, a13, a4
    0x51, 0xF9, 0xFF, //       l32r   a5, <SPIRead>
    0xC0, 0x05, 0x00, //       callx0 a5
    0x21, 0xF9, 0xFF, //       l32r   a2, <buffer>
    0x31, 0xF3, 0xFF, //       l32r   a3, <blocklen>
    0x41, 0xF5, 0xFF, //       l32r   a4, <send_packet>
    0xC0, 0x04, 0x00, //       callx0 a4
    0x0B, 0xCC, //             addi.n a12, a12, -1
    0x56, 0xEC, 0xFD, //       bnez   a12, loop
    0x61, 0xF4, 0xFF, //       l32r   a6, <reset vector>
    0xA0, 0x06, 0x00, //       jx     a6
    0x00, 0x00, 0x00, //       padding
];

/// Read `len` bytes starting at flash offset `offset`.
///
/// Leaves the device rebooted back into the ROM bootloader; a reset is
/// still required before further bootloader commands.
pub fn read_flash(connection: &mut Connection, offset: u32, len: u32) -> Result<Vec<u8>, Error> {
    debug!("reading {:#x} bytes of flash at {:#x}", len, offset);

    // Wake up the flash controller before the stub touches it.
    connection.command(Command::FlashBegin {
        erase_size: 0,
        blocks: 0,
        block_size: FLASH_WRITE_SIZE as u32,
        offset: 0,
    })?;

    let mut stub = Vec::with_capacity(12 + READ_FLASH_STUB.len());
    stub.extend_from_slice(&offset.to_le_bytes());
    stub.extend_from_slice(&len.to_le_bytes());
    stub.extend_from_slice(&1u32.to_le_bytes());
    stub.extend_from_slice(&READ_FLASH_STUB);

    connection.command(Command::MemBegin {
        total_size: stub.len() as u32,
        blocks: 1,
        block_size: stub.len() as u32,
        load_addr: STUB_LOAD_ADDR,
    })?;

    connection.command(Command::MemData {
        data: &stub,
        pad_to: stub.len(),
        pad_byte: 0xFF,
        sequence: 0,
    })?;

    connection.command(Command::MemEnd {
        no_entry: false,
        entry: STUB_ENTRY_ADDR,
    })?;

    // The stub's output is a bare SLIP frame, not a command response.
    let mut frame = connection.read_frame()?;
    if frame.len() < len as usize {
        return Err(Error::TruncatedRead {
            expected: len as usize,
            got: frame.len(),
        });
    }
    frame.truncate(len as usize);

    connection
        .try_sync(REBOOT_SYNC_ATTEMPTS)
        .map_err(|_| Error::NoRebootAfterRead)?;

    Ok(frame)
}
