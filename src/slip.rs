//! SLIP framing (RFC 1055)
//!
//! The bootloader wraps every command and response in a SLIP frame:
//! delimiter 0xC0, with interior 0xC0 escaped as 0xDB 0xDC and interior
//! 0xDB escaped as 0xDB 0xDD.

use std::io::{self, ErrorKind, Read, Write};

use log::debug;

const END: u8 = 0xC0;
const ESC: u8 = 0xDB;
const ESC_END: u8 = 0xDC;
const ESC_ESC: u8 = 0xDD;

/// Writes a SLIP frame around everything written through it.
///
/// `new` emits the opening delimiter, `finish` the closing one.
pub struct SlipEncoder<'a, W: Write> {
    writer: &'a mut W,
    len: usize,
}

impl<'a, W: Write> SlipEncoder<'a, W> {
    /// Creates a new encoder context
    pub fn new(writer: &'a mut W) -> io::Result<Self> {
        let len = writer.write(&[END])?;
        Ok(Self { writer, len })
    }

    pub fn finish(mut self) -> io::Result<usize> {
        self.len += self.writer.write(&[END])?;
        Ok(self.len)
    }
}

impl<W: Write> Write for SlipEncoder<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for value in buf.iter() {
            match *value {
                END => {
                    self.len += self.writer.write(&[ESC, ESC_END])?;
                }
                ESC => {
                    self.len += self.writer.write(&[ESC, ESC_ESC])?;
                }
                _ => {
                    self.len += self.writer.write(&[*value])?;
                }
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Encode `payload` as a single SLIP frame.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(END);
    for value in payload {
        match *value {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            value => out.push(value),
        }
    }
    out.push(END);
    out
}

/// Read one SLIP frame from `reader`.
///
/// Skips input until an opening delimiter is seen, then accumulates until
/// the closing delimiter. An unrecognized byte after an escape aborts the
/// frame and yields what has been accumulated so far, as does a read
/// timeout or the end of the stream (so the result may be empty or short;
/// callers are expected to validate the length).
pub fn read_frame<R: Read + ?Sized>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut frame = Vec::new();

    loop {
        match read_byte(reader)? {
            Some(END) => break,
            Some(_) => continue,
            None => return Ok(frame),
        }
    }

    loop {
        let value = match read_byte(reader)? {
            Some(value) => value,
            None => return Ok(frame),
        };

        match value {
            END => return Ok(frame),
            ESC => match read_byte(reader)? {
                Some(ESC_END) => frame.push(END),
                Some(ESC_ESC) => frame.push(ESC),
                Some(other) => {
                    debug!("invalid escape sequence: {:#04x}", other);
                    return Ok(frame);
                }
                None => return Ok(frame),
            },
            value => frame.push(value),
        }
    }
}

/// Read a single byte; `None` when the read deadline expires or the stream
/// ends.
fn read_byte<R: Read + ?Sized>(reader: &mut R) -> io::Result<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(err) if err.kind() == ErrorKind::TimedOut => return Ok(None),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}
