//! A scripted serial peer for exercising the session layers without
//! hardware. Bytes pushed into the receive queue play the role of future
//! device responses; everything the host writes is captured for
//! inspection. Clones share the same state, so a clone kept outside the
//! flasher can inspect traffic after the original was handed over.

use std::{
    collections::VecDeque,
    io::{self, Cursor, Read, Write},
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::{interface::Interface, slip};

#[derive(Default)]
struct MockState {
    rx: VecDeque<u8>,
    written: Vec<u8>,
    dtr: Vec<bool>,
    rts: Vec<bool>,
}

#[derive(Clone)]
pub(crate) struct MockInterface {
    state: Arc<Mutex<MockState>>,
    timeout: Duration,
}

impl MockInterface {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            timeout: Duration::from_millis(200),
        }
    }

    /// Queue a raw SLIP frame with the given payload.
    pub fn push_frame(&self, payload: &[u8]) {
        self.state.lock().unwrap().rx.extend(slip::encode(payload));
    }

    /// Queue a well-formed response frame.
    pub fn push_response(&self, command: u8, value: u32, body: &[u8]) {
        let mut payload = vec![1, command];
        payload.extend((body.len() as u16).to_le_bytes());
        payload.extend(value.to_le_bytes());
        payload.extend(body);
        self.push_frame(&payload);
    }

    /// Queue a success response for `command`.
    pub fn push_ok(&self, command: u8) {
        self.push_response(command, 0, &[0, 0]);
    }

    /// Queue the full conversation of one sync attempt.
    pub fn push_sync_burst(&self) {
        for _ in 0..8 {
            self.push_ok(0x08);
        }
    }

    /// Everything the host wrote, split back into SLIP frame payloads.
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let mut cursor = Cursor::new(state.written.as_slice());
        let mut frames = Vec::new();
        loop {
            let frame = slip::read_frame(&mut cursor).unwrap();
            if frame.is_empty() {
                break;
            }
            frames.push(frame);
        }
        frames
    }

    /// Recorded DTR transitions.
    pub fn dtr_history(&self) -> Vec<bool> {
        self.state.lock().unwrap().dtr.clone()
    }

    /// Recorded RTS transitions.
    pub fn rts_history(&self) -> Vec<bool> {
        self.state.lock().unwrap().rts.clone()
    }
}

impl Read for MockInterface {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.state.lock().unwrap().rx.pop_front() {
            Some(byte) => {
                buf[0] = byte;
                Ok(1)
            }
            None => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "scripted input exhausted",
            )),
        }
    }
}

impl Write for MockInterface {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state.lock().unwrap().written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Interface for MockInterface {
    fn set_timeout(&mut self, timeout: Duration) -> serialport::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_dtr(&mut self, level: bool) -> serialport::Result<()> {
        self.state.lock().unwrap().dtr.push(level);
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> serialport::Result<()> {
        self.state.lock().unwrap().rts.push(level);
        Ok(())
    }

    fn clear_input(&mut self) -> serialport::Result<()> {
        // Queued bytes model traffic the device has not sent yet, so there
        // is nothing to discard.
        Ok(())
    }
}
