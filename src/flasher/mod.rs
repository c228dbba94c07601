//! Write firmware images to a target device
//!
//! The [Flasher] struct owns a keyed set of flash images and drives the
//! ROM bootloader to program them, with per-image retries and progress
//! reporting over a typed event channel. It is designed to run on a
//! dedicated worker thread while a UI thread consumes the events.

use std::{
    collections::BTreeMap,
    fs,
    path::Path,
    sync::{mpsc::Sender, Mutex},
};

use log::{debug, error, info, warn};

use crate::{
    command::Command,
    connection::Connection,
    error::{Error, ResultExt},
    interface::Interface,
    params::{FlashMode, FlashParams},
};

mod compose;
mod stub;

#[cfg(feature = "fs-merge")]
pub use self::compose::FilesystemMerger;
pub use self::stub::read_flash;

/// Host-to-target transfer unit for FLASH_DATA.
pub(crate) const FLASH_WRITE_SIZE: usize = 0x400;
/// Smallest erasable unit of the flash chip.
const FLASH_SECTOR_SIZE: u32 = 0x1000;
/// 4 KiB sectors per 64 KiB erase block.
const FLASH_SECTORS_PER_BLOCK: u32 = 16;

/// First byte of a bootable firmware image.
pub const IMAGE_MAGIC: u8 = 0xE9;
/// Where the device identity block lives.
pub const ID_BLOCK_OFFSET: u32 = 0x10000;
/// Where the filesystem image lives.
pub const FILESYSTEM_OFFSET: u32 = 0x6D000;
/// How much flash the filesystem occupies.
pub const FILESYSTEM_SIZE: u32 = 0x10000;

/// Attempts per image before the whole run is abandoned.
const WRITE_ATTEMPTS: usize = 3;

/// Progress reporting for an observing thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Human-readable description of the current step.
    Status(String),
    /// Total number of blocks written so far in this run.
    Progress(usize),
    /// Terminal outcome of the run.
    Done { message: String, success: bool },
}

/// Flashing policy knobs.
#[derive(Debug, Clone)]
pub struct FlashOptions {
    /// Carry the flash parameter bytes over from the firmware already on
    /// the device.
    pub preserve_flash_params: bool,
    /// Compensate for the ROM erase routine overshooting; see
    /// [fixup_erase_length].
    pub erase_bug_workaround: bool,
    /// Force these flash parameters instead of preserving or trusting the
    /// image.
    pub override_flash_params: Option<FlashParams>,
    /// Merge the bundled filesystem image with the one on the device.
    pub merge_flash_filesystem: bool,
    /// Provision an identity block when the device has none.
    pub generate_id_if_none_found: bool,
    /// Hostname baked into a freshly generated identity.
    pub id_hostname: String,
}

impl Default for FlashOptions {
    fn default() -> Self {
        FlashOptions {
            preserve_flash_params: true,
            erase_bug_workaround: true,
            override_flash_params: None,
            merge_flash_filesystem: false,
            generate_id_if_none_found: true,
            id_hostname: String::new(),
        }
    }
}

struct State {
    images: BTreeMap<u32, Vec<u8>>,
    port: Option<Box<dyn Interface>>,
    written: usize,
}

/// Programs a set of flash images into a target device.
///
/// A single mutex covers the image map, the write counter, and the serial
/// port, so the public operations are serialized; `run` holds the lock for
/// the entire programming pass.
pub struct Flasher {
    state: Mutex<State>,
    options: FlashOptions,
    events: Sender<Event>,
    #[cfg(feature = "fs-merge")]
    fs_merger: Option<Box<dyn FilesystemMerger>>,
}

impl Flasher {
    pub fn new(options: FlashOptions, events: Sender<Event>) -> Self {
        Flasher {
            state: Mutex::new(State {
                images: BTreeMap::new(),
                port: None,
                written: 0,
            }),
            options,
            events,
            #[cfg(feature = "fs-merge")]
            fs_merger: None,
        }
    }

    /// Provide the filesystem collaborator used when
    /// `merge_flash_filesystem` is enabled.
    #[cfg(feature = "fs-merge")]
    pub fn with_filesystem_merger(mut self, merger: Box<dyn FilesystemMerger>) -> Self {
        self.fs_merger = Some(merger);
        self
    }

    /// Load the image set from a directory of `0x*.bin` files, each named
    /// by its flash offset.
    pub fn load(&self, path: &Path) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.images.clear();

        if !path.is_dir() {
            return Err(Error::ImageDirectoryNotFound(path.to_path_buf()));
        }

        let mut images = BTreeMap::new();
        for entry in fs::read_dir(path).map_err(|source| Error::ImageRead {
            file: path.to_path_buf(),
            source,
        })? {
            let entry = entry.map_err(|source| Error::ImageRead {
                file: path.to_path_buf(),
                source,
            })?;
            if !entry.file_type().map(|ty| ty.is_file()).unwrap_or(false) {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let stem = match name.strip_suffix(".bin").and_then(|s| s.strip_prefix("0x")) {
                Some(stem) => stem,
                None => continue,
            };

            debug!("loading {}", name);
            let offset = u32::from_str_radix(stem, 16)
                .map_err(|_| Error::InvalidImageName(name.clone()))?;

            let bytes = fs::read(entry.path()).map_err(|source| Error::ImageRead {
                file: entry.path(),
                source,
            })?;

            if images.insert(offset, bytes).is_some() {
                return Err(Error::DuplicateImageOffset { offset, file: name });
            }
        }

        if images.is_empty() {
            return Err(Error::NoImages(path.to_path_buf()));
        }

        state.images = images;
        Ok(())
    }

    /// Hand the flasher the serial line it will program over.
    pub fn set_port(&self, port: Box<dyn Interface>) {
        self.state.lock().unwrap().port = Some(port);
    }

    /// Total number of FLASH_DATA blocks a run will transfer.
    pub fn total_blocks(&self) -> usize {
        let state = self.state.lock().unwrap();
        state
            .images
            .values()
            .map(|bytes| (bytes.len() + FLASH_WRITE_SIZE - 1) / FLASH_WRITE_SIZE)
            .sum()
    }

    /// Execute the whole programming pass.
    ///
    /// Every outcome, success or failure, is reported through a terminal
    /// [Event::Done]. Intended to run on a worker thread.
    pub fn run(&self) {
        let mut state = self.state.lock().unwrap();

        match self.run_locked(&mut state) {
            Ok(()) => {
                info!("flashing finished");
                self.emit(Event::Done {
                    message: "All done!".into(),
                    success: true,
                });
            }
            Err(err) => {
                error!("flashing failed: {:?}", err);
                self.emit(Event::Done {
                    message: error_message(&err),
                    success: false,
                });
            }
        }
    }

    fn run_locked(&self, state: &mut State) -> Result<(), Error> {
        let State {
            images,
            port,
            written,
        } = state;
        let port = port.as_mut().ok_or(Error::NoPort)?;

        let mut connection = Connection::new(port.as_mut());
        connection.reboot_into_bootloader()?;

        let params = match self.options.override_flash_params {
            Some(params) => Some(params),
            None if self.options.preserve_flash_params => {
                let params = compose::read_flash_params(&mut connection)
                    .map_err(|err| Error::FlashParams(Box::new(err)))?;
                warn!("current flash params: {}", params);
                Some(params)
            }
            None => None,
        };
        let params = compose::apply_flash_params(images, params);

        #[cfg(feature = "fs-merge")]
        if self.options.merge_flash_filesystem {
            match self.fs_merger.as_deref() {
                Some(merger) => compose::merge_filesystem(&mut connection, images, merger)?,
                None => warn!("filesystem merge requested but no merger was provided"),
            }
        }
        #[cfg(not(feature = "fs-merge"))]
        if self.options.merge_flash_filesystem {
            warn!("filesystem merge requested but support is not compiled in");
        }

        if self.options.generate_id_if_none_found {
            compose::ensure_identity_block(&mut connection, images, &self.options.id_hostname)?;
        }

        *written = 0;
        for (addr, image) in images.iter() {
            let addr = *addr;
            let before = *written;
            let mut success = false;

            for attempts_left in (0..WRITE_ATTEMPTS).rev() {
                match self.write_image(&mut connection, addr, image, written) {
                    Ok(()) => {
                        success = true;
                        break;
                    }
                    Err(err) => {
                        warn!(
                            "failed to write image at {:#x}: {:?}, {} attempts left",
                            addr, err, attempts_left
                        );
                        *written = before;
                        self.emit(Event::Progress(*written));
                        if connection.reboot_into_bootloader().is_err() {
                            break;
                        }
                    }
                }
            }

            if !success {
                return Err(Error::WriteFailed { addr });
            }
        }

        match params {
            Some(params) if params.mode() == FlashMode::Dio as u8 => {
                // A DIO-mode ROM leaves the flash read-only after
                // FLASH_END, so reset through the modem lines instead.
                debug!("DIO image, rebooting via the serial lines");
                connection.reboot_into_firmware()?;
            }
            _ => self.leave_flash_mode(&mut connection)?,
        }

        Ok(())
    }

    /// Write one image, erasing first. Emits a progress tick per block.
    fn write_image(
        &self,
        connection: &mut Connection,
        addr: u32,
        data: &[u8],
        written: &mut usize,
    ) -> Result<(), Error> {
        let blocks = (data.len() + FLASH_WRITE_SIZE - 1) / FLASH_WRITE_SIZE;
        debug!("writing {} blocks at {:#x}", blocks, addr);

        let erase_size = if self.options.erase_bug_workaround {
            fixup_erase_length(addr, (blocks * FLASH_WRITE_SIZE) as u32)
        } else {
            (blocks * FLASH_WRITE_SIZE) as u32
        };

        self.emit(Event::Status(format!("Erasing flash at {:#x}...", addr)));
        connection
            .command(Command::FlashBegin {
                erase_size,
                blocks: blocks as u32,
                block_size: FLASH_WRITE_SIZE as u32,
                offset: addr,
            })
            .flashing()?;

        for (sequence, block) in data.chunks(FLASH_WRITE_SIZE).enumerate() {
            debug!("writing block {}@{:#x}", sequence, addr);
            connection
                .command(Command::FlashData {
                    data: block,
                    pad_to: FLASH_WRITE_SIZE,
                    pad_byte: 0xFF,
                    sequence: sequence as u32,
                })
                .flashing()?;

            *written += 1;
            self.emit(Event::Progress(*written));
        }

        Ok(())
    }

    fn leave_flash_mode(&self, connection: &mut Connection) -> Result<(), Error> {
        match connection.command(Command::FlashEnd { reboot: false }) {
            Ok(_) => Ok(()),
            Err(err) if self.options.erase_bug_workaround => {
                // The loader regularly reports a failure here after a
                // fixed-up erase; esptool ignores it as well.
                debug!("ignoring FLASH_END failure: {:?}", err);
                Ok(())
            }
            Err(err) => Err(Error::LeaveFlashMode(Box::new(err))),
        }
    }

    fn emit(&self, event: Event) {
        // A dropped receiver only means nobody is watching.
        let _ = self.events.send(event);
    }
}

/// Compensate for the overshoot in the ROM's `SPIEraseArea`.
///
/// The ROM erases sector by sector up to the next 64 KiB block boundary
/// and then forgets to subtract those head sectors from the remaining
/// count. With `t` sectors to the boundary, asking for `x` sectors erases
/// `2x` of them when `x <= t` and `x + t` otherwise. Requesting half the
/// length (rounded up) in the first regime and `len - t` sectors in the
/// second makes the ROM erase exactly the sectors asked for, except that
/// an odd sector count up to `2t` erases a single extra sector.
pub(crate) fn fixup_erase_length(start: u32, len: u32) -> u32 {
    let start_sector = start / FLASH_SECTOR_SIZE;
    let tail = FLASH_SECTORS_PER_BLOCK - start_sector % FLASH_SECTORS_PER_BLOCK;

    let mut sectors = len / FLASH_SECTOR_SIZE;
    if len % FLASH_SECTOR_SIZE != 0 {
        sectors += 1;
    }

    if sectors <= 2 * tail {
        len / 2 + len % 2
    } else {
        len - tail * FLASH_SECTOR_SIZE
    }
}

fn error_message(err: &Error) -> String {
    use std::error::Error as _;

    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::testutil::MockInterface;

    fn options() -> FlashOptions {
        FlashOptions {
            preserve_flash_params: false,
            erase_bug_workaround: true,
            override_flash_params: None,
            merge_flash_filesystem: false,
            generate_id_if_none_found: false,
            id_hostname: String::new(),
        }
    }

    fn flasher_with_images(
        options: FlashOptions,
        images: &[(u32, Vec<u8>)],
    ) -> (Flasher, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let flasher = Flasher::new(options, tx);
        {
            let mut state = flasher.state.lock().unwrap();
            for (offset, bytes) in images {
                state.images.insert(*offset, bytes.clone());
            }
        }
        (flasher, rx)
    }

    fn le_word(frame: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(frame[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn erase_fixup_halves_short_requests() {
        assert_eq!(fixup_erase_length(0, 0x400), 0x200);
        assert_eq!(fixup_erase_length(0, 0), 0);
    }

    #[test]
    fn erase_fixup_matches_the_rom_erase_behavior() {
        // What the ROM actually erases for a requested byte length.
        fn erased_sectors(request: u32, tail: u32) -> u32 {
            let requested = (request + FLASH_SECTOR_SIZE - 1) / FLASH_SECTOR_SIZE;
            if requested <= tail {
                2 * requested
            } else {
                requested + tail
            }
        }

        for start_sector in [0u32, 1, 5, 15, 16, 27, 109] {
            let start = start_sector * FLASH_SECTOR_SIZE;
            let tail = FLASH_SECTORS_PER_BLOCK - start_sector % FLASH_SECTORS_PER_BLOCK;

            for len in [
                1u32, 0x200, 0x400, 0x1000, 0x1001, 0x2000, 0x3000, 0x8000, 0x10000, 0x20000,
                0x23456,
            ] {
                let sectors = (len + FLASH_SECTOR_SIZE - 1) / FLASH_SECTOR_SIZE;
                let erased = erased_sectors(fixup_erase_length(start, len), tail);
                let expected = if sectors % 2 == 1 && sectors <= 2 * tail {
                    sectors + 1
                } else {
                    sectors
                };
                assert_eq!(
                    erased, expected,
                    "start {:#x} len {:#x}",
                    start, len
                );
            }
        }
    }

    #[test]
    fn total_blocks_rounds_partial_blocks_up() {
        let (flasher, _rx) = flasher_with_images(
            options(),
            &[
                (0x0, vec![0u8; 0x400]),
                (0x1000, vec![0u8; 0x401]),
                (0x2000, vec![0u8; 1]),
            ],
        );

        assert_eq!(flasher.total_blocks(), 4);
    }

    #[test]
    fn small_image_write_requests_fixed_up_erase() {
        let mock = MockInterface::new();
        mock.push_sync_burst();
        mock.push_ok(0x02); // flash begin
        mock.push_ok(0x03); // flash data
        mock.push_ok(0x04); // flash end

        let (flasher, rx) =
            flasher_with_images(options(), &[(0, vec![0xE9, 0x00, 0x00, 0x00])]);
        flasher.set_port(Box::new(mock.clone()));
        flasher.run();

        let frames = mock.written_frames();
        assert_eq!(frames.len(), 4);

        // sync, then flash begin with the compensated erase length
        assert_eq!(frames[0][1], 0x08);
        let begin = &frames[1];
        assert_eq!(begin[1], 0x02);
        assert_eq!(le_word(begin, 8), 0x200); // erase_size
        assert_eq!(le_word(begin, 12), 1); // blocks
        assert_eq!(le_word(begin, 16), 0x400); // block_size
        assert_eq!(le_word(begin, 20), 0); // offset

        // one data block, tail-padded with 0xFF
        let data = &frames[2];
        assert_eq!(data[1], 0x03);
        assert_eq!(le_word(data, 8), 0x400);
        assert_eq!(le_word(data, 12), 0); // sequence
        assert_eq!(&data[24..28], &[0xE9, 0x00, 0x00, 0x00]);
        assert!(data[28..].iter().all(|byte| *byte == 0xFF));
        assert_eq!(data.len(), 24 + 0x400);

        // flash end with the stay-in-loader flag
        let end = &frames[3];
        assert_eq!(end[1], 0x04);
        assert_eq!(le_word(end, 8), 1);

        let events: Vec<Event> = rx.try_iter().collect();
        assert!(matches!(
            events.last(),
            Some(Event::Done { success: true, .. })
        ));
        assert!(events.contains(&Event::Progress(1)));
    }

    #[test]
    fn failed_block_rewinds_progress_and_retries() {
        let mock = MockInterface::new();
        mock.push_sync_burst();
        mock.push_ok(0x02);
        mock.push_ok(0x03); // first block fine
        mock.push_response(0x03, 0, &[0x01, 0x06]); // second block fails
        mock.push_sync_burst(); // reboot before the retry
        mock.push_ok(0x02);
        mock.push_ok(0x03);
        mock.push_ok(0x03); // retry succeeds
        mock.push_ok(0x04);

        let (flasher, rx) = flasher_with_images(options(), &[(0, vec![0xAB; 0x500])]);
        flasher.set_port(Box::new(mock.clone()));
        flasher.run();

        let progress: Vec<usize> = rx
            .try_iter()
            .filter_map(|event| match event {
                Event::Progress(count) => Some(count),
                _ => None,
            })
            .collect();

        // one block in, rewound to zero, then the full image again
        assert_eq!(progress, vec![1, 0, 1, 2]);
    }

    #[test]
    fn images_are_programmed_in_ascending_address_order() {
        let mock = MockInterface::new();
        mock.push_sync_burst();
        for _ in 0..2 {
            mock.push_ok(0x02);
            mock.push_ok(0x03);
        }
        mock.push_ok(0x04);

        let (flasher, rx) = flasher_with_images(
            options(),
            &[(0x6D000, vec![0xBB; 4]), (0x0, vec![0xAA; 4])],
        );
        flasher.set_port(Box::new(mock.clone()));
        flasher.run();

        let offsets: Vec<u32> = mock
            .written_frames()
            .iter()
            .filter(|frame| frame[1] == 0x02)
            .map(|frame| le_word(frame, 20))
            .collect();
        assert_eq!(offsets, vec![0x0, 0x6D000]);

        let events: Vec<Event> = rx.try_iter().collect();
        assert!(matches!(
            events.last(),
            Some(Event::Done { success: true, .. })
        ));
    }

    #[test]
    fn image_that_keeps_failing_fails_the_run() {
        let mock = MockInterface::new();
        mock.push_sync_burst();
        for _ in 0..WRITE_ATTEMPTS {
            mock.push_response(0x02, 0, &[0x01, 0x06]); // erase fails
            mock.push_sync_burst();
        }

        let (flasher, rx) = flasher_with_images(options(), &[(0, vec![0xAB; 4])]);
        flasher.set_port(Box::new(mock.clone()));
        flasher.run();

        let events: Vec<Event> = rx.try_iter().collect();
        match events.last() {
            Some(Event::Done { message, success }) => {
                assert!(!success);
                assert!(message.contains("failed to flash image at 0x0"));
            }
            other => panic!("expected a done event, got {:?}", other),
        }
    }

    #[test]
    fn dio_image_reboots_via_modem_lines_instead_of_flash_end() {
        let mock = MockInterface::new();
        mock.push_sync_burst();
        mock.push_ok(0x02);
        mock.push_ok(0x03);
        // no FLASH_END response: none is expected

        let (flasher, rx) =
            flasher_with_images(options(), &[(0, vec![0xE9, 0x04, 0x02, 0x20])]);
        flasher.set_port(Box::new(mock.clone()));
        flasher.run();

        let events: Vec<Event> = rx.try_iter().collect();
        assert!(matches!(
            events.last(),
            Some(Event::Done { success: true, .. })
        ));

        // no FLASH_END was sent
        assert!(mock.written_frames().iter().all(|frame| frame[1] != 0x04));

        // two reset sequences: into the bootloader, then into firmware
        assert_eq!(mock.rts_history(), vec![true, false, true, false]);
        assert_eq!(mock.dtr_history(), vec![false, true, false, false]);
    }

    #[test]
    fn preserved_params_are_stamped_into_the_boot_image() {
        let mock = MockInterface::new();
        mock.push_sync_burst();
        // read-back of the existing header via the RAM stub
        mock.push_ok(0x02);
        mock.push_ok(0x05);
        mock.push_ok(0x07);
        mock.push_ok(0x06);
        mock.push_frame(&[0xE9, 0x04, 0x00, 0x21]);
        mock.push_sync_burst();
        // programming pass
        mock.push_ok(0x02);
        mock.push_ok(0x03);
        mock.push_ok(0x04);

        let mut opts = options();
        opts.preserve_flash_params = true;

        let (flasher, rx) =
            flasher_with_images(opts, &[(0, vec![0xE9, 0x04, 0xFF, 0xFF])]);
        flasher.set_port(Box::new(mock.clone()));
        flasher.run();

        let events: Vec<Event> = rx.try_iter().collect();
        assert!(matches!(
            events.last(),
            Some(Event::Done { success: true, .. })
        ));

        let frames = mock.written_frames();
        let data = frames
            .iter()
            .find(|frame| frame[1] == 0x03 && le_word(frame, 8) == 0x400)
            .expect("flash data frame");
        assert_eq!(&data[24..28], &[0xE9, 0x04, 0x00, 0x21]);
    }

    #[test]
    fn failed_params_read_aborts_before_programming() {
        let mock = MockInterface::new();
        mock.push_sync_burst();
        // the read-back stub never gets a response
        let mut opts = options();
        opts.preserve_flash_params = true;

        let (flasher, rx) = flasher_with_images(opts, &[(0, vec![0xE9, 0x04, 0xFF, 0xFF])]);
        flasher.set_port(Box::new(mock.clone()));
        flasher.run();

        let events: Vec<Event> = rx.try_iter().collect();
        match events.last() {
            Some(Event::Done { message, success }) => {
                assert!(!success);
                assert!(message.contains("failed to read flash params"));
            }
            other => panic!("expected a done event, got {:?}", other),
        }

        // nothing was programmed
        assert!(mock.written_frames().iter().all(|frame| frame[1] != 0x03));
    }

    #[test]
    fn run_without_a_port_reports_failure() {
        let (flasher, rx) = flasher_with_images(options(), &[(0, vec![0xAB; 4])]);
        flasher.run();

        let events: Vec<Event> = rx.try_iter().collect();
        assert!(matches!(
            events.last(),
            Some(Event::Done { success: false, .. })
        ));
    }

    mod load {
        use std::{env, fs, path::PathBuf};

        use super::*;

        struct TempDir(PathBuf);

        impl TempDir {
            fn new(tag: &str) -> Self {
                let path = env::temp_dir().join(format!(
                    "esp8266flash-{}-{}",
                    tag,
                    std::process::id()
                ));
                fs::create_dir_all(&path).unwrap();
                TempDir(path)
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = fs::remove_dir_all(&self.0);
            }
        }

        #[test]
        fn loads_images_keyed_by_offset() {
            let dir = TempDir::new("load");
            fs::write(dir.0.join("0x00000.bin"), [1, 2, 3]).unwrap();
            fs::write(dir.0.join("0x10000.bin"), [4]).unwrap();
            fs::write(dir.0.join("notes.txt"), "ignored").unwrap();

            let (flasher, _rx) = flasher_with_images(options(), &[]);
            flasher.load(&dir.0).unwrap();

            let state = flasher.state.lock().unwrap();
            assert_eq!(state.images.len(), 2);
            assert_eq!(state.images[&0], vec![1, 2, 3]);
            assert_eq!(state.images[&0x10000], vec![4]);
        }

        #[test]
        fn missing_directory_is_rejected() {
            let (flasher, _rx) = flasher_with_images(options(), &[]);
            assert!(matches!(
                flasher.load(Path::new("/nonexistent/esp8266flash")),
                Err(Error::ImageDirectoryNotFound(_))
            ));
        }

        #[test]
        fn directory_without_images_is_rejected() {
            let dir = TempDir::new("empty");
            fs::write(dir.0.join("readme.md"), "nothing here").unwrap();

            let (flasher, _rx) = flasher_with_images(options(), &[]);
            assert!(matches!(
                flasher.load(&dir.0),
                Err(Error::NoImages(_))
            ));
        }

        #[test]
        fn unparseable_offset_is_rejected() {
            let dir = TempDir::new("badname");
            fs::write(dir.0.join("0xnope.bin"), [1]).unwrap();

            let (flasher, _rx) = flasher_with_images(options(), &[]);
            assert!(matches!(
                flasher.load(&dir.0),
                Err(Error::InvalidImageName(_))
            ));
        }

        #[test]
        fn duplicate_offsets_are_rejected() {
            let dir = TempDir::new("dup");
            fs::write(dir.0.join("0x10.bin"), [1]).unwrap();
            fs::write(dir.0.join("0x010.bin"), [2]).unwrap();

            let (flasher, _rx) = flasher_with_images(options(), &[]);
            assert!(matches!(
                flasher.load(&dir.0),
                Err(Error::DuplicateImageOffset { offset: 0x10, .. })
            ));
        }
    }
}
