//! A library and application for flashing ESP8266 devices over serial
//!
//! The flashing engine reboots the chip into its mask-ROM bootloader by
//! toggling the modem control lines, establishes the SLIP-framed command
//! protocol, and programs a directory of firmware images into SPI flash.
//! On the way it can preserve the flash parameter bytes of the firmware
//! already on the device and provision a device identity block, both of
//! which rely on a small code stub executed from the target's RAM.
//!
//! ## As a library
//!
//! ```toml
//! esp8266flash = { version = "0.3", default-features = false }
//! ```
//!
//! The entry points are [flasher::Flasher] for programming, [probe::probe]
//! for device detection, and [flasher::read_flash] for raw read-back.

pub mod command;
pub mod connection;
pub mod error;
pub mod flasher;
pub mod idblock;
pub mod interface;
pub mod params;
pub mod probe;
pub mod slip;

#[cfg(test)]
pub(crate) mod testutil;

pub use self::error::Error;

/// Logging utilities
pub mod logging {
    use env_logger::Env;
    use log::LevelFilter;

    /// Initialize the logger with the given [LevelFilter]
    pub fn initialize_logger(filter: LevelFilter) {
        env_logger::Builder::from_env(Env::default().default_filter_or(filter.as_str()))
            .format_target(false)
            .init();
    }
}
