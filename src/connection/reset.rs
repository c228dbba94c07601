//! Modem-line reset sequencing
//!
//! Wiring follows the esptool convention: RTS drives RESET and DTR drives
//! GPIO0, both inverted by the level shifter on the adapter, so asserting
//! a line at the host pulls the target pin low.

use std::{thread::sleep, time::Duration};

use log::debug;

use crate::{error::Error, interface::Interface};

/// How long RESET is held and how long GPIO0 is kept low afterwards.
const RESET_HOLD_DELAY: Duration = Duration::from_millis(50);

/// Reset the target with GPIO0 held low so the ROM bootloader comes up.
pub fn enter_bootloader(interface: &mut dyn Interface) -> Result<(), Error> {
    debug!("resetting target into the ROM bootloader");

    interface.set_dtr(false)?;
    interface.set_rts(true)?; // RESET low

    sleep(RESET_HOLD_DELAY);

    interface.set_dtr(true)?; // GPIO0 low
    interface.set_rts(false)?; // RESET released

    sleep(RESET_HOLD_DELAY);

    interface.set_dtr(false)?; // GPIO0 released

    Ok(())
}

/// Reset the target with GPIO0 released so the flashed firmware boots.
pub fn enter_firmware(interface: &mut dyn Interface) -> Result<(), Error> {
    debug!("resetting target into firmware");

    interface.set_dtr(false)?;
    interface.set_rts(true)?; // RESET low

    sleep(RESET_HOLD_DELAY);

    interface.set_rts(false)?; // RESET released

    Ok(())
}
