//! Device probing
//!
//! Answers "is there an ESP8266 on this port?" by resetting into the ROM
//! bootloader and reading the MAC address out of the efuse registers.

use std::fmt::{self, Display, Formatter};

use log::debug;

use crate::{
    connection::Connection,
    error::Error,
    interface::{Interface, SerialInterface},
};

const EFUSE_MAC0_REG: u32 = 0x3FF0_0050;
const EFUSE_MAC1_REG: u32 = 0x3FF0_0054;

/// A station MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Assemble the MAC from the two efuse words.
    ///
    /// Byte 2 of the second word selects the vendor prefix; the remaining
    /// three bytes come out of the words in reverse order.
    pub fn from_efuse(mac1: u32, mac2: u32) -> Result<Self, Error> {
        let mac1 = mac1.to_le_bytes();
        let mac2 = mac2.to_le_bytes();

        let oui: [u8; 3] = match mac2[2] {
            0 => [0x18, 0xFE, 0x34],
            1 => [0xAC, 0xD0, 0x74],
            other => return Err(Error::UnknownOui(other)),
        };

        Ok(MacAddr([
            oui[0], oui[1], oui[2], mac2[1], mac2[0], mac1[3],
        ]))
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl Display for MacAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

/// Read the MAC address of a device already synced in the bootloader.
pub fn read_mac(connection: &mut Connection) -> Result<MacAddr, Error> {
    let mac1 = connection.read_reg(EFUSE_MAC0_REG)?;
    let mac2 = connection.read_reg(EFUSE_MAC1_REG)?;

    MacAddr::from_efuse(mac1, mac2)
}

/// Check whether the device on `port` is a flashable ESP8266.
///
/// Opens the port at 9600/N/no-flow, resets into the bootloader, syncs,
/// and reads the MAC address.
pub fn probe(port: &str) -> Result<MacAddr, Error> {
    let mut interface = SerialInterface::open(port)?;
    probe_interface(&mut interface)
}

pub(crate) fn probe_interface(interface: &mut dyn Interface) -> Result<MacAddr, Error> {
    let mut connection = Connection::new(interface);
    connection.reboot_into_bootloader()?;

    let mac = read_mac(&mut connection)?;
    debug!("MAC address: {}", mac);

    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockInterface;

    #[test]
    fn espressif_oui_is_selected_by_the_zero_tag() {
        let mac = MacAddr::from_efuse(0x04030201, 0x00002211).unwrap();
        assert_eq!(mac.as_bytes(), &[0x18, 0xFE, 0x34, 0x22, 0x11, 0x04]);
        assert_eq!(mac.to_string(), "18:FE:34:22:11:04");
    }

    #[test]
    fn alternate_oui_is_selected_by_the_one_tag() {
        let mac = MacAddr::from_efuse(0x04030201, 0x00012211).unwrap();
        assert_eq!(mac.as_bytes(), &[0xAC, 0xD0, 0x74, 0x22, 0x11, 0x04]);
    }

    #[test]
    fn unknown_oui_tag_fails() {
        assert!(matches!(
            MacAddr::from_efuse(0x04030201, 0x00072211),
            Err(Error::UnknownOui(7))
        ));
    }

    #[test]
    fn probe_resets_syncs_and_reads_the_mac() {
        let mut mock = MockInterface::new();
        mock.push_sync_burst();
        mock.push_response(0x0A, 0x04030201, &[0, 0]);
        mock.push_response(0x0A, 0x00002211, &[0, 0]);

        let mac = probe_interface(&mut mock).unwrap();
        assert_eq!(mac.to_string(), "18:FE:34:22:11:04");

        // both efuse words were requested
        let regs: Vec<u32> = mock
            .written_frames()
            .iter()
            .filter(|frame| frame[1] == 0x0A)
            .map(|frame| u32::from_le_bytes(frame[8..12].try_into().unwrap()))
            .collect();
        assert_eq!(regs, vec![EFUSE_MAC0_REG, EFUSE_MAC1_REG]);
    }
}
