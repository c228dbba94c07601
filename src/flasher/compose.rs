//! Image composition
//!
//! Adjustments applied to the loaded images after sync but before any
//! block is written: flash parameter resolution, the optional filesystem
//! merge, and identity block provisioning. All of it runs under the
//! flasher's session lock.

use std::collections::BTreeMap;

use log::{info, warn};

#[cfg(feature = "fs-merge")]
use crate::flasher::{FILESYSTEM_OFFSET, FILESYSTEM_SIZE};
use crate::{
    connection::Connection,
    error::Error,
    flasher::{stub, ID_BLOCK_OFFSET, IMAGE_MAGIC},
    idblock,
    params::FlashParams,
};

/// Read the flash parameter bytes out of the firmware image already on the
/// device.
///
/// Runs code from RAM, so the device must be rebooted into the bootloader
/// before further bootloader commands; `read_flash` takes care of that.
pub(crate) fn read_flash_params(connection: &mut Connection) -> Result<FlashParams, Error> {
    let header = stub::read_flash(connection, 0, 4)?;
    if header[0] != IMAGE_MAGIC {
        return Err(Error::MissingImageHeader);
    }

    Ok(FlashParams::from_bytes([header[2], header[3]]))
}

/// Stamp `params` into the firmware image at offset 0 and report the
/// parameters that will actually reach the flash.
///
/// Only an image carrying the well-known header magic is touched; once an
/// image exists there, its own bytes 2..3 are authoritative.
pub(crate) fn apply_flash_params(
    images: &mut BTreeMap<u32, Vec<u8>>,
    params: Option<FlashParams>,
) -> Option<FlashParams> {
    let image = match images.get_mut(&0) {
        Some(image) if image.len() >= 4 && image[0] == IMAGE_MAGIC => image,
        _ => return params,
    };

    if let Some(params) = params {
        let bytes = params.to_bytes();
        image[2] = bytes[0];
        image[3] = bytes[1];
        warn!("adjusting flash params in the image at 0x0000 to {}", params);
    }

    Some(FlashParams::from_bytes([image[2], image[3]]))
}

/// Keep the identity block already on the device, or provision a fresh one
/// at 0x10000 when none passes the hash check.
pub(crate) fn ensure_identity_block(
    connection: &mut Connection,
    images: &mut BTreeMap<u32, Vec<u8>>,
    hostname: &str,
) -> Result<(), Error> {
    let block = stub::read_flash(connection, ID_BLOCK_OFFSET, idblock::ID_BLOCK_SIZE as u32)
        .map_err(|err| Error::IdentityProbe(Box::new(err)))?;

    if idblock::is_valid(&block) {
        info!("existing device identity found");
    } else {
        warn!("no device identity found, generating a new one");
        images.insert(ID_BLOCK_OFFSET, idblock::generate(hostname));
    }

    Ok(())
}

/// Combines the filesystem image already on the device with the bundled
/// one.
///
/// Files present in the bundle win; files only present on the device
/// survive. The filesystem format itself is the collaborator's business.
#[cfg(feature = "fs-merge")]
pub trait FilesystemMerger: Send + Sync {
    fn merge(
        &self,
        device: &[u8],
        bundled: &[u8],
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Replace the image at the filesystem offset with the merge of the
/// on-device filesystem and the bundled one.
#[cfg(feature = "fs-merge")]
pub(crate) fn merge_filesystem(
    connection: &mut Connection,
    images: &mut BTreeMap<u32, Vec<u8>>,
    merger: &dyn FilesystemMerger,
) -> Result<(), Error> {
    let device = stub::read_flash(connection, FILESYSTEM_OFFSET, FILESYSTEM_SIZE)
        .map_err(|err| Error::FilesystemMerge(Box::new(err)))?;

    let bundled = images
        .get(&FILESYSTEM_OFFSET)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let merged = merger
        .merge(&device, bundled)
        .map_err(Error::FilesystemMerge)?;
    images.insert(FILESYSTEM_OFFSET, merged);
    info!("merged flash filesystem content");

    Ok(())
}
