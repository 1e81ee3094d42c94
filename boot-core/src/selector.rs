use embassy_time::{Duration, with_timeout};

use crate::config::{Slot, UpdateConfig};
use crate::error::{StorageErrorKind, StoreError};
use crate::store::{ImageFile, ImageStore};

/// The slot chosen for installation and the size of its image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Selection {
    pub slot: Slot,
    pub image_len: u32,
}

// Why a slot with a marker was passed over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum ImageProblem {
    Unreadable(StorageErrorKind),
    Empty,
    TooLarge { len: u32, capacity: u32 },
}

/// Look for marker files in slot priority order and pick the first slot whose
/// image can be installed into a region of `capacity` bytes. Probe failures
/// only ever skip a slot; `None` means no update is pending.
pub async fn select_slot<S: ImageStore>(
    store: &mut S,
    config: &UpdateConfig,
    capacity: u32,
) -> Option<Selection> {
    let mut selected: Option<Selection> = None;

    for slot in Slot::PRIORITY {
        let files = config.files(slot);
        if !marker_present(store, files.marker, config.storage_timeout).await {
            continue;
        }

        if let Some(selection) = selected {
            warn!(
                "{} is present as well, ignoring it in favour of slot {}",
                files.marker, selection.slot
            );
            continue;
        }

        info!("{} found, flashing firmware {}", files.marker, files.image);
        match probe_image(store, files.image, capacity, config.storage_timeout).await {
            Ok(image_len) => selected = Some(Selection { slot, image_len }),
            Err(problem) => warn!("Skipping slot {}: {} {}", slot, files.image, problem),
        }
    }

    if selected.is_none() {
        info!("Neither flag found");
    }
    selected
}

// A marker that cannot be probed counts as absent
async fn marker_present<S: ImageStore>(store: &mut S, name: &str, timeout: Duration) -> bool {
    match with_timeout(timeout, store.exists(name)).await {
        Ok(Ok(present)) => present,
        Ok(Err(e)) => {
            warn!("Probing {} failed: {}", name, e.kind());
            false
        }
        Err(_) => {
            warn!("Probing {} timed out", name);
            false
        }
    }
}

async fn probe_image<S: ImageStore>(
    store: &mut S,
    name: &str,
    capacity: u32,
    timeout: Duration,
) -> Result<u32, ImageProblem> {
    let len = match with_timeout(timeout, store.open(name)).await {
        Ok(Ok(file)) => file.size(),
        Ok(Err(e)) => return Err(ImageProblem::Unreadable(e.kind())),
        Err(_) => return Err(ImageProblem::Unreadable(StorageErrorKind::Timeout)),
    };

    if len == 0 {
        return Err(ImageProblem::Empty);
    }
    if len > capacity {
        return Err(ImageProblem::TooLarge { len, capacity });
    }
    Ok(len)
}
