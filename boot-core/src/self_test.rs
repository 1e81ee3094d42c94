use embassy_time::with_timeout;

use crate::config::UpdateConfig;
use crate::error::{StorageErrorKind, StoreError};
use crate::store::{ImageStore, write_bounded};

pub const SELF_TEST_TEXT: &[u8] = b"Test SD/MMC stack\n";

/// Prove the card accepts writes by rewriting a text file and a binary file
/// holding every byte value once.
pub async fn storage_self_test<S: ImageStore>(
    store: &mut S,
    config: &UpdateConfig,
) -> Result<(), StorageErrorKind> {
    info!("Write to test file {}", config.self_test_text_file);
    write_file(store, config.self_test_text_file, SELF_TEST_TEXT, config).await?;

    let mut pattern = [0u8; 256];
    for (i, byte) in pattern.iter_mut().enumerate() {
        *byte = i as u8;
    }
    info!("Write to test file {}", config.self_test_binary_file);
    write_file(store, config.self_test_binary_file, &pattern, config).await?;

    info!("Storage self-test passed");
    Ok(())
}

async fn write_file<S: ImageStore>(
    store: &mut S,
    name: &str,
    mut data: &[u8],
    config: &UpdateConfig,
) -> Result<(), StorageErrorKind> {
    let mut file = match with_timeout(config.storage_timeout, store.create(name)).await {
        Ok(Ok(file)) => file,
        Ok(Err(e)) => {
            error!("Could not create {}: {}", name, e.kind());
            return Err(e.kind());
        }
        Err(_) => return Err(StorageErrorKind::Timeout),
    };

    while !data.is_empty() {
        let written = write_bounded(&mut file, data, config.storage_timeout).await?;
        if written == 0 {
            error!("Writing {} stalled with {} bytes left", name, data.len());
            return Err(StorageErrorKind::Filesystem);
        }
        data = &data[written..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use super::*;
    use crate::testing::{MockStore, run};

    #[test]
    fn writes_text_and_binary_test_files() {
        let mut store = MockStore::new().with_file("SDTEST.TXT", b"stale contents");
        let config = UpdateConfig::default();

        assert_eq!(run(storage_self_test(&mut store, &config)), Ok(()));

        assert_eq!(store.files["SDTEST.TXT"], SELF_TEST_TEXT);
        let expected: Vec<u8> = (0..=255u8).collect();
        assert_eq!(store.files["SDTEST.BIN"], expected);
        assert_eq!(store.open_handles, 0);
    }

    #[test]
    fn reports_create_failure() {
        let mut store = MockStore::new();
        store.fail_creates();

        assert_eq!(
            run(storage_self_test(&mut store, &UpdateConfig::default())),
            Err(StorageErrorKind::Filesystem)
        );
    }
}
