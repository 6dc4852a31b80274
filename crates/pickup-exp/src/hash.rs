use pickup_core::errors::PickupError;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::serde::to_canonical_json_bytes;

/// Hex SHA-256 of the canonical JSON form; identifies instances and experiments.
pub fn content_id<T: Serialize>(value: &T) -> Result<String, PickupError> {
    let digest = Sha256::new()
        .chain_update(to_canonical_json_bytes(value)?)
        .finalize();
    Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
}
