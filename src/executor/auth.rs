//! Credential check for the AI front-end

use crate::config::AiSettings;
use crate::error::CommandError;
use sha2::{Digest, Sha256};

/// Gate a request: disabled access wins over a bad credential
pub fn authorize(settings: &AiSettings, credential: Option<&str>) -> Result<(), CommandError> {
    if !settings.enabled {
        return Err(CommandError::Disabled);
    }
    match (settings.api_key.as_deref(), credential) {
        (Some(expected), Some(given)) if credential_matches(expected, given) => Ok(()),
        _ => Err(CommandError::Unauthorized),
    }
}

/// Compare fixed-size digests so the comparison never short-circuits on a
/// shared prefix of the raw strings
pub fn credential_matches(expected: &str, given: &str) -> bool {
    let a = Sha256::digest(expected.as_bytes());
    let b = Sha256::digest(given.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
