use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// 64 lowercase hex chars: SHA-256 of 32 OS-random bytes
pub fn machine_id() -> String {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    hex::encode(Sha256::digest(seed))
}

/// Random UUID v4, lowercase and hyphenated
pub fn device_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Braced uppercase UUID, the shape of `telemetry.sqmId`
pub fn sqm_id() -> String {
    format!("{{{}}}", uuid::Uuid::new_v4().to_string().to_uppercase())
}

pub fn is_machine_id(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

pub fn is_uuid(s: &str) -> bool {
    s.len() == 36 && uuid::Uuid::parse_str(s).is_ok()
}
