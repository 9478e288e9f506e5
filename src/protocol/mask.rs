//! Payload masking (RFC 6455 Section 5.3).

use std::sync::atomic::{AtomicU32, Ordering};

/// Byte-by-byte XOR masking.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Word-at-a-time XOR masking. Produces the same output as [`apply_mask`].
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);

    for chunk in &mut chunks {
        let val = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(val ^ mask_u32).to_ne_bytes());
    }

    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i];
    }
}

static FALLBACK_STATE: AtomicU32 = AtomicU32::new(0x9E37_79B9);

/// Generate a fresh 4-byte masking key.
///
/// Uses the OS random source; falls back to a mixed counter seeded from the
/// system clock if the OS source is unavailable.
#[must_use]
pub fn generate_mask_key() -> [u8; 4] {
    let mut key = [0u8; 4];
    if getrandom::getrandom(&mut key).is_ok() {
        return key;
    }

    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u32)
        .unwrap_or(0x1234_5678);
    let a = FALLBACK_STATE
        .fetch_add(0x9E37_79B9, Ordering::Relaxed)
        .wrapping_add(nanos);
    let b = a.wrapping_mul(0x85EB_CA6B);
    let c = b ^ (b >> 13);
    c.wrapping_mul(0xC2B2_AE35).to_le_bytes()
}
