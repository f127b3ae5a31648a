//! Deterministic generation seeds.
//!
//! The media service accepts a `seed` so that re-submitting the same
//! image with the same prompt reproduces the same output. The seed is
//! derived from `publicId:prompt` and is never stored.

/// Lowest seed value produced by [`optimized_seed`].
pub const MIN_SEED: u32 = 1;

/// Highest seed value produced by [`optimized_seed`].
pub const MAX_SEED: u32 = 1000;

/// 31-multiplier string hash over UTF-16 code units with 32-bit
/// wrapping arithmetic.
fn string_hash(input: &str) -> i32 {
    input
        .encode_utf16()
        .fold(0i32, |hash, unit| {
            hash.wrapping_shl(5)
                .wrapping_sub(hash)
                .wrapping_add(i32::from(unit))
        })
}

/// Seed for a `(public_id, prompt)` pair, always in `MIN_SEED..=MAX_SEED`.
pub fn optimized_seed(public_id: &str, prompt: &str) -> u32 {
    let hash = string_hash(&format!("{public_id}:{prompt}"));
    hash.unsigned_abs() % MAX_SEED + MIN_SEED
}
