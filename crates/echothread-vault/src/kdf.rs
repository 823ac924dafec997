// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PBKDF2-HMAC-SHA256 key derivation from the operator's passphrase.

use std::num::NonZeroU32;

use ring::pbkdf2;
use zeroize::Zeroizing;

/// Fixed context salt. Separates this derivation context from any other
/// use of the same passphrase; per-row salts are unnecessary because a
/// single process-wide key encrypts all rows.
const CONTEXT_SALT: &[u8] = b"echothread_secret_store";

/// PBKDF2 iteration count.
const ITERATIONS: u32 = 100_000;

/// Derive the 32-byte store key from a passphrase.
///
/// The returned key is wrapped in [`Zeroizing`] so it is wiped from memory
/// on drop.
pub fn derive_key(passphrase: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        NonZeroU32::new(ITERATIONS).expect("iterations is nonzero"),
        CONTEXT_SALT,
        passphrase,
        key.as_mut(),
    );
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_is_deterministic() {
        let k1 = derive_key(b"correct horse battery staple");
        let k2 = derive_key(b"correct horse battery staple");
        assert_eq!(*k1, *k2);
    }

    #[test]
    fn different_passphrases_diverge() {
        let k1 = derive_key(b"passphrase one");
        let k2 = derive_key(b"passphrase two");
        assert_ne!(*k1, *k2);
    }

    #[test]
    fn output_is_32_bytes() {
        assert_eq!(derive_key(b"x").len(), 32);
    }
}
