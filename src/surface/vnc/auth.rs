//! VNC authentication (security type 2): DES challenge/response.
use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockEncrypt, KeyInit};
use des::Des;

/// Key derivation: the password is truncated or zero-padded to eight bytes
/// and every byte has its bit order mirrored.
fn des_key(password: &[u8]) -> [u8; 8] {
    let mut key = [0u8; 8];
    for (slot, b) in key.iter_mut().zip(password) {
        *slot = b.reverse_bits();
    }
    key
}

fn encrypt_challenge(key: &[u8; 8], challenge: &[u8; 16]) -> [u8; 16] {
    let cipher = Des::new(GenericArray::from_slice(key));
    let mut out = [0u8; 16];
    for (src, dst) in challenge.chunks_exact(8).zip(out.chunks_exact_mut(8)) {
        let mut block = GenericArray::clone_from_slice(src);
        cipher.encrypt_block(&mut block);
        dst.copy_from_slice(&block);
    }
    out
}

pub fn vnc_auth_response(password: &str, challenge: &[u8; 16]) -> [u8; 16] {
    encrypt_challenge(&des_key(password.as_bytes()), challenge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_bytes_are_bit_mirrored_and_padded() {
        assert_eq!(des_key(b"ab"), [0x86, 0x46, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn long_passwords_are_truncated() {
        let challenge = [0x5au8; 16];
        assert_eq!(
            vnc_auth_response("password", &challenge),
            vnc_auth_response("password-and-more", &challenge)
        );
        assert_ne!(
            vnc_auth_response("password", &challenge),
            vnc_auth_response("passwore", &challenge)
        );
    }

    #[test]
    fn both_challenge_halves_use_ecb() {
        // Classic DES vector: key 0123456789ABCDEF, "Now is t" -> 3FA40E8A984D4815.
        let key = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
        let mut challenge = [0u8; 16];
        challenge[..8].copy_from_slice(b"Now is t");
        challenge[8..].copy_from_slice(b"Now is t");
        let out = encrypt_challenge(&key, &challenge);
        let expected: [u8; 8] = [0x3f, 0xa4, 0x0e, 0x8a, 0x98, 0x4d, 0x48, 0x15];
        assert_eq!(out[..8], expected);
        assert_eq!(out[8..], expected);
    }
}
