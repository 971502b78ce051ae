//! Cryptographic primitives: SHA-256, AES-256-CBC, the iterated AES-ECB key
//! transform, and the Salsa20 inner stream used for protected strings.

use aes::cipher::generic_array::GenericArray;
use aes::Aes256;
use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher};
use salsa20::{Key, Nonce, Salsa20};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::ErrorKind;

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

/// Nonce for the inner random stream. Fixed by the KDBX v2 format.
const INNER_STREAM_NONCE: [u8; 8] = [0xe8, 0x30, 0x09, 0x4b, 0x97, 0x20, 0x5d, 0x2a];

/// One-shot SHA-256 over a sequence of byte slices.
pub(crate) fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// AES-256-CBC decrypt with PKCS#7 unpadding.
///
/// A padding failure means the key is wrong or the ciphertext was tampered
/// with; both surface as [`ErrorKind::CannotDecrypt`].
pub(crate) fn decrypt_aes_cbc(
    key: &[u8; 32],
    iv: &[u8; 16],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, ErrorKind> {
    let cipher =
        Aes256CbcDec::new_from_slices(key, iv).map_err(|_| ErrorKind::CannotDecrypt)?;

    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    let plaintext_len = cipher
        .decrypt_padded_mut::<Pkcs7>(buffer.as_mut_slice())
        .map_err(|_| ErrorKind::CannotDecrypt)?
        .len();
    buffer.truncate(plaintext_len);

    Ok(buffer)
}

/// AES-256-CBC encrypt with PKCS#7 padding.
pub(crate) fn encrypt_aes_cbc(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256CbcEnc::new(key.into(), iv.into());
    cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// The KDBX key transform: `rounds` iterations of AES-ECB over the 32-byte
/// state, treated as two independent 16-byte blocks keyed by the transform
/// seed. No IV, no padding.
pub(crate) fn transform_key_rounds(state: &mut [u8; 32], seed: &[u8; 32], rounds: u64) {
    let cipher = Aes256::new(GenericArray::from_slice(seed));
    for _ in 0..rounds {
        let (lo, hi) = state.split_at_mut(16);
        cipher.encrypt_block(GenericArray::from_mut_slice(lo));
        cipher.encrypt_block(GenericArray::from_mut_slice(hi));
    }
}

/// The inner random stream cipher for protected strings.
///
/// Keyed with `SHA256(protected_stream_key)` and the fixed format nonce.
/// Keystream position advances across calls, so the order in which values
/// are processed matters; one instance covers one document pass.
pub(crate) struct InnerStream {
    cipher: Salsa20,
}

impl InnerStream {
    pub(crate) fn new(protected_stream_key: &[u8]) -> Self {
        let key = Zeroizing::new(sha256(&[protected_stream_key]));
        let cipher = Salsa20::new(
            Key::from_slice(key.as_slice()),
            Nonce::from_slice(&INNER_STREAM_NONCE),
        );
        Self { cipher }
    }

    /// XOR the next keystream bytes into `data` in place.
    pub(crate) fn apply(&mut self, data: &mut [u8]) {
        self.cipher.apply_keystream(data);
    }
}
