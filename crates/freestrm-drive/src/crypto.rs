//! Payload codec for the 115 download endpoint
//!
//! The download endpoint takes a form field `data` holding an encrypted JSON
//! body and answers with a `data` field encrypted the same way. The scheme is
//! a byte-shuffling layer (XOR with a 4-byte mask, reversal, XOR with a
//! 12-byte key) wrapped in raw RSA over 128-byte blocks.
//!
//! ## Request framing
//!
//! ```text
//! payload = key_block(16) ++ xor(reverse(xor(plaintext, MASK)), xor_key)
//! ```
//!
//! The payload is cut into chunks of at most `k - 11` bytes (`k` = modulus
//! length in bytes), each padded to `k` bytes as
//! `00 02 02 .. 02 00 <chunk>` and raised to the encrypt exponent.
//!
//! ## Response framing
//!
//! Each `k`-byte block is raised to the decrypt exponent; the bytes after the
//! first zero of the minimal big-endian form are kept. The first 16 recovered
//! bytes seed the XOR key through [`gen_key`], the rest is un-shuffled.
//!
//! The server signs responses with its private key, so the wire codec uses the
//! public exponent in both directions, and the wire request key (an all-zero
//! block with a fixed XOR key) is not the key [`gen_key`] derives from that
//! block. A codec built from a full key pair and a [`RequestKey::derived`]
//! key is symmetric: `decrypt(encrypt(x)) == x`.
//!
//! ## Usage
//!
//! ```rust
//! use freestrm_drive::crypto::CryptoCodec;
//!
//! let codec = CryptoCodec::default();
//! let form_value = codec.encrypt(r#"{"pick_code":"abc123"}"#);
//! assert_eq!(form_value.len() % 4, 0);
//! ```

use base64::{engine::general_purpose::STANDARD, Engine};
use freestrm_core::domain::errors::DriveError;
use rsa::BigUint;
use thiserror::Error;

/// Modulus of the 115 key, big-endian.
const WIRE_MODULUS: [u8; 128] = [
    0x86, 0x86, 0x98, 0x0c, 0x0f, 0x5a, 0x24, 0xc4, 0xb9, 0xd4, 0x30, 0x20,
    0xcd, 0x2c, 0x22, 0x70, 0x3f, 0xf3, 0xf4, 0x50, 0x75, 0x65, 0x29, 0x05,
    0x8b, 0x1c, 0xf8, 0x8f, 0x09, 0xb8, 0x60, 0x21, 0x36, 0x47, 0x71, 0x98,
    0xa6, 0xe2, 0x68, 0x31, 0x49, 0x65, 0x9b, 0xd1, 0x22, 0xc3, 0x35, 0x92,
    0xfd, 0xb5, 0xad, 0x47, 0x94, 0x4a, 0xd1, 0xea, 0x4d, 0x36, 0xc6, 0xb1,
    0x72, 0xaa, 0xd6, 0x33, 0x8c, 0x3b, 0xb6, 0xac, 0x62, 0x27, 0x50, 0x2d,
    0x01, 0x09, 0x93, 0xac, 0x96, 0x7d, 0x1a, 0xef, 0x00, 0xf0, 0xc8, 0xe0,
    0x38, 0xde, 0x2e, 0x4d, 0x3b, 0xc2, 0xec, 0x36, 0x8a, 0xf2, 0xe9, 0xf1,
    0x0a, 0x6f, 0x1e, 0xda, 0x4f, 0x72, 0x62, 0xf1, 0x36, 0x42, 0x0c, 0x07,
    0xc3, 0x31, 0xb8, 0x71, 0xbf, 0x13, 0x9f, 0x74, 0xf3, 0x01, 0x0e, 0x3c,
    0x4f, 0xe5, 0x7d, 0xf3, 0xaf, 0xb7, 0x16, 0x83,
];

const PUBLIC_EXPONENT: u32 = 0x10001;

const MASK: [u8; 4] = [0x8d, 0xa5, 0xa5, 0x8d];

/// XOR key paired with the all-zero key block on the wire.
const WIRE_XOR_KEY: [u8; 12] = [
    0x78, 0x06, 0xad, 0x4c, 0x33, 0x86, 0x5d, 0x18, 0x4c, 0x01, 0x3f, 0x46,
];

const KEY_BLOCK_LEN: usize = 16;
const XOR_KEY_LEN: usize = 12;

/// Padding overhead per RSA block.
const PAD_OVERHEAD: usize = 11;

const G_KTS: [u8; 144] = [
    0xf0, 0xe5, 0x69, 0xae, 0xbf, 0xdc, 0xbf, 0x8a, 0x1a, 0x45, 0xe8, 0xbe, 0x7d, 0xa6, 0x73, 0xb8,
    0xde, 0x8f, 0xe7, 0xc4, 0x45, 0xda, 0x86, 0xc4, 0x9b, 0x64, 0x8b, 0x14, 0x6a, 0xb4, 0xf1, 0xaa,
    0x38, 0x01, 0x35, 0x9e, 0x26, 0x69, 0x2c, 0x86, 0x00, 0x6b, 0x4f, 0xa5, 0x36, 0x34, 0x62, 0xa6,
    0x2a, 0x96, 0x68, 0x18, 0xf2, 0x4a, 0xfd, 0xbd, 0x6b, 0x97, 0x8f, 0x4d, 0x8f, 0x89, 0x13, 0xb7,
    0x6c, 0x8e, 0x93, 0xed, 0x0e, 0x0d, 0x48, 0x3e, 0xd7, 0x2f, 0x88, 0xd8, 0xfe, 0xfe, 0x7e, 0x86,
    0x50, 0x95, 0x4f, 0xd1, 0xeb, 0x83, 0x26, 0x34, 0xdb, 0x66, 0x7b, 0x9c, 0x7e, 0x9d, 0x7a, 0x81,
    0x32, 0xea, 0xb6, 0x33, 0xde, 0x3a, 0xa9, 0x59, 0x34, 0x66, 0x3b, 0xaa, 0xba, 0x81, 0x60, 0x48,
    0xb9, 0xd5, 0x81, 0x9c, 0xf8, 0x6c, 0x84, 0x77, 0xff, 0x54, 0x78, 0x26, 0x5f, 0xbe, 0xe8, 0x1e,
    0x36, 0x9f, 0x34, 0x80, 0x5c, 0x45, 0x2c, 0x9b, 0x76, 0xd5, 0x1b, 0x8f, 0xcc, 0xc3, 0xb8, 0xf5,
];

/// Errors raised while decoding an encrypted payload
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload is not valid base64")]
    InvalidBase64,

    #[error("payload length {len} is not a multiple of the {block}-byte block size")]
    InvalidLength { len: usize, block: usize },

    #[error("block {0} has no padding separator")]
    MissingSeparator(usize),

    #[error("decoded payload is {0} bytes, shorter than the 16-byte key block")]
    TooShort(usize),

    #[error("decoded payload is not UTF-8")]
    InvalidUtf8,

    #[error("modulus is too small for the padding scheme")]
    InvalidKey,
}

impl From<CodecError> for DriveError {
    fn from(err: CodecError) -> Self {
        DriveError::Decode(err.to_string())
    }
}

/// Key block prepended to requests and the XOR key applied with it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestKey {
    pub block: [u8; KEY_BLOCK_LEN],
    pub xor_key: [u8; XOR_KEY_LEN],
}

impl RequestKey {
    /// The key every 115 client sends: zero block, fixed XOR key.
    pub const fn wire() -> Self {
        Self {
            block: [0; KEY_BLOCK_LEN],
            xor_key: WIRE_XOR_KEY,
        }
    }

    /// A key whose XOR key is the one a receiver derives from `block`.
    pub fn derived(block: [u8; KEY_BLOCK_LEN]) -> Self {
        Self {
            block,
            xor_key: gen_key(&block),
        }
    }
}

impl Default for RequestKey {
    fn default() -> Self {
        Self::wire()
    }
}

/// Encrypts request bodies and decrypts response bodies
#[derive(Debug, Clone)]
pub struct CryptoCodec {
    modulus: BigUint,
    encrypt_exponent: BigUint,
    decrypt_exponent: BigUint,
    request_key: RequestKey,
    block_len: usize,
}

impl Default for CryptoCodec {
    fn default() -> Self {
        let modulus = BigUint::from_bytes_be(&WIRE_MODULUS);
        Self {
            block_len: byte_len(&modulus),
            modulus,
            encrypt_exponent: BigUint::from(PUBLIC_EXPONENT),
            decrypt_exponent: BigUint::from(PUBLIC_EXPONENT),
            request_key: RequestKey::wire(),
        }
    }
}

impl CryptoCodec {
    /// Codec over arbitrary key material.
    pub fn new(
        modulus: BigUint,
        encrypt_exponent: BigUint,
        decrypt_exponent: BigUint,
        request_key: RequestKey,
    ) -> Result<Self, CodecError> {
        let block_len = byte_len(&modulus);
        if block_len <= PAD_OVERHEAD + 1 {
            return Err(CodecError::InvalidKey);
        }
        Ok(Self {
            modulus,
            encrypt_exponent,
            decrypt_exponent,
            request_key,
            block_len,
        })
    }

    /// Encrypt `plaintext` into the base64 form field value.
    pub fn encrypt(&self, plaintext: impl AsRef<[u8]>) -> String {
        let plaintext = plaintext.as_ref();

        let mut shuffled = xor(plaintext, &MASK);
        shuffled.reverse();
        let shuffled = xor(&shuffled, &self.request_key.xor_key);

        let mut payload = Vec::with_capacity(KEY_BLOCK_LEN + shuffled.len());
        payload.extend_from_slice(&self.request_key.block);
        payload.extend_from_slice(&shuffled);

        let chunk_len = self.block_len - PAD_OVERHEAD;
        let mut cipher = Vec::with_capacity(payload.len().div_ceil(chunk_len) * self.block_len);
        for chunk in payload.chunks(chunk_len) {
            let padded = BigUint::from_bytes_be(&self.pad(chunk));
            let block = padded.modpow(&self.encrypt_exponent, &self.modulus);
            cipher.extend_from_slice(&left_pad(&block.to_bytes_be(), self.block_len));
        }
        STANDARD.encode(cipher)
    }

    /// Decrypt a base64 response payload into text.
    pub fn decrypt(&self, encoded: &str) -> Result<String, CodecError> {
        let bytes = self.decrypt_bytes(encoded)?;
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Decrypt a base64 response payload into raw bytes.
    pub fn decrypt_bytes(&self, encoded: &str) -> Result<Vec<u8>, CodecError> {
        let cipher = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CodecError::InvalidBase64)?;
        if cipher.len() % self.block_len != 0 {
            return Err(CodecError::InvalidLength {
                len: cipher.len(),
                block: self.block_len,
            });
        }

        let mut data = Vec::with_capacity(cipher.len());
        for (index, block) in cipher.chunks(self.block_len).enumerate() {
            let plain = BigUint::from_bytes_be(block)
                .modpow(&self.decrypt_exponent, &self.modulus)
                .to_bytes_be();
            let separator = plain
                .iter()
                .position(|&b| b == 0)
                .ok_or(CodecError::MissingSeparator(index))?;
            data.extend_from_slice(&plain[separator + 1..]);
        }

        if data.len() < KEY_BLOCK_LEN {
            return Err(CodecError::TooShort(data.len()));
        }
        let (block, body) = data.split_at(KEY_BLOCK_LEN);
        let key = gen_key(block);

        let mut unshuffled = xor(body, &key);
        unshuffled.reverse();
        Ok(xor(&unshuffled, &MASK))
    }

    /// `00 02 .. 02 00 <chunk>` right-aligned in one block.
    fn pad(&self, chunk: &[u8]) -> Vec<u8> {
        let k = self.block_len;
        let mut buf = vec![0u8; k];
        let separator = k - 1 - chunk.len();
        buf[1..separator].fill(0x02);
        buf[k - chunk.len()..].copy_from_slice(chunk);
        buf
    }
}

/// Derive a 12-byte XOR key from a 16-byte key block.
pub fn gen_key(block: &[u8]) -> [u8; XOR_KEY_LEN] {
    let mut key = [0u8; XOR_KEY_LEN];
    let mut tail = XOR_KEY_LEN * (XOR_KEY_LEN - 1);
    let mut head = 0;
    for (i, slot) in key.iter_mut().enumerate() {
        let x = block.get(i).copied().unwrap_or(0).wrapping_add(G_KTS[head]);
        *slot = G_KTS[tail] ^ x;
        tail -= XOR_KEY_LEN;
        head += XOR_KEY_LEN;
    }
    key
}

/// XOR with the key's prefix over the first `len % 4` bytes, then with the
/// whole key in strides from there.
fn xor(src: &[u8], key: &[u8]) -> Vec<u8> {
    let mut out = src.to_vec();
    let head = src.len() & 0b11;
    for (b, k) in out[..head].iter_mut().zip(key) {
        *b ^= k;
    }
    for chunk in out[head..].chunks_mut(key.len()) {
        for (b, k) in chunk.iter_mut().zip(key) {
            *b ^= k;
        }
    }
    out
}

fn byte_len(n: &BigUint) -> usize {
    n.bits().div_ceil(8)
}

fn left_pad(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len.saturating_sub(bytes.len())];
    out.extend_from_slice(bytes);
    out
}
