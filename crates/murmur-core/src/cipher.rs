//! Symmetric cipher codec for message payloads.
//!
//! AES-256-CBC with PKCS#7 padding. Ciphertext travels as standard base64
//! text, one ciphertext per stream.
//!
//! A node holds exactly one key and one IV for its whole lifetime. In
//! `CipherMode::StaticIv` the IV is reused for every message, so identical
//! plaintexts produce identical ciphertexts. `CipherMode::FreshIv` draws a
//! random IV per message and prepends it to the ciphertext; both ends must
//! agree on the mode.
//!
//! Key material is wiped from memory when the context is dropped.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::CipherConfig;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// How the IV is chosen for each message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherMode {
    /// One IV for every message. Deterministic.
    #[default]
    StaticIv,
    /// Random IV per message, carried as the first 16 bytes of the ciphertext.
    FreshIv,
}

impl std::str::FromStr for CipherMode {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static_iv" => Ok(Self::StaticIv),
            "fresh_iv" => Ok(Self::FreshIv),
            other => Err(CipherError::UnknownMode(other.to_string())),
        }
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// The process-wide key and IV.
pub struct CipherContext {
    key: Zeroizing<[u8; KEY_LEN]>,
    iv: Zeroizing<[u8; IV_LEN]>,
    mode: CipherMode,
}

impl CipherContext {
    /// Generate a random key and IV.
    pub fn generate(mode: CipherMode) -> Self {
        let mut rng = rand::thread_rng();
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        let mut iv = Zeroizing::new([0u8; IV_LEN]);
        rng.fill_bytes(&mut key[..]);
        rng.fill_bytes(&mut iv[..]);
        Self { key, iv, mode }
    }

    pub fn from_parts(key: [u8; KEY_LEN], iv: [u8; IV_LEN], mode: CipherMode) -> Self {
        Self {
            key: Zeroizing::new(key),
            iv: Zeroizing::new(iv),
            mode,
        }
    }

    /// Build from configuration. Key and IV that are not configured are
    /// generated randomly, which makes the node unable to talk to anyone
    /// that does not share its process.
    pub fn from_config(config: &CipherConfig) -> Result<Self, CipherError> {
        let mut ctx = Self::generate(config.mode);
        if let Some(key_hex) = config.key_hex.as_deref() {
            *ctx.key = decode_hex_array::<KEY_LEN>(key_hex, "key")?;
        }
        if let Some(iv_hex) = config.iv_hex.as_deref() {
            *ctx.iv = decode_hex_array::<IV_LEN>(iv_hex, "iv")?;
        }
        Ok(ctx)
    }

    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    /// Encrypt UTF-8 text to base64 ciphertext.
    pub fn encrypt(&self, plaintext: &str) -> String {
        match self.mode {
            CipherMode::StaticIv => STANDARD.encode(self.seal(&self.iv, plaintext.as_bytes())),
            CipherMode::FreshIv => {
                let mut iv = [0u8; IV_LEN];
                rand::thread_rng().fill_bytes(&mut iv);
                let sealed = self.seal(&iv, plaintext.as_bytes());
                let mut out = Vec::with_capacity(IV_LEN + sealed.len());
                out.extend_from_slice(&iv);
                out.extend_from_slice(&sealed);
                STANDARD.encode(out)
            }
        }
    }

    /// Decrypt base64 ciphertext back to UTF-8 text.
    ///
    /// Fails on malformed base64, truncated input, input produced under a
    /// different key or IV (bad padding), or non-UTF-8 plaintext.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let raw = STANDARD.decode(ciphertext.trim())?;
        let plain = match self.mode {
            CipherMode::StaticIv => self.open(&self.iv, &raw)?,
            CipherMode::FreshIv => {
                if raw.len() < IV_LEN {
                    return Err(CipherError::Truncated(raw.len()));
                }
                let (iv, body) = raw.split_at(IV_LEN);
                let mut iv_arr = [0u8; IV_LEN];
                iv_arr.copy_from_slice(iv);
                self.open(&iv_arr, body)?
            }
        };
        Ok(String::from_utf8(plain)?)
    }

    fn seal(&self, iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
        Aes256CbcEnc::new(GenericArray::from_slice(&self.key[..]), GenericArray::from_slice(iv))
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    fn open(&self, iv: &[u8; IV_LEN], body: &[u8]) -> Result<Vec<u8>, CipherError> {
        if body.is_empty() || body.len() % BLOCK_LEN != 0 {
            return Err(CipherError::Truncated(body.len()));
        }
        Aes256CbcDec::new(GenericArray::from_slice(&self.key[..]), GenericArray::from_slice(iv))
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| CipherError::BadPadding)
    }
}

fn decode_hex_array<const N: usize>(s: &str, what: &'static str) -> Result<[u8; N], CipherError> {
    let bytes = Zeroizing::new(hex::decode(s.trim()).map_err(|_| CipherError::InvalidHex(what))?);
    if bytes.len() != N {
        return Err(CipherError::WrongLength {
            what,
            expected: N,
            got: bytes.len(),
        });
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("ciphertext is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("ciphertext truncated ({0} bytes is not a whole number of blocks)")]
    Truncated(usize),
    #[error("bad padding: wrong key/iv or corrupted ciphertext")]
    BadPadding,
    #[error("plaintext is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("{0} is not valid hex")]
    InvalidHex(&'static str),
    #[error("{what} must be {expected} bytes, got {got}")]
    WrongLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("unknown cipher mode: {0}")]
    UnknownMode(String),
}
