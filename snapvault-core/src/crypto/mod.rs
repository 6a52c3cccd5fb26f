//! OpenSSL-`enc`-compatible streaming encryption.
//!
//! Produces and consumes the same on-disk format as `openssl enc -salt`:
//! an 8-byte literal `Salted__` tag, an 8-byte salt, then the ciphertext.
//! Keys and IV are derived from a password and that salt with the classic
//! `EVP_BytesToKey` KDF, so archives written here can be decrypted with
//! the `openssl` CLI and vice versa. `kind = "none"` selects a pass-through
//! cipher: the salt header is still written (and still required on
//! decrypt), but the body is copied unmodified.
//!
//! Lifecycle is a one-way typestate chain (`Fresh` -> `EncryptionSet` ->
//! `SaltReady` -> `KeysDerived` -> `Consumed`) rather than a single struct
//! with a mutable "state" field: each transition consumes `self` and
//! returns a differently-typed value, so calling a step out of order is a
//! compile error, and a stream can't accidentally be rewound and reused
//! after its key material has been scrubbed.

use std::io::{self, Read, Write};
use std::marker::PhantomData;

use openssl::hash::MessageDigest;
use openssl::pkcs5::bytes_to_key;
use openssl::symm::{Cipher, Crypter, Mode};

use crate::csprng;
use crate::error::{Result, SnapvaultError};
use crate::secure::SecureBuffer;

const SALT_MAGIC: &[u8; 8] = b"Salted__";
const SALT_LEN: usize = 8;
const HEADER_LEN: usize = SALT_MAGIC.len() + SALT_LEN;
const STREAM_CHUNK: usize = 64 * 1024;
const KDF_DIGEST: MessageDigest = MessageDigest::sha256();

pub struct Fresh;
pub struct EncryptionSet;
pub struct SaltReady;
pub struct KeysDerived;
pub struct Consumed;

/// Either a real OpenSSL cipher or the `none` pass-through selection.
#[derive(Clone, Copy)]
enum CipherSelection {
    None,
    Cipher(Cipher),
}

/// A `CipherStream` in some state `S`. `S` carries no data of its own; it
/// only exists to make the available methods depend on which step has
/// run.
pub struct CipherStream<S> {
    selection: Option<CipherSelection>,
    password: Option<SecureBuffer>,
    salt: Option<[u8; SALT_LEN]>,
    key: Option<SecureBuffer>,
    iv: Option<SecureBuffer>,
    _state: PhantomData<S>,
}

impl CipherStream<Fresh> {
    pub fn new() -> Self {
        Self {
            selection: None,
            password: None,
            salt: None,
            key: None,
            iv: None,
            _state: PhantomData,
        }
    }

    /// Look up an OpenSSL cipher by its canonical name (e.g. `aes-256-cbc`,
    /// or `none` for the pass-through cipher) and bind a password to it.
    pub fn set_cipher(self, cipher_name: &str, password: SecureBuffer) -> Result<CipherStream<EncryptionSet>> {
        let selection = cipher_from_name(cipher_name)?;
        Ok(CipherStream {
            selection: Some(selection),
            password: Some(password),
            salt: None,
            key: None,
            iv: None,
            _state: PhantomData,
        })
    }
}

impl Default for CipherStream<Fresh> {
    fn default() -> Self {
        Self::new()
    }
}

impl CipherStream<EncryptionSet> {
    /// Draw a fresh random salt, for the encrypt direction.
    pub fn generate_salt(mut self) -> Result<CipherStream<SaltReady>> {
        let mut salt = [0u8; SALT_LEN];
        csprng::random_bytes(&mut salt);
        Ok(CipherStream {
            selection: self.selection.take(),
            password: self.password.take(),
            salt: Some(salt),
            key: None,
            iv: None,
            _state: PhantomData,
        })
    }

    /// Read the `Salted__` + salt header off the front of a ciphertext
    /// stream, for the decrypt direction. Returns the reader positioned
    /// right after the header.
    pub fn extract_salt<R: Read>(mut self, mut input: R) -> Result<(CipherStream<SaltReady>, R)> {
        let mut header = [0u8; HEADER_LEN];
        input.read_exact(&mut header).map_err(SnapvaultError::io_in)?;
        if &header[..SALT_MAGIC.len()] != SALT_MAGIC {
            return Err(SnapvaultError::InvalidFormat(
                "missing Salted__ header".to_string(),
            ));
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&header[SALT_MAGIC.len()..]);
        let stream = CipherStream {
            selection: self.selection.take(),
            password: self.password.take(),
            salt: Some(salt),
            key: None,
            iv: None,
            _state: PhantomData,
        };
        Ok((stream, input))
    }
}

impl CipherStream<SaltReady> {
    pub fn salt(&self) -> [u8; SALT_LEN] {
        self.salt.expect("salt set by construction")
    }

    /// Derive key and IV from the bound password and salt via
    /// `EVP_BytesToKey`, bit-compatible with `openssl enc`. The `none`
    /// selection has no key material to derive; the password is still
    /// scrubbed since it was still accepted (and may simply be unused by
    /// the caller's config).
    pub fn derive_keys(mut self) -> Result<CipherStream<KeysDerived>> {
        let selection = self.selection.expect("cipher set by construction");
        let password = self.password.take().expect("password set by construction");
        let salt = self.salt.expect("salt set by construction");

        let (key, iv) = match selection {
            CipherSelection::None => {
                password.scrub_and_drop();
                (None, None)
            }
            CipherSelection::Cipher(cipher) => {
                let keyiv = bytes_to_key(cipher, KDF_DIGEST, &salt, Some(password.as_slice()), 1)
                    .map_err(|e| SnapvaultError::CipherInit(e.to_string()))?;
                password.scrub_and_drop();
                let iv = keyiv.iv.ok_or_else(|| {
                    SnapvaultError::CipherInit("cipher requires an IV but KDF produced none".to_string())
                })?;
                (Some(SecureBuffer::from_vec(keyiv.key)), Some(SecureBuffer::from_vec(iv)))
            }
        };

        Ok(CipherStream {
            selection: Some(selection),
            password: None,
            salt: Some(salt),
            key,
            iv,
            _state: PhantomData,
        })
    }
}

impl CipherStream<KeysDerived> {
    /// Write the `Salted__` header followed by the encrypted (or, for
    /// `none`, unmodified) stream.
    pub fn encrypt<R: Read, W: Write>(mut self, mut input: R, mut output: W) -> Result<CipherStream<Consumed>> {
        let selection = self.selection.take().expect("cipher set by construction");
        let salt = self.salt.take().expect("salt set by construction");
        let key = self.key.take();
        let iv = self.iv.take();

        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(SALT_MAGIC);
        header.extend_from_slice(&salt);
        output.write_all(&header).map_err(SnapvaultError::io_out)?;

        match selection {
            CipherSelection::None => {
                io::copy(&mut input, &mut output).map_err(SnapvaultError::io_out)?;
            }
            CipherSelection::Cipher(cipher) => {
                let key = key.as_ref().expect("key set for a real cipher");
                let iv = iv.as_ref().expect("iv set for a real cipher");
                let mut crypter = Crypter::new(cipher, Mode::Encrypt, key.as_slice(), Some(iv.as_slice()))
                    .map_err(|e| SnapvaultError::CipherInit(e.to_string()))?;
                stream_through(&mut crypter, cipher.block_size(), &mut input, &mut output)?;
            }
        }

        if let Some(key) = key {
            key.scrub_and_drop();
        }
        if let Some(iv) = iv {
            iv.scrub_and_drop();
        }
        Ok(CipherStream::consumed())
    }

    /// Decrypt a stream whose header has already been consumed by
    /// `extract_salt`.
    pub fn decrypt<R: Read, W: Write>(mut self, mut input: R, mut output: W) -> Result<CipherStream<Consumed>> {
        let selection = self.selection.take().expect("cipher set by construction");
        let key = self.key.take();
        let iv = self.iv.take();

        match selection {
            CipherSelection::None => {
                io::copy(&mut input, &mut output).map_err(SnapvaultError::io_out)?;
            }
            CipherSelection::Cipher(cipher) => {
                let key = key.as_ref().expect("key set for a real cipher");
                let iv = iv.as_ref().expect("iv set for a real cipher");
                let mut crypter = Crypter::new(cipher, Mode::Decrypt, key.as_slice(), Some(iv.as_slice()))
                    .map_err(|e| SnapvaultError::CipherInit(e.to_string()))?;
                stream_through(&mut crypter, cipher.block_size(), &mut input, &mut output)?;
            }
        }

        if let Some(key) = key {
            key.scrub_and_drop();
        }
        if let Some(iv) = iv {
            iv.scrub_and_drop();
        }
        Ok(CipherStream::consumed())
    }
}

impl CipherStream<Consumed> {
    fn consumed() -> Self {
        Self {
            selection: None,
            password: None,
            salt: None,
            key: None,
            iv: None,
            _state: PhantomData,
        }
    }
}

fn stream_through<R: Read, W: Write>(
    crypter: &mut Crypter,
    block_size: usize,
    input: &mut R,
    output: &mut W,
) -> Result<()> {
    let mut in_buf = vec![0u8; STREAM_CHUNK];
    let mut out_buf = vec![0u8; STREAM_CHUNK + block_size];
    loop {
        let n = input.read(&mut in_buf).map_err(SnapvaultError::io_in)?;
        if n == 0 {
            break;
        }
        let written = crypter
            .update(&in_buf[..n], &mut out_buf)
            .map_err(|e| SnapvaultError::CipherUpdate(e.to_string()))?;
        output.write_all(&out_buf[..written]).map_err(SnapvaultError::io_out)?;
    }
    let written = crypter
        .finalize(&mut out_buf)
        .map_err(|e| SnapvaultError::CipherFinal(e.to_string()))?;
    output.write_all(&out_buf[..written]).map_err(SnapvaultError::io_out)?;
    Ok(())
}

fn cipher_from_name(name: &str) -> Result<CipherSelection> {
    // `Cipher` has no generic "by name" lookup in the safe API beyond the
    // small set of `Cipher::aes_*` constructors, so map the names the
    // config/CLI surface accepts onto those constructors explicitly.
    match name.to_ascii_lowercase().as_str() {
        "none" | "" => Ok(CipherSelection::None),
        "aes-128-cbc" => Ok(CipherSelection::Cipher(Cipher::aes_128_cbc())),
        "aes-192-cbc" => Ok(CipherSelection::Cipher(Cipher::aes_192_cbc())),
        "aes-256-cbc" => Ok(CipherSelection::Cipher(Cipher::aes_256_cbc())),
        "aes-128-ctr" => Ok(CipherSelection::Cipher(Cipher::aes_128_ctr())),
        "aes-192-ctr" => Ok(CipherSelection::Cipher(Cipher::aes_192_ctr())),
        "aes-256-ctr" => Ok(CipherSelection::Cipher(Cipher::aes_256_ctr())),
        "des-ede3-cbc" => Ok(CipherSelection::Cipher(Cipher::des_ede3_cbc())),
        other => Err(SnapvaultError::UnknownAlgorithm(other.to_string())),
    }
}
