//! Key material: the injected key table and console RSA device keys.
//!
//! The crate never owns persistent key storage. Callers supply a
//! [`KeyProvider`] — per-generation master keys plus any device RSA keys —
//! and every ticket operation reads it immutably, so one table can back any
//! number of concurrent unwraps. [`KeySet`] is the bundled implementation;
//! it loads from `name = hexvalue` text key files.

use std::io::{BufRead, BufReader, Read};

use aes::cipher::{KeyIvInit, StreamCipher};
use byteorder::{BigEndian, ByteOrder};
use rsa::{BigUint, RsaPrivateKey};

use crate::error::{Error, Result};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// Byte length of an AES-128 key.
pub const AES_128_KEY_SIZE: usize = 16;

/// Maximum number of master-key generations understood by this library.
pub const MAX_KEY_GENERATION: usize = 32;

/// Wire size of a device RSA key record.
pub const DEVICE_RSA_KEY_SIZE: usize = 0x240;

/// The only public exponent valid for device RSA keys.
const DEVICE_RSA_PUBLIC_EXPONENT: u32 = 0x10001;

/// Read-only source of ticket key material.
///
/// Implementations must tolerate concurrent readers; every method takes
/// `&self` and lookups never mutate.
pub trait KeyProvider {
    /// Master key for one key generation, if known.
    fn master_key(&self, revision: u8) -> Option<[u8; AES_128_KEY_SIZE]>;

    /// Device RSA key matching a console's device id, if known.
    fn device_key(&self, device_id: u64) -> Option<&DeviceRsaKey>;

    /// Highest generation [`KeyProvider::master_key`] would succeed for.
    fn highest_master_key_revision(&self) -> Option<u8>;
}

/// A console's RSA-2048 eTicket key, parsed from its 0x240-byte record.
///
/// Wire layout: 16-byte AES counter, 0x100-byte private exponent, 0x100-byte
/// modulus, 4-byte public exponent, padding, device id, GHASH. At rest,
/// everything after the counter is AES-128-CTR encrypted under a device-key
/// kek with the counter as nonce.
#[derive(Debug)]
pub struct DeviceRsaKey {
    device_id: u64,
    private_key: RsaPrivateKey,
}

impl DeviceRsaKey {
    /// Build a device key from already-parsed parts.
    pub fn new(device_id: u64, private_key: RsaPrivateKey) -> Self {
        Self {
            device_id,
            private_key,
        }
    }

    /// Console this key belongs to.
    pub fn device_id(&self) -> u64 {
        self.device_id
    }

    /// The RSA private key used to unwrap personalized title keys.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// Parse a plaintext device key record.
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        if blob.len() != DEVICE_RSA_KEY_SIZE {
            return Err(Error::MalformedKeyData("device key record must be 0x240 bytes"));
        }
        let private_exponent = &blob[0x010..0x110];
        let modulus = &blob[0x110..0x210];
        let public_exponent = BigEndian::read_u32(&blob[0x210..0x214]);
        if public_exponent != DEVICE_RSA_PUBLIC_EXPONENT {
            return Err(Error::MalformedKeyData("unexpected device key public exponent"));
        }
        let device_id = BigEndian::read_u64(&blob[0x228..0x230]);

        // The record stores only n/e/d; the rsa crate recovers the factors.
        let private_key = RsaPrivateKey::from_components(
            BigUint::from_bytes_be(modulus),
            BigUint::from(public_exponent),
            BigUint::from_bytes_be(private_exponent),
            Vec::new(),
        )?;

        Ok(Self {
            device_id,
            private_key,
        })
    }

    /// Decrypt an at-rest device key record under `kek` and parse it.
    pub fn from_encrypted_blob(blob: &[u8], kek: &[u8; AES_128_KEY_SIZE]) -> Result<Self> {
        if blob.len() != DEVICE_RSA_KEY_SIZE {
            return Err(Error::MalformedKeyData("device key record must be 0x240 bytes"));
        }
        let mut nonce = [0u8; AES_128_KEY_SIZE];
        nonce.copy_from_slice(&blob[..AES_128_KEY_SIZE]);

        let mut plain = blob.to_vec();
        let mut cipher = Aes128Ctr::new(kek.into(), &nonce.into());
        cipher.apply_keystream(&mut plain[AES_128_KEY_SIZE..]);
        Self::from_blob(&plain)
    }
}

/// In-memory key table.
///
/// Master keys live in a fixed per-generation array; absent generations stay
/// [`None`] and lookups report the absence rather than producing garbage.
#[derive(Debug, Default)]
pub struct KeySet {
    master_keys: [Option<[u8; AES_128_KEY_SIZE]>; MAX_KEY_GENERATION],
    device_keys: Vec<DeviceRsaKey>,
    device_key_kek: Option<[u8; AES_128_KEY_SIZE]>,
}

impl KeySet {
    /// Create an empty key set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a master key for one generation.
    pub fn set_master_key(&mut self, revision: u8, key: [u8; AES_128_KEY_SIZE]) -> Result<()> {
        let slot = self
            .master_keys
            .get_mut(revision as usize)
            .ok_or(Error::MalformedKeyData("key generation out of range"))?;
        *slot = Some(key);
        Ok(())
    }

    /// The kek that protects device key records at rest.
    pub fn set_device_key_kek(&mut self, kek: [u8; AES_128_KEY_SIZE]) {
        self.device_key_kek = Some(kek);
    }

    /// Add an already-parsed device key.
    pub fn add_device_key(&mut self, key: DeviceRsaKey) {
        self.device_keys.push(key);
    }

    /// Parse a 0x240-byte device key record and add it.
    ///
    /// Uses the at-rest kek when one has been loaded, otherwise expects the
    /// record in plaintext.
    pub fn load_device_key_blob(&mut self, blob: &[u8]) -> Result<()> {
        let key = match self.device_key_kek {
            Some(ref kek) => DeviceRsaKey::from_encrypted_blob(blob, kek)?,
            None => DeviceRsaKey::from_blob(blob)?,
        };
        self.device_keys.push(key);
        Ok(())
    }

    /// Load keys from a `prod.keys`-style reader.
    ///
    /// Lines beginning with `;` or `#` and blank lines are ignored. Each
    /// valid line has the form `key_name = hexvalue`. Recognized names are
    /// `master_key_XX` (generation in hex) and `eticket_rsa_kek`; unknown
    /// names are silently skipped so key files can carry more than this
    /// library consumes.
    pub fn load<R: Read>(&mut self, reader: R) -> Result<()> {
        let buf = BufReader::new(reader);
        for line in buf.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();

            if name == "eticket_rsa_kek" {
                match decode_hex_key(value) {
                    Some(kek) => self.device_key_kek = Some(kek),
                    None => warn!("skipping malformed value for {name}"),
                }
                continue;
            }

            if let Some(gen_str) = name.strip_prefix("master_key_") {
                let Ok(revision) = usize::from_str_radix(gen_str, 16) else {
                    continue;
                };
                if revision >= MAX_KEY_GENERATION {
                    continue;
                }
                match decode_hex_key(value) {
                    Some(key) => self.master_keys[revision] = Some(key),
                    None => warn!("skipping malformed value for {name}"),
                }
            }
        }
        Ok(())
    }
}

impl KeyProvider for KeySet {
    fn master_key(&self, revision: u8) -> Option<[u8; AES_128_KEY_SIZE]> {
        self.master_keys.get(revision as usize).copied().flatten()
    }

    fn device_key(&self, device_id: u64) -> Option<&DeviceRsaKey> {
        self.device_keys.iter().find(|k| k.device_id == device_id)
    }

    fn highest_master_key_revision(&self) -> Option<u8> {
        (0..MAX_KEY_GENERATION)
            .rev()
            .find(|&r| self.master_keys[r].is_some())
            .map(|r| r as u8)
    }
}

fn decode_hex_key(value: &str) -> Option<[u8; AES_128_KEY_SIZE]> {
    let mut key = [0u8; AES_128_KEY_SIZE];
    hex::decode_to_slice(value, &mut key).ok()?;
    Some(key)
}
