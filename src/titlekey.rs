//! Title-key recovery.
//!
//! A common ticket wraps its 16-byte title key as a single AES-128 block
//! under the master key of its generation. A personalized ticket wraps it
//! with RSA-2048 OAEP under one console's device key. Both paths end in the
//! same place: a plaintext title key packaged with the rights id it
//! decrypts.

use std::fmt;

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use rsa::Oaep;
use sha2::Sha256;

use crate::error::{Error, Result};
use crate::keys::{KeyProvider, AES_128_KEY_SIZE};
use crate::rights_id::RightsId;
use crate::ticket::{TicketRecord, TitleKeyType};

/// A recovered title key and the rights id it decrypts content for.
///
/// Owned by the caller once returned; the crate keeps no copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEntry {
    pub rights_id: RightsId,
    pub key: [u8; AES_128_KEY_SIZE],
}

impl fmt::Display for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.rights_id, hex::encode(self.key))
    }
}

/// Decrypt a detached common title key with the master key for
/// `key_generation`.
///
/// Fails with [`Error::InvalidTicketKeyRevision`] when the table has no key
/// for that generation; the ciphertext is not touched in that case.
pub fn decrypt_title_key(
    encrypted: &[u8; AES_128_KEY_SIZE],
    key_generation: u8,
    keys: &impl KeyProvider,
) -> Result<[u8; AES_128_KEY_SIZE]> {
    let master_key = keys
        .master_key(key_generation)
        .ok_or(Error::InvalidTicketKeyRevision(key_generation))?;
    let cipher = Aes128::new(&master_key.into());
    let mut block = aes::Block::clone_from_slice(encrypted);
    cipher.decrypt_block(&mut block);
    Ok(block.into())
}

/// Wrap a plaintext title key under the master key for `key_generation`.
///
/// Inverse of [`decrypt_title_key`], with the same lookup and failure
/// policy. Used when rewriting a personalized ticket as a common one.
pub fn encrypt_title_key(
    key: &[u8; AES_128_KEY_SIZE],
    key_generation: u8,
    keys: &impl KeyProvider,
) -> Result<[u8; AES_128_KEY_SIZE]> {
    let master_key = keys
        .master_key(key_generation)
        .ok_or(Error::InvalidTicketKeyRevision(key_generation))?;
    let cipher = Aes128::new(&master_key.into());
    let mut block = aes::Block::clone_from_slice(key);
    cipher.encrypt_block(&mut block);
    Ok(block.into())
}

/// Recover the plaintext title key protected by a ticket record.
pub fn unwrap_title_key(record: &TicketRecord, keys: &impl KeyProvider) -> Result<KeyEntry> {
    let key = match record.title_key_type {
        TitleKeyType::Common => {
            let generation = record.key_generation()?;
            let mut wrapped = [0u8; AES_128_KEY_SIZE];
            wrapped.copy_from_slice(&record.title_key_block[..AES_128_KEY_SIZE]);
            decrypt_title_key(&wrapped, generation, keys)?
        }
        TitleKeyType::Personalized => {
            let device_key = keys
                .device_key(record.device_id)
                .ok_or(Error::DeviceKeyNotFound(record.device_id))?;
            let payload = device_key
                .private_key()
                .decrypt(Oaep::new::<Sha256>(), &record.title_key_block)?;
            payload
                .as_slice()
                .try_into()
                .map_err(|_| Error::MalformedKeyData("personalized title key must be 16 bytes"))?
        }
    };

    debug!(
        "recovered {:?} title key for {}",
        record.title_key_type, record.rights_id
    );
    Ok(KeyEntry {
        rights_id: record.rights_id,
        key,
    })
}

#[cfg(test)]
mod tests {
    use rsa::rand_core::OsRng;
    use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
    use sha2::Sha256;

    use super::{decrypt_title_key, encrypt_title_key, unwrap_title_key};
    use crate::error::Error;
    use crate::keys::{DeviceRsaKey, KeySet};
    use crate::ticket::{TicketRecord, TitleKeyType};

    // FIPS-197 appendix C.1.
    const FIPS_KEY: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
        0x0e, 0x0f,
    ];
    const FIPS_PLAINTEXT: [u8; 16] = [
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
        0xee, 0xff,
    ];
    const FIPS_CIPHERTEXT: [u8; 16] = [
        0x69, 0xc4, 0xe0, 0xd8, 0x6a, 0x7b, 0x04, 0x30, 0xd8, 0xcd, 0xb7, 0x80, 0x70, 0xb4,
        0xc5, 0x5a,
    ];

    fn generation_zero_keys() -> KeySet {
        let mut keys = KeySet::new();
        keys.set_master_key(0, FIPS_KEY).unwrap();
        keys
    }

    #[test]
    fn detached_decrypt_matches_known_vector() {
        let keys = generation_zero_keys();
        let plain = decrypt_title_key(&FIPS_CIPHERTEXT, 0, &keys).expect("decrypt");
        assert_eq!(plain, FIPS_PLAINTEXT);
    }

    #[test]
    fn encrypt_is_inverse_of_decrypt() {
        let keys = generation_zero_keys();
        let wrapped = encrypt_title_key(&FIPS_PLAINTEXT, 0, &keys).expect("encrypt");
        assert_eq!(wrapped, FIPS_CIPHERTEXT);
        assert_eq!(
            decrypt_title_key(&wrapped, 0, &keys).expect("decrypt"),
            FIPS_PLAINTEXT
        );
    }

    #[test]
    fn common_unwrap_end_to_end() {
        let keys = generation_zero_keys();
        let mut record = TicketRecord::default();
        record.title_key_block[..16].copy_from_slice(&FIPS_CIPHERTEXT);
        record.rights_id = "01006a800016e0000000000000000000".parse().unwrap();

        let entry = unwrap_title_key(&record, &keys).expect("unwrap");
        assert_eq!(entry.key, FIPS_PLAINTEXT);
        assert_eq!(entry.rights_id, record.rights_id);
        assert_eq!(
            entry.to_string(),
            "01006a800016e0000000000000000000=00112233445566778899aabbccddeeff"
        );
    }

    #[test]
    fn missing_generation_is_reported() {
        let keys = generation_zero_keys();
        let mut record = TicketRecord::default();
        record.master_key_revision = 9;
        let mut id = [0u8; 16];
        id[15] = 9;
        record.rights_id = id.into();
        record.title_key_block[..16].copy_from_slice(&FIPS_CIPHERTEXT);

        match unwrap_title_key(&record, &keys) {
            Err(Error::InvalidTicketKeyRevision(9)) => {}
            other => panic!("expected InvalidTicketKeyRevision, got {other:?}"),
        }
    }

    #[test]
    fn personalized_unwrap_roundtrip() {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).expect("generate key");
        let public_key = RsaPublicKey::from(&private_key);

        let mut keys = KeySet::new();
        keys.add_device_key(DeviceRsaKey::new(0xdead_0001, private_key));

        let wrapped = public_key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &FIPS_PLAINTEXT)
            .expect("wrap");

        let mut record = TicketRecord::default();
        record.title_key_type = TitleKeyType::Personalized;
        record.device_id = 0xdead_0001;
        record.title_key_block.copy_from_slice(&wrapped);

        let entry = unwrap_title_key(&record, &keys).expect("unwrap");
        assert_eq!(entry.key, FIPS_PLAINTEXT);
    }

    #[test]
    fn personalized_unwrap_needs_device_key() {
        let keys = KeySet::new();
        let mut record = TicketRecord::default();
        record.title_key_type = TitleKeyType::Personalized;
        record.device_id = 42;

        match unwrap_title_key(&record, &keys) {
            Err(Error::DeviceKeyNotFound(42)) => {}
            other => panic!("expected DeviceKeyNotFound, got {other:?}"),
        }
    }

    #[test]
    fn personalized_payload_must_be_key_sized() {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).expect("generate key");
        let public_key = RsaPublicKey::from(&private_key);

        let mut keys = KeySet::new();
        keys.add_device_key(DeviceRsaKey::new(1, private_key));

        let wrapped = public_key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), b"short")
            .expect("wrap");

        let mut record = TicketRecord::default();
        record.title_key_type = TitleKeyType::Personalized;
        record.device_id = 1;
        record.title_key_block.copy_from_slice(&wrapped);

        assert!(matches!(
            unwrap_title_key(&record, &keys),
            Err(Error::MalformedKeyData(_))
        ));
    }
}
