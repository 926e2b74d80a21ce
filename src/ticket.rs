//! Ticket signature-header resolution and record codec.
//!
//! On the wire a ticket is a 4-byte big-endian signature-type tag, the
//! signature itself, alignment padding, and then the fixed 0x180-byte ticket
//! record. The header length is fully determined by the tag; nothing else in
//! the buffer can be read before the tag is resolved. The codec here is pure
//! struct marshalling and performs no cryptography.

use std::borrow::Cow;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::rights_id::{RightsId, RIGHTS_ID_SIZE};

/// Size of the fixed ticket record that follows the signature header.
pub const TICKET_RECORD_SIZE: usize = 0x180;

/// Size of the wrapped title-key field inside the record.
pub const TITLE_KEY_BLOCK_SIZE: usize = 0x100;

/// Property flag: the ticket is not persisted and is dropped on restart.
pub const PROPERTY_TEMPORARY: u16 = 1 << 4;

/// Signature algorithms a ticket can be signed with.
///
/// The discriminants are the big-endian tag values found at the start of a
/// ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SignatureType {
    Rsa4096Sha1 = 0x010000,
    Rsa2048Sha1 = 0x010001,
    EcdsaSha1 = 0x010002,
    Rsa4096Sha256 = 0x010003,
    Rsa2048Sha256 = 0x010004,
    EcdsaSha256 = 0x010005,
    HmacSha1160 = 0x010006,
}

impl SignatureType {
    /// Total signature-header length: tag, signature bytes, and the padding
    /// that aligns the record to a 0x40 boundary.
    pub fn header_len(self) -> usize {
        match self {
            SignatureType::Rsa4096Sha1 | SignatureType::Rsa4096Sha256 => 0x240,
            SignatureType::Rsa2048Sha1 | SignatureType::Rsa2048Sha256 => 0x140,
            SignatureType::EcdsaSha1 | SignatureType::EcdsaSha256 => 0x80,
            SignatureType::HmacSha1160 => 0x40,
        }
    }

    /// Map a raw tag value to a signature type.
    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            0x010000 => Ok(SignatureType::Rsa4096Sha1),
            0x010001 => Ok(SignatureType::Rsa2048Sha1),
            0x010002 => Ok(SignatureType::EcdsaSha1),
            0x010003 => Ok(SignatureType::Rsa4096Sha256),
            0x010004 => Ok(SignatureType::Rsa2048Sha256),
            0x010005 => Ok(SignatureType::EcdsaSha256),
            0x010006 => Ok(SignatureType::HmacSha1160),
            _ => Err(Error::InvalidTicketVersion(tag)),
        }
    }
}

/// Read the leading tag and return the offset of the ticket record.
///
/// Also verifies that a full record fits in the buffer past that offset.
pub fn resolve_body_offset(ticket: &[u8]) -> Result<usize> {
    if ticket.len() < 4 {
        return Err(Error::Truncated {
            needed: 4,
            got: ticket.len(),
        });
    }
    let tag = BigEndian::read_u32(&ticket[..4]);
    let offset = SignatureType::from_tag(tag)?.header_len();
    let needed = offset + TICKET_RECORD_SIZE;
    if ticket.len() < needed {
        return Err(Error::Truncated {
            needed,
            got: ticket.len(),
        });
    }
    Ok(offset)
}

/// How the title key inside a ticket is wrapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum TitleKeyType {
    /// Console-independent; wrapped with a generation-specific master key.
    #[default]
    Common = 0,
    /// Bound to one console; wrapped with that console's RSA key.
    Personalized = 1,
}

impl TryFrom<u8> for TitleKeyType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(TitleKeyType::Common),
            1 => Ok(TitleKeyType::Personalized),
            _ => Err(Error::InvalidTicketKeyType(value)),
        }
    }
}

impl From<TitleKeyType> for u8 {
    fn from(kind: TitleKeyType) -> Self {
        kind as u8
    }
}

/// The fixed-layout semantic payload of a ticket.
///
/// Multi-byte integers are big-endian on the wire. The two reserved regions
/// are carried through decode/encode verbatim so that re-encoding a real
/// ticket is byte-faithful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRecord {
    /// Signing-authority string, NUL-padded to 64 bytes.
    pub issuer: [u8; 0x40],
    /// Wrapped title key. Only the first 16 bytes are meaningful for a
    /// common ticket; a personalized ticket uses the whole block.
    pub title_key_block: [u8; TITLE_KEY_BLOCK_SIZE],
    /// Record format version.
    pub format_version: u8,
    /// How `title_key_block` is wrapped.
    pub title_key_type: TitleKeyType,
    pub ticket_version: u16,
    pub license_type: u8,
    /// Which master-key generation wraps the title key.
    pub master_key_revision: u8,
    /// Property flags, see [`PROPERTY_TEMPORARY`].
    pub properties: u16,
    reserved1: [u8; 8],
    /// Identifier of this ticket; zero for a valid common ticket.
    pub ticket_id: u64,
    /// Console the ticket is bound to; zero for a valid common ticket.
    pub device_id: u64,
    /// Content this ticket authorizes.
    pub rights_id: RightsId,
    /// Owning account; zero for a valid common ticket.
    pub account_id: u32,
    reserved2: [u8; 0xC],
}

impl Default for TicketRecord {
    fn default() -> Self {
        Self {
            issuer: [0; 0x40],
            title_key_block: [0; TITLE_KEY_BLOCK_SIZE],
            format_version: 0,
            title_key_type: TitleKeyType::Common,
            ticket_version: 0,
            license_type: 0,
            master_key_revision: 0,
            properties: 0,
            reserved1: [0; 8],
            ticket_id: 0,
            device_id: 0,
            rights_id: RightsId::default(),
            account_id: 0,
            reserved2: [0; 0xC],
        }
    }
}

impl TicketRecord {
    /// Read a record from `buf` starting at `offset`.
    ///
    /// Rejects a title-key type outside the defined set before any key
    /// material is looked at.
    pub fn decode(buf: &[u8], offset: usize) -> Result<Self> {
        let body = offset
            .checked_add(TICKET_RECORD_SIZE)
            .and_then(|end| buf.get(offset..end))
            .ok_or(Error::Truncated {
                needed: offset.saturating_add(TICKET_RECORD_SIZE),
                got: buf.len(),
            })?;

        let mut issuer = [0u8; 0x40];
        issuer.copy_from_slice(&body[0x000..0x040]);
        let mut title_key_block = [0u8; TITLE_KEY_BLOCK_SIZE];
        title_key_block.copy_from_slice(&body[0x040..0x140]);
        let format_version = body[0x140];
        let title_key_type = TitleKeyType::try_from(body[0x141])?;
        let ticket_version = BigEndian::read_u16(&body[0x142..0x144]);
        let license_type = body[0x144];
        let master_key_revision = body[0x145];
        let properties = BigEndian::read_u16(&body[0x146..0x148]);
        let mut reserved1 = [0u8; 8];
        reserved1.copy_from_slice(&body[0x148..0x150]);
        let ticket_id = BigEndian::read_u64(&body[0x150..0x158]);
        let device_id = BigEndian::read_u64(&body[0x158..0x160]);
        let mut rights_id = [0u8; RIGHTS_ID_SIZE];
        rights_id.copy_from_slice(&body[0x160..0x170]);
        let account_id = BigEndian::read_u32(&body[0x170..0x174]);
        let mut reserved2 = [0u8; 0xC];
        reserved2.copy_from_slice(&body[0x174..0x180]);

        Ok(Self {
            issuer,
            title_key_block,
            format_version,
            title_key_type,
            ticket_version,
            license_type,
            master_key_revision,
            properties,
            reserved1,
            ticket_id,
            device_id,
            rights_id: RightsId::from(rights_id),
            account_id,
            reserved2,
        })
    }

    /// Write this record into `buf` at `offset`.
    ///
    /// Exactly [`TICKET_RECORD_SIZE`] bytes are written; everything outside
    /// that range, and the buffer length, are left untouched.
    pub fn encode(&self, buf: &mut [u8], offset: usize) -> Result<()> {
        let len = buf.len();
        let body = offset
            .checked_add(TICKET_RECORD_SIZE)
            .and_then(|end| buf.get_mut(offset..end))
            .ok_or(Error::Truncated {
                needed: offset.saturating_add(TICKET_RECORD_SIZE),
                got: len,
            })?;

        body[0x000..0x040].copy_from_slice(&self.issuer);
        body[0x040..0x140].copy_from_slice(&self.title_key_block);
        body[0x140] = self.format_version;
        body[0x141] = self.title_key_type.into();
        BigEndian::write_u16(&mut body[0x142..0x144], self.ticket_version);
        body[0x144] = self.license_type;
        body[0x145] = self.master_key_revision;
        BigEndian::write_u16(&mut body[0x146..0x148], self.properties);
        body[0x148..0x150].copy_from_slice(&self.reserved1);
        BigEndian::write_u64(&mut body[0x150..0x158], self.ticket_id);
        BigEndian::write_u64(&mut body[0x158..0x160], self.device_id);
        body[0x160..0x170].copy_from_slice(self.rights_id.as_bytes());
        BigEndian::write_u32(&mut body[0x170..0x174], self.account_id);
        body[0x174..0x180].copy_from_slice(&self.reserved2);
        Ok(())
    }

    /// Issuer as text, trimmed at the first NUL.
    pub fn issuer_str(&self) -> Cow<'_, str> {
        let end = self
            .issuer
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.issuer.len());
        String::from_utf8_lossy(&self.issuer[..end])
    }

    /// Whether the temporary property bit is set.
    pub fn is_temporary(&self) -> bool {
        self.properties & PROPERTY_TEMPORARY != 0
    }

    /// Effective key generation for this ticket.
    ///
    /// The generation is stored twice: as `master_key_revision` and as the
    /// final byte of the rights id. A nonzero revision below the rights-id
    /// generation can never unwrap that content and is rejected; otherwise
    /// the higher of the two wins (legacy tickets leave one of them zero).
    pub fn key_generation(&self) -> Result<u8> {
        let revision = self.master_key_revision;
        let rights_generation = self.rights_id.key_generation();
        if revision != 0 && revision < rights_generation {
            return Err(Error::InvalidTicketKeyRevision(revision));
        }
        Ok(revision.max(rights_generation))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        resolve_body_offset, SignatureType, TicketRecord, TitleKeyType, PROPERTY_TEMPORARY,
        TICKET_RECORD_SIZE,
    };
    use crate::error::Error;
    use crate::rights_id::RightsId;

    fn sample_record() -> TicketRecord {
        let mut record = TicketRecord::default();
        record.issuer[..16].copy_from_slice(b"Root-CA-XS000000");
        record.title_key_block[..4].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        record.format_version = 2;
        record.title_key_type = TitleKeyType::Personalized;
        record.ticket_version = 0x0102;
        record.license_type = 1;
        record.master_key_revision = 5;
        record.properties = PROPERTY_TEMPORARY | 1;
        record.ticket_id = 0x1122334455667788;
        record.device_id = 0x99aabbccddeeff00;
        record.rights_id = "01006a800016e0000000000000000005".parse().unwrap();
        record.account_id = 0xcafebabe;
        record
    }

    #[test]
    fn header_lengths_per_tag() {
        let cases = [
            (0x010000, 0x240),
            (0x010001, 0x140),
            (0x010002, 0x80),
            (0x010003, 0x240),
            (0x010004, 0x140),
            (0x010005, 0x80),
            (0x010006, 0x40),
        ];
        for (tag, len) in cases {
            let ty = SignatureType::from_tag(tag).expect("defined tag");
            assert_eq!(ty.header_len(), len, "tag {tag:#x}");
        }
    }

    #[test]
    fn unknown_tag_is_invalid_version() {
        match SignatureType::from_tag(0x020000) {
            Err(Error::InvalidTicketVersion(0x020000)) => {}
            other => panic!("expected InvalidTicketVersion, got {other:?}"),
        }
    }

    #[test]
    fn resolve_checks_record_fits() {
        // RSA-2048/SHA-256 header but no room for the record after it.
        let mut buf = vec![0u8; 0x140 + TICKET_RECORD_SIZE - 1];
        buf[..4].copy_from_slice(&0x010004u32.to_be_bytes());
        match resolve_body_offset(&buf) {
            Err(Error::Truncated { needed, got }) => {
                assert_eq!(needed, 0x140 + TICKET_RECORD_SIZE);
                assert_eq!(got, buf.len());
            }
            other => panic!("expected Truncated, got {other:?}"),
        }

        buf.push(0);
        assert_eq!(resolve_body_offset(&buf).expect("fits now"), 0x140);
    }

    #[test]
    fn record_size_is_pinned() {
        let mut buf = vec![0u8; TICKET_RECORD_SIZE];
        sample_record().encode(&mut buf, 0).expect("encode");
        // One byte short must fail: the layout fills the full 0x180.
        let mut short = vec![0u8; TICKET_RECORD_SIZE - 1];
        assert!(sample_record().encode(&mut short, 0).is_err());
    }

    #[test]
    fn codec_roundtrip() {
        let record = sample_record();
        let offset = 0x40;
        let mut buf = vec![0u8; offset + TICKET_RECORD_SIZE + 8];
        record.encode(&mut buf, offset).expect("encode");
        let decoded = TicketRecord::decode(&buf, offset).expect("decode");
        assert_eq!(decoded, record);
    }

    #[test]
    fn encode_preserves_surrounding_bytes() {
        let record = sample_record();
        let offset = 0x10;
        let mut buf = vec![0xa5u8; offset + TICKET_RECORD_SIZE + 0x20];
        record.encode(&mut buf, offset).expect("encode");
        assert!(buf[..offset].iter().all(|&b| b == 0xa5));
        assert!(buf[offset + TICKET_RECORD_SIZE..].iter().all(|&b| b == 0xa5));
    }

    #[test]
    fn reserved_bytes_roundtrip_verbatim() {
        let mut buf = vec![0u8; TICKET_RECORD_SIZE];
        sample_record().encode(&mut buf, 0).expect("encode");
        // Scribble over both reserved regions as a real ticket might.
        buf[0x148..0x150].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        buf[0x174..0x180].copy_from_slice(&[9; 0xC]);

        let decoded = TicketRecord::decode(&buf, 0).expect("decode");
        let mut reencoded = vec![0u8; TICKET_RECORD_SIZE];
        decoded.encode(&mut reencoded, 0).expect("encode");
        assert_eq!(reencoded, buf);
    }

    #[test]
    fn invalid_title_key_type_rejected_at_decode() {
        let mut buf = vec![0u8; TICKET_RECORD_SIZE];
        TicketRecord::default().encode(&mut buf, 0).expect("encode");
        buf[0x141] = 7;
        match TicketRecord::decode(&buf, 0) {
            Err(Error::InvalidTicketKeyType(7)) => {}
            other => panic!("expected InvalidTicketKeyType, got {other:?}"),
        }
    }

    #[test]
    fn key_generation_consistency() {
        let mut record = TicketRecord::default();
        record.master_key_revision = 5;
        record.rights_id = RightsId::from([0; 16]);
        assert_eq!(record.key_generation().unwrap(), 5);

        let mut id = [0u8; 16];
        id[15] = 5;
        record.rights_id = RightsId::from(id);
        assert_eq!(record.key_generation().unwrap(), 5);

        // Legacy: zero revision, generation carried by the rights id alone.
        record.master_key_revision = 0;
        assert_eq!(record.key_generation().unwrap(), 5);

        // A nonzero revision below the rights-id generation is unusable.
        record.master_key_revision = 3;
        assert!(matches!(
            record.key_generation(),
            Err(Error::InvalidTicketKeyRevision(3))
        ));
    }

    #[test]
    fn issuer_text_stops_at_nul() {
        let record = sample_record();
        assert_eq!(record.issuer_str(), "Root-CA-XS000000");
        assert!(record.is_temporary());
    }
}
