//! Rewriting tickets as console-independent common tickets.
//!
//! Patching strips the console binding from a ticket in place: ids are
//! zeroed, the temporary flag is cleared, and a personalized title key is
//! unwrapped with the device RSA key and re-wrapped under a master key so
//! the result installs anywhere. The buffer length never changes.

use crate::error::{Error, Result};
use crate::keys::{KeyProvider, AES_128_KEY_SIZE};
use crate::rights_id::RightsId;
use crate::ticket::{self, TicketRecord, TitleKeyType, PROPERTY_TEMPORARY, TITLE_KEY_BLOCK_SIZE};
use crate::titlekey::{self, KeyEntry};

/// Which master-key generation a personalized ticket is re-encrypted under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyGenerationPolicy {
    /// Keep the generation the ticket already names.
    #[default]
    KeepRevision,
    /// Re-target the newest generation the key table has.
    Newest,
}

/// Patch a ticket in place, keeping its key generation.
///
/// Returns the recovered title key. See [`patch_ticket_with`].
pub fn patch_ticket(ticket: &mut [u8], keys: &impl KeyProvider) -> Result<KeyEntry> {
    patch_ticket_with(ticket, keys, KeyGenerationPolicy::KeepRevision)
}

/// Patch a ticket in place.
///
/// Zeroes `ticket_id`, `device_id` and `account_id`, clears the temporary
/// property bit, and converts a personalized ticket to a common one by
/// re-wrapping its title key under the master key selected by `policy`.
/// After re-encoding, the record is decoded again and its rights id checked
/// against the recovered key's target; a mismatch is surfaced as
/// [`Error::InvalidTicketBadRightsId`]. Patching an already-patched buffer
/// is a byte-for-byte no-op.
pub fn patch_ticket_with(
    ticket: &mut [u8],
    keys: &impl KeyProvider,
    policy: KeyGenerationPolicy,
) -> Result<KeyEntry> {
    patch_impl(ticket, keys, policy, None)
}

/// Patch a ticket that is expected to authorize `expected`.
///
/// Rejects with [`Error::InvalidTicketBadRightsId`] before rewriting
/// anything when the ticket names a different rights id — a ticket fetched
/// under the wrong name, for instance.
pub fn patch_ticket_expecting(
    ticket: &mut [u8],
    expected: &RightsId,
    keys: &impl KeyProvider,
) -> Result<KeyEntry> {
    patch_impl(ticket, keys, KeyGenerationPolicy::KeepRevision, Some(expected))
}

fn patch_impl(
    ticket: &mut [u8],
    keys: &impl KeyProvider,
    policy: KeyGenerationPolicy,
    expected: Option<&RightsId>,
) -> Result<KeyEntry> {
    let offset = ticket::resolve_body_offset(ticket)?;
    let mut record = TicketRecord::decode(ticket, offset)?;

    if let Some(expected) = expected {
        if record.rights_id != *expected {
            return Err(Error::InvalidTicketBadRightsId);
        }
    }

    // Recover the key before stripping the binding: the personalized path
    // needs `device_id` to find the console's RSA key.
    let entry = titlekey::unwrap_title_key(&record, keys)?;

    record.ticket_id = 0;
    record.device_id = 0;
    record.account_id = 0;
    record.properties &= !PROPERTY_TEMPORARY;

    if record.title_key_type == TitleKeyType::Personalized {
        let generation = match policy {
            KeyGenerationPolicy::KeepRevision => record.key_generation()?,
            KeyGenerationPolicy::Newest => keys
                .highest_master_key_revision()
                .ok_or(Error::InvalidTicketKeyRevision(record.master_key_revision))?,
        };
        let rewrapped = titlekey::encrypt_title_key(&entry.key, generation, keys)?;
        record.title_key_block = [0u8; TITLE_KEY_BLOCK_SIZE];
        record.title_key_block[..AES_128_KEY_SIZE].copy_from_slice(&rewrapped);
        record.title_key_type = TitleKeyType::Common;
        record.master_key_revision = generation;
        debug!(
            "converted personalized ticket for {} to common, generation {}",
            record.rights_id, generation
        );
    }

    record.encode(ticket, offset)?;

    // The rewritten record must still authorize the content the recovered
    // key belongs to.
    let reparsed = TicketRecord::decode(ticket, offset)?;
    if reparsed.rights_id != entry.rights_id {
        return Err(Error::InvalidTicketBadRightsId);
    }
    Ok(entry)
}
