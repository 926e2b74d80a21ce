//! Error types for rseticket.

use thiserror::Error;

use crate::rights_id::RightsId;

/// Main error type for rseticket operations.
///
/// Every failure is terminal for the ticket being processed; nothing in this
/// crate retries or substitutes defaults.
#[derive(Debug, Error)]
pub enum Error {
    /// The leading signature-type tag is not one of the defined values.
    #[error("Unrecognized ticket signature type: {0:#010x}")]
    InvalidTicketVersion(u32),

    /// The title-key type is neither Common nor Personalized.
    #[error("Invalid title key type: {0}")]
    InvalidTicketKeyType(u8),

    /// The ticket names a key generation the key table does not have, or its
    /// master-key revision contradicts the rights-id generation byte.
    #[error("Invalid key generation {0}")]
    InvalidTicketKeyRevision(u8),

    /// The ticket's rights id does not match the content it was expected to
    /// authorize.
    #[error("Ticket rights id mismatch")]
    InvalidTicketBadRightsId,

    /// The buffer ended before the structure it should contain.
    #[error("Ticket truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    /// A personalized ticket references a device the key table has no RSA
    /// key for.
    #[error("No device RSA key for device id {0:#018x}")]
    DeviceKeyNotFound(u64),

    /// No ticket is installed for the requested rights id.
    #[error("No ticket for rights id {0}")]
    TicketNotFound(RightsId),

    /// A key blob or key-file entry is structurally invalid.
    #[error("Malformed key data: {0}")]
    MalformedKeyData(&'static str),

    /// RSA error.
    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for rseticket operations.
pub type Result<T> = std::result::Result<T, Error>;
