//! Boundary to the platform ticket service.
//!
//! The service that imports, lists, and serves raw ticket bytes lives
//! outside this crate (it is IPC on a real console). This module only pins
//! down the seam the core consumes, plus an in-memory implementation for
//! tests and offline tooling.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::keys::KeyProvider;
use crate::patch::patch_ticket_expecting;
use crate::rights_id::RightsId;
use crate::ticket::{self, TicketRecord};
use crate::titlekey::KeyEntry;

/// The platform ticket-service surface this crate consumes.
pub trait TicketStore {
    /// Rights ids of all installed common tickets.
    fn common_rights_ids(&self) -> Result<Vec<RightsId>>;

    /// Raw ticket bytes for one rights id.
    fn ticket_data(&self, rights_id: &RightsId) -> Result<Vec<u8>>;

    /// Accept a ticket and its certificate chain for import.
    fn import(&mut self, ticket: &[u8], certificate: &[u8]) -> Result<()>;
}

/// Ticket store backed by a map, for tests and offline workflows.
#[derive(Debug, Default)]
pub struct MemoryTicketStore {
    tickets: BTreeMap<RightsId, Vec<u8>>,
    certificates: BTreeMap<RightsId, Vec<u8>>,
}

impl MemoryTicketStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert raw ticket bytes under an explicit rights id, bypassing
    /// validation. Useful for staging malformed fixtures.
    pub fn insert_raw(&mut self, rights_id: RightsId, ticket: Vec<u8>) {
        self.tickets.insert(rights_id, ticket);
    }

    /// Certificate chain imported alongside a ticket, if any.
    pub fn certificate_data(&self, rights_id: &RightsId) -> Option<&[u8]> {
        self.certificates.get(rights_id).map(Vec::as_slice)
    }
}

impl TicketStore for MemoryTicketStore {
    fn common_rights_ids(&self) -> Result<Vec<RightsId>> {
        Ok(self.tickets.keys().copied().collect())
    }

    fn ticket_data(&self, rights_id: &RightsId) -> Result<Vec<u8>> {
        self.tickets
            .get(rights_id)
            .cloned()
            .ok_or(Error::TicketNotFound(*rights_id))
    }

    fn import(&mut self, ticket: &[u8], certificate: &[u8]) -> Result<()> {
        let offset = ticket::resolve_body_offset(ticket)?;
        let record = TicketRecord::decode(ticket, offset)?;
        self.tickets.insert(record.rights_id, ticket.to_vec());
        self.certificates
            .insert(record.rights_id, certificate.to_vec());
        Ok(())
    }
}

/// Patch every common ticket in `store`, continuing past failures.
///
/// Each listed ticket is fetched, patched against its own rights id, and
/// returned with the recovered key. A ticket that fails contributes its
/// error to the result instead of aborting the batch; only a failure to
/// list the store at all is fatal.
pub fn patch_common_tickets(
    store: &impl TicketStore,
    keys: &impl KeyProvider,
) -> Result<Vec<(RightsId, Result<(Vec<u8>, KeyEntry)>)>> {
    let ids = store.common_rights_ids()?;
    let mut results = Vec::with_capacity(ids.len());
    for rights_id in ids {
        let outcome = store.ticket_data(&rights_id).and_then(|mut bytes| {
            let entry = patch_ticket_expecting(&mut bytes, &rights_id, keys)?;
            Ok((bytes, entry))
        });
        if let Err(ref err) = outcome {
            warn!("skipping ticket for {rights_id}: {err}");
        }
        results.push((rights_id, outcome));
    }
    Ok(results)
}
