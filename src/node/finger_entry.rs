use std::fmt;
use std::fmt::Debug;

use crate::utils::crypto::{hash, HashPos};
use crate::utils::types::Address;

/// A reference to a peer: its ring position and the gRPC endpoint the
/// position was derived from. Equality is by position.
#[derive(Clone, PartialEq, Eq)]
pub struct FingerEntry {
    pub pos: HashPos,
    pub address: Address,
}

impl FingerEntry {
    pub fn new(address: &Address) -> FingerEntry {
        FingerEntry {
            pos: hash(address.as_bytes()),
            address: address.clone(),
        }
    }
}

impl Debug for FingerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("")
            .field("pos", &self.pos)
            .field("address", &self.address)
            .finish()
    }
}
