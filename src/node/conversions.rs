//! Conversions between the wire messages and the domain types. Positions are
//! always re-derived from the endpoint so a peer cannot claim an arbitrary id.

use crate::node::finger_entry::FingerEntry;
use crate::node::successor_list::SuccessorList;
use crate::threads::chord::chord_proto::{AddressMsg, FingerEntryMsg, HashPosMsg, SuccessorListMsg};
use crate::utils::crypto::HashPos;
use crate::utils::types::Address;

impl From<Address> for AddressMsg {
    fn from(address: Address) -> AddressMsg {
        AddressMsg { address }
    }
}

impl From<&Address> for AddressMsg {
    fn from(address: &Address) -> AddressMsg {
        AddressMsg {
            address: address.clone(),
        }
    }
}

impl From<AddressMsg> for Address {
    fn from(msg: AddressMsg) -> Address {
        msg.address
    }
}

impl From<HashPos> for HashPosMsg {
    fn from(pos: HashPos) -> HashPosMsg {
        HashPosMsg {
            key: pos.to_be_bytes().to_vec(),
        }
    }
}

impl From<FingerEntry> for FingerEntryMsg {
    fn from(entry: FingerEntry) -> FingerEntryMsg {
        FingerEntryMsg {
            id: entry.pos.to_be_bytes().to_vec(),
            address: entry.address,
        }
    }
}

impl From<&FingerEntry> for FingerEntryMsg {
    fn from(entry: &FingerEntry) -> FingerEntryMsg {
        entry.clone().into()
    }
}

impl From<AddressMsg> for FingerEntry {
    fn from(msg: AddressMsg) -> FingerEntry {
        FingerEntry::new(&msg.address)
    }
}

impl From<FingerEntryMsg> for FingerEntry {
    fn from(msg: FingerEntryMsg) -> FingerEntry {
        FingerEntry::new(&msg.address)
    }
}

impl From<&SuccessorList> for SuccessorListMsg {
    fn from(list: &SuccessorList) -> SuccessorListMsg {
        SuccessorListMsg {
            successors: list.successors.iter().map(AddressMsg::from).collect(),
        }
    }
}
