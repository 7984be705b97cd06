use crate::node::finger_entry::FingerEntry;
use crate::utils::crypto::{is_between, HashPos};
use crate::utils::types::Address;

/// Sparse routing cache. Entry i holds the current best known successor of
/// `own position + 2^i`; on a fresh node every entry points at the node
/// itself, which is the singleton ring.
#[derive(Debug, Clone)]
pub struct FingerTable {
    pub fingers: Vec<FingerEntry>,
}

impl FingerTable {
    pub fn new(own_address: &Address) -> FingerTable {
        let own_entry = FingerEntry::new(own_address);
        FingerTable {
            fingers: vec![own_entry; HashPos::finger_count()],
        }
    }

    pub fn set_finger(&mut self, index: usize, address: &Address) {
        self.fingers[index] = FingerEntry::new(address);
    }

    /// Scans from the largest offset down and returns the first finger whose
    /// position lies strictly between this node and the target, so the
    /// largest legal jump wins. `None` means no finger precedes the target
    /// and the caller falls back to its immediate successor.
    pub fn closest_preceding_finger(&self, own_pos: &HashPos, target: &HashPos) -> Option<FingerEntry> {
        for finger in self.fingers.iter().rev() {
            if is_between(finger.pos, *own_pos, *target, false) {
                return Some(finger.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::hash;

    #[test]
    fn fresh_table_points_every_finger_at_the_node_itself() {
        let address: Address = "127.0.0.1:5601".to_string();
        let table = FingerTable::new(&address);

        assert_eq!(table.fingers.len(), HashPos::finger_count());
        assert!(table.fingers.iter().all(|finger| finger.address == address));
    }

    #[test]
    fn self_entries_never_precede_a_target() {
        let address: Address = "127.0.0.1:5601".to_string();
        let table = FingerTable::new(&address);
        let own_pos = hash(address.as_bytes());
        let target = own_pos.add_power_of_two(42);

        // every entry sits exactly on the open interval's left bound
        assert!(table.closest_preceding_finger(&own_pos, &target).is_none());
    }

    #[test]
    fn scan_returns_the_furthest_preceding_finger() {
        let own: Address = "node-a".to_string();
        let near: Address = "node-b".to_string();
        let far: Address = "node-c".to_string();
        let own_pos = hash(own.as_bytes());
        let near_pos = hash(near.as_bytes());
        let far_pos = hash(far.as_bytes());

        let mut table = FingerTable::new(&own);
        table.set_finger(3, &near);
        table.set_finger(100, &far);

        // pick a target that both fingers precede; the scan runs high-to-low
        // so the entry at the larger index is chosen
        let target = if is_between(near_pos, own_pos, far_pos, false) {
            far_pos.add_power_of_two(0)
        } else {
            near_pos.add_power_of_two(0)
        };

        let chosen = table
            .closest_preceding_finger(&own_pos, &target)
            .expect("a finger precedes the target");
        assert_eq!(chosen.address, far);
    }

    #[test]
    fn a_finger_sitting_exactly_on_the_target_does_not_precede_it() {
        let own: Address = "node-a".to_string();
        let other: Address = "node-b".to_string();
        let own_pos = hash(own.as_bytes());
        let other_pos = hash(other.as_bytes());

        let mut table = FingerTable::new(&own);
        table.set_finger(10, &other);

        // the preceding interval is open on both sides
        assert!(table.closest_preceding_finger(&own_pos, &other_pos).is_none());
    }
}
