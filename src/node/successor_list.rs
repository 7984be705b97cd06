use crate::utils::types::Address;

/// Ordered view of the next r nodes on the ring. Entry 0 is the immediate
/// successor and is mirrored into finger[0] by the owning service.
#[derive(Debug, Clone)]
pub struct SuccessorList {
    pub own_address: Address,
    pub successors: Vec<Address>,
    capacity: usize,
}

impl SuccessorList {
    pub fn new(own_address: &Address, initial_successor: &Address, capacity: usize) -> SuccessorList {
        assert!(capacity >= 1, "successor list needs room for at least one entry");
        SuccessorList {
            own_address: own_address.clone(),
            successors: vec![initial_successor.clone()],
            capacity,
        }
    }

    pub fn immediate(&self) -> &Address {
        &self.successors[0]
    }

    /// A newly discovered node sits between us and the old successor: it
    /// becomes entry 0 while the old successor stays behind it as a backup.
    pub fn adopt_immediate(&mut self, address: &Address) {
        if self.successors.first() == Some(address) {
            return;
        }
        self.successors.retain(|existing| existing != address);
        self.successors.insert(0, address.clone());
        self.successors.truncate(self.capacity);
    }

    /// Rebuilds the tail from what the immediate successor reports as its
    /// own successors. The walk stops once it wraps back around to us or to
    /// the successor itself.
    pub fn reconcile(&mut self, successor: &Address, reported: &[Address]) {
        let mut successors = Vec::with_capacity(self.capacity);
        successors.push(successor.clone());
        for address in reported {
            if successors.len() == self.capacity {
                break;
            }
            if address == &self.own_address || address == successor {
                break;
            }
            successors.push(address.clone());
        }
        self.successors = successors;
    }

    /// Failover found entry `index` alive: everything before it is dead and
    /// gets dropped.
    pub fn promote(&mut self, index: usize) {
        assert!(index < self.successors.len());
        self.successors.drain(..index);
    }

    /// Last-resort failover through the finger table: the list collapses to
    /// the single node that answered.
    pub fn reset(&mut self, address: &Address) {
        self.successors = vec![address.clone()];
    }
}
