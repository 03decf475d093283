//! Group Membership
//!
//! Ordered, stable membership lists. The order is stable for the duration of
//! one share fan-out pass, which keeps the sharer's result codes attributable.

use crate::object::ObjectGuid;
use crate::player::GroupId;

#[derive(Debug, Clone)]
pub struct Group {
    pub id: GroupId,
    members: Vec<ObjectGuid>,
}

impl Group {
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            members: Vec::new(),
        }
    }

    pub fn add(&mut self, guid: ObjectGuid) {
        if !self.members.contains(&guid) {
            self.members.push(guid);
        }
    }

    pub fn remove(&mut self, guid: ObjectGuid) {
        self.members.retain(|m| *m != guid);
    }

    pub fn contains(&self, guid: ObjectGuid) -> bool {
        self.members.contains(&guid)
    }

    pub fn members(&self) -> &[ObjectGuid] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
