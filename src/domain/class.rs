use super::ids::ClassId;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// A fixed-capacity time slot members can reserve.
///
/// `schedule` is an opaque descriptor (e.g. "Monday 08:00") that the core
/// only forwards into notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub capacity: NonZeroU32,
    pub schedule: String,
}

/// A class as supplied by the administrative collaborator, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClass {
    pub name: String,
    pub capacity: NonZeroU32,
    #[serde(default)]
    pub schedule: String,
}

impl NewClass {
    pub fn into_class(self, id: ClassId) -> Class {
        Class {
            id,
            name: self.name,
            capacity: self.capacity,
            schedule: self.schedule,
        }
    }
}
