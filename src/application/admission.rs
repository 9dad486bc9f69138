use crate::domain::ids::ClassId;
use crate::domain::ports::UnitOfWork;
use crate::error::{BookingError, Entity, Result};

/// Outcome of a capacity check.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Admission {
    Admitted { occupied: u32, capacity: u32 },
    CapacityExceeded,
}

/// Decides whether a class has a free seat.
///
/// Must run inside a unit of work that already holds the class row lock;
/// that lock is what serializes admissions for one class.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapacityController;

impl CapacityController {
    pub async fn try_admit(&self, uow: &mut dyn UnitOfWork, class: ClassId) -> Result<Admission> {
        let class = uow
            .class(class)
            .await?
            .ok_or_else(|| BookingError::not_found(Entity::Class, class))?;
        let capacity = class.capacity.get();
        let occupied = uow.occupied_seats(class.id).await?;

        if occupied < capacity {
            Ok(Admission::Admitted { occupied, capacity })
        } else {
            tracing::debug!(class = %class.id, occupied, capacity, "class full");
            Ok(Admission::CapacityExceeded)
        }
    }
}
