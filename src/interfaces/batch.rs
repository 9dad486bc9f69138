use super::csv::outcome_writer::Outcome;
use super::csv::request_reader::Request;
use crate::application::membership::MembershipService;
use crate::application::reservation::ReservationService;
use crate::application::sweeper::ExpirySweeper;
use crate::error::Result;
use std::sync::Arc;

/// Executes request rows against the application services.
#[derive(Clone)]
pub struct BatchRunner {
    reservations: ReservationService,
    memberships: MembershipService,
    sweeper: Arc<ExpirySweeper>,
}

impl BatchRunner {
    pub fn new(
        reservations: ReservationService,
        memberships: MembershipService,
        sweeper: Arc<ExpirySweeper>,
    ) -> Self {
        Self {
            reservations,
            memberships,
            sweeper,
        }
    }

    /// Runs one request and reports how it went. Never fails: errors become
    /// `rejected` or `failed` outcomes.
    pub async fn execute(&self, line: u64, request: Request) -> Outcome {
        let op = request.op().as_str();
        match self.dispatch(request).await {
            Ok((code, reference)) => Outcome::ok(line, op, code, reference),
            Err(e) => {
                tracing::debug!(line, op, error = %e, "request not applied");
                Outcome::error(line, op, &e)
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<(&'static str, u64)> {
        match request {
            Request::Book {
                user,
                class,
                payment,
            } => {
                let booking = self
                    .reservations
                    .create_booking(user, class, payment)
                    .await?;
                Ok(("confirmed", booking.id.0))
            }
            Request::Cancel {
                user,
                booking,
                reason,
            } => {
                let booking = self
                    .reservations
                    .cancel_booking(booking, user, reason)
                    .await?;
                Ok(("cancelled", booking.id.0))
            }
            Request::Complete { booking } => {
                let booking = self.reservations.complete_booking(booking).await?;
                Ok(("completed", booking.id.0))
            }
            Request::Purchase {
                user,
                package,
                payment,
            } => {
                let membership = self.memberships.purchase(user, package, payment).await?;
                Ok(("purchased", membership.id.0))
            }
            Request::Sweep => {
                let expired = self.sweeper.run_once().await?;
                Ok(("swept", u64::try_from(expired).unwrap_or(u64::MAX)))
            }
        }
    }
}
