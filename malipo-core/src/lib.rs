pub mod availability;
pub mod booking;
pub mod payment;

pub use availability::{AvailabilityApi, AvailabilityError, AvailabilityResult};
pub use booking::DateRange;
pub use payment::{PaymentError, PaymentGateway, PaymentHandle, PaymentRequest, StkStatus};
