pub mod models;
pub mod orchestrator;
pub mod poller;
pub mod session;

pub use models::{BookingSnapshot, BookingState, SessionError};
pub use orchestrator::{BookingOrchestrator, MockBookingBackend};
pub use poller::{PollPolicy, StatusPoller};
pub use session::BookingSession;
