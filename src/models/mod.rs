pub mod booking;
pub mod mediation;
pub mod service;
pub mod transaction;
pub mod user;

pub use booking::{Booking, BookingStatus, ServiceSnapshot};
pub use mediation::MediationMessage;
pub use service::ServiceOffering;
pub use transaction::{CreditTransaction, TransactionKind, TransactionStatus};
pub use user::{Role, User};
