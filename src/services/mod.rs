pub mod booking;
pub mod credits;
pub mod gateway;
pub mod ledger;
pub mod mediation;
pub mod notify;
