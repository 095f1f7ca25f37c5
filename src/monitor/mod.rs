//! Shift monitoring core.
//!
//! `worker` drives the periodic evaluation over the `cache`; `checkin`
//! serves presence requests. Both write alerts only through the `ledger`.

pub mod cache;
pub mod checkin;
pub mod dashboard;
pub mod ledger;
pub mod worker;
