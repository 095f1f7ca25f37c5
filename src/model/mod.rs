pub mod alert;
pub mod attendance;
pub mod checkin;
pub mod location;
pub mod role;
pub mod shift;
