pub mod alert;
pub mod dashboard;
pub mod shift;
pub mod shift_type;
