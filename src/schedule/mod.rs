pub mod bounds;
pub mod window;
