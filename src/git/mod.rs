pub mod ops;
pub mod probe;
pub mod status;
