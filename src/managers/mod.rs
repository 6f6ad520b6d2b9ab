pub mod gateway;
pub mod mapping;
