pub mod authorization;
pub mod object_store;
pub mod upload;
