pub mod database;
pub mod object_store;
pub mod seed;
