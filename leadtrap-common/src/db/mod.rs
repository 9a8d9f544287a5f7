//! Database initialization shared by the engine and its tests

pub mod init;
