// ABOUTME: Library module for gradebook-migrator
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod commands;
pub mod config;
pub mod error;
pub mod migration;
pub mod postgres;
pub mod sqlite;
pub mod utils;
