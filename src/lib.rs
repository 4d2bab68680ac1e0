//! BLOODLINK: mise en relation de donneurs de sang et de demandeurs.

pub mod authorization;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;
