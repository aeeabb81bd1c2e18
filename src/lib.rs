// Library exports for Framez
// The binary and the integration tests both build on these modules

pub mod auth;
pub mod backend;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod models;
pub mod services;
pub mod state;
pub mod timestamp;
