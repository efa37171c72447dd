pub mod adapters;
pub mod config;
pub mod domain;
pub mod handlers;
pub mod infra;
pub mod processors;
pub mod services;
