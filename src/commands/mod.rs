pub mod cluster;
pub mod config;
pub mod doctor;
pub mod infra;
pub mod notify;
pub mod service;
