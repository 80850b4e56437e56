pub mod access;
pub mod attendance;
pub mod clock;
pub mod compliance;
pub mod config;
pub mod environment;
pub mod errors;
pub mod event;
pub mod ledger;
pub mod listing;
mod locks;
pub mod log;
pub mod normalization;
pub mod notification;
pub mod registry;
pub mod service;
