//! Roberts - A small help desk
//!
//! Agents file and work tickets; every change is kept in an action log.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
