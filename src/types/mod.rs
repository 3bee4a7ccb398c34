//! Shared type definitions
//!
//! This module contains the data types shared by the runner, the manager and storage.

pub mod config;
pub mod message;
pub mod model;
