//! This module aggregates utility submodules used throughout the application.

/// Environment configuration.
pub mod config;
