//! ricething - bundle a riced desktop and replay it on another machine.
//!
//! This library provides the core functionality for ricething, including:
//! - Configuration and host context
//! - The bundle manifest
//! - Recursive copy primitives
//! - Package manager access
//! - The build (capture) and install (restore) pipelines

pub mod capture;
pub mod cfg;
pub mod copy;
pub mod manifest;
pub mod packages;
pub mod report;
pub mod restore;
pub mod ui;
