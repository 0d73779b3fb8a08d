//! Core domain types
//!
//! This module contains the core domain structures used across Playrank crates.
//! These types represent the fundamental business entities and are shared between
//! the persistence layer, the run orchestrator and the HTTP surface.

pub mod artifact;
pub mod event;
pub mod evidence;
pub mod job;
pub mod project;
pub mod score;
