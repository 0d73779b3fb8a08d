//! Playrank Core
//!
//! Core types and abstractions for the Playrank idea-ranking service.
//!
//! This crate contains:
//! - Domain types: jobs, evidence, citations, scores, artifacts, progress events
//! - DTOs: request/response bodies and the structured output expected from the model

pub mod domain;
pub mod dto;
