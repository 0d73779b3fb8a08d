//! Data Transfer Objects
//!
//! This module contains DTOs used at the edges of the service: HTTP request and
//! response bodies, the input snapshot captured when a job is created, and the
//! JSON shapes the external model is asked to return.

pub mod artifact;
pub mod model;
pub mod run;
