//! # membros-shared
//!
//! Canonical entity models and constants shared by every membros crate.
//!
//! The structs here are the *mapped* shapes: raw wire rows from the
//! hosted backend are translated into these defaulted, non-nullable forms by
//! `membros-store`'s mappers before anything else sees them.

pub mod constants;
pub mod models;

pub use models::*;
