// src/validation/mod.rs

pub mod action;

pub use action::{ValidationError, ValidationPolicy, validate};
