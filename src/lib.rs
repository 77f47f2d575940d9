//! Vision-guided desktop automation: screenshot in, one validated input action out,
//! repeated until the model reports the task done.

pub mod agent;
pub mod capture;
pub mod config;
pub mod context;
pub mod executor;
pub mod input;
pub mod llm;
pub mod logging;
pub mod model;
pub mod protocol;
pub mod validation;
