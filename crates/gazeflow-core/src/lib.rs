pub mod action;
pub mod config;
pub mod error;
pub mod gate;
pub mod invalidation;
pub mod io;
pub mod orchestrator;
pub mod paths;
pub mod possibility;
pub mod rules;
pub mod session;
pub mod store;
pub mod table;
pub mod update;

pub use error::{GazeflowError, Result};
