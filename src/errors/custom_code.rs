//! Custom code evaluator error types

use std::time::Duration;

use thiserror::Error;

/// Failures raised while running user supplied `process` functions
#[derive(Error, Debug)]
pub enum CustomCodeError {
    /// The interpreter process could not be started or talked to
    #[error("Failed to start interpreter '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The user function ran past its wall-clock budget
    #[error("Custom code exceeded its time limit of {0:?}")]
    Timeout(Duration),

    /// The user function threw
    #[error("{0}")]
    Runtime(String),

    /// The interpreter answered with something that is not a harness response
    #[error("Invalid response from interpreter: {0}")]
    Protocol(String),

    /// The interpreter wrote more than the configured output limit
    #[error("Custom code output exceeded {0} bytes")]
    OutputTooLarge(usize),

    /// `process` returned something other than an array
    #[error("process() must return an array, got {0}")]
    NonArrayResult(String),
}
