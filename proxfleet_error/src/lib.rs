use bon::bon;
use miette::{Diagnostic, Report};
pub use pipelight_error::{CastError, TomlError};

use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ProxfleetError {
    ////////////////////////////////
    // Lib native errors
    #[error(transparent)]
    #[diagnostic(transparent)]
    WrapError(#[from] WrapError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    LibError(#[from] LibError),

    ////////////////////////////////
    // Type convertion
    #[error(transparent)]
    #[diagnostic(code(parse::error))]
    ParseError(#[from] url::ParseError),

    #[error(transparent)]
    #[diagnostic(code(parse::error))]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error(transparent)]
    #[diagnostic(code(parse::error))]
    AddrParseError(#[from] ipnet::AddrParseError),

    #[error(transparent)]
    #[diagnostic(code(serde::error))]
    SerdeError(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(proxfleet::strum::error))]
    StrumError(#[from] strum::ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    CastError(#[from] CastError),

    ////////////////////////////////
    // Filesystem and csv table
    #[error(transparent)]
    #[diagnostic(code(proxfleet::io::error))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(proxfleet::csv::error))]
    CsvError(#[from] csv::Error),

    #[error(transparent)]
    #[diagnostic(code(proxfleet::io::error))]
    Utf8Error(#[from] std::string::FromUtf8Error),

    ////////////////////////////////
    // Http
    #[error(transparent)]
    #[diagnostic(code(reqwest::error))]
    ReqwestError(#[from] reqwest::Error),

    #[error(transparent)]
    #[diagnostic(code(proxfleet::env::error))]
    EnvError(#[from] std::env::VarError),
}

/**
A config error with help higher origin
Can be recursively chained.
*/
#[derive(Debug, Error, Diagnostic)]
#[error("{}", message)]
#[diagnostic(code(proxfleet::wrap::error))]
pub struct WrapError {
    pub message: String,
    #[diagnostic_source]
    pub origin: Report,
    #[help]
    pub help: String,
}

#[bon]
impl WrapError {
    #[builder]
    pub fn new(msg: &str, help: &str, origin: Report) -> Self {
        Self {
            message: msg.to_owned(),
            help: help.to_owned(),
            origin,
        }
    }
}

/**
A root cause error with no inner origin
*/
#[derive(Debug, Error, Diagnostic)]
#[error("{}", message)]
#[diagnostic(code(proxfleet::lib::error))]
pub struct LibError {
    pub message: String,
    #[help]
    pub help: String,
}

#[bon]
impl LibError {
    #[builder]
    pub fn new(msg: &str, help: &str) -> Self {
        Self {
            message: msg.to_owned(),
            help: help.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lib_error_keeps_message_and_help() {
        let err: ProxfleetError = LibError::builder()
            .msg("Couldn't find host")
            .help("Check the config file.")
            .build()
            .into();
        assert_eq!(err.to_string(), "Couldn't find host");
    }

    #[test]
    fn wrap_error_chains_origin() {
        let origin = Report::msg("connection refused");
        let err = WrapError::builder()
            .msg("Couldn't reach host pve1")
            .help("Is the proxmox api up?")
            .origin(origin)
            .build();
        assert_eq!(err.to_string(), "Couldn't reach host pve1");
        assert_eq!(err.origin.to_string(), "connection refused");
    }
}
