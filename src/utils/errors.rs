#![forbid(unsafe_code)]

use thiserror::Error;

/// Errors enumerates the infrastructure-level failures returned by this
/// application outside of request handling (config, logging, migrations).
/// Request-level failures use `crate::utils::api_error::ApiError` instead.
#[derive(Error, Debug)]
pub enum Errors {
    /// Input parameter logging.
    #[error("reservo_server input parameters:\n{}", .0)]
    InputParms(String),

    /// Represents all other cases of `std::io::Error`.
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Inaccessible logger configuration file.
    #[error("Unable to access the Log4rs configuration file: {}", .0)]
    Log4rsInitialization(String),

    #[error("Reading application configuration file: {}", .0)]
    ReadingConfigFile(String),

    #[error("Unable to parse TOML file: {}", .0)]
    TOMLParseError(String),

    #[error("Database migration failed: {}", .0)]
    MigrationError(String),

    #[error("Reservation engine error: {}", .0)]
    EngineError(String),
}
