use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostwebError {
    #[error("Invalid pack: {0}")]
    InvalidPack(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("This is not a file or it doesn't exist: {0}")]
    NotFound(String),

    #[error("Cannot bind {0}: address already in use")]
    PortInUse(SocketAddr),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JavaScript execution error: {0}")]
    JavaScriptExecution(String),

    #[error("Invalid API module: {0}")]
    InvalidModule(String),

    #[error("HTML rewriting failed: {0}")]
    Rewrite(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),
}

pub type Result<T> = std::result::Result<T, HostwebError>;
