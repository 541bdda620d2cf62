use std::string::FromUtf8Error;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelloError {
    #[error("WiFi not connected")]
    WiFiNotConnected,

    #[error("no response from drone at {address}")]
    ConnectionFailed { address: String },

    #[error("drone rejected \"{command}\": {response}")]
    CommandFailed { command: String, response: String },

    #[error("timed out waiting for a reply to \"{command}\"")]
    ResponseTimeout { command: String },

    #[error("no video source produced a decodable frame")]
    NoVideoSource,

    #[error("invalid video URL {url}")]
    InvalidVideoUrl { url: String },

    #[error("invalid command \"{msg}\"")]
    InvalidCommand { msg: String },

    #[error("failed to parse {msg}")]
    ParseError { msg: String },

    #[error("scene analysis failed: {msg}")]
    AnalysisFailed { msg: String },

    #[error("settings error: {msg}")]
    Settings { msg: String },

    #[error("{msg}")]
    Generic { msg: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Utf8(#[from] FromUtf8Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, TelloError>;
