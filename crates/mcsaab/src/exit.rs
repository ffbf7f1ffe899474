use std::fmt;
use std::io;

use mcsaab_frame::FrameError;
use mcsaab_link::{ErrorKind, LinkError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => USAGE,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    let code = match err.kind() {
        ErrorKind::Timeout => TIMEOUT,
        ErrorKind::ProtocolMismatch | ErrorKind::FrameTooLarge => DATA_INVALID,
        ErrorKind::InvalidConfig => USAGE,
        ErrorKind::ChannelFault => TRANSPORT_ERROR,
        ErrorKind::QueueFull | ErrorKind::NotActive => FAILURE,
    };
    CliError::new(code, format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn link_errors_map_by_kind() {
        let timeout = LinkError::Timeout {
            what: "negotiation",
            after: Duration::from_millis(10),
        };
        assert_eq!(link_error("simulate", timeout).code, TIMEOUT);

        let rejected = LinkError::Handshake {
            kind: ErrorKind::ProtocolMismatch,
            reason: "negotiation rejected".to_string(),
        };
        let err = link_error("simulate", rejected);
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("simulate: "));

        assert_eq!(
            link_error("config", LinkError::InvalidConfig("speed".into())).code,
            USAGE
        );
        assert_eq!(link_error("send", LinkError::NotActive).code, FAILURE);
    }

    #[test]
    fn frame_errors_are_data_errors() {
        let err = frame_error(
            "encode",
            FrameError::PayloadTooLarge {
                size: 300,
                max: 255,
            },
        );
        assert_eq!(err.code, DATA_INVALID);

        let err = frame_error(
            "read",
            FrameError::Io(io::Error::new(io::ErrorKind::NotFound, "gone")),
        );
        assert_eq!(err.code, USAGE);
    }
}
