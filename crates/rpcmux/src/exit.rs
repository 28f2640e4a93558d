use std::fmt;
use std::io;

use rpcmux_socket::SocketError;
use rpcmux_transport::TransportError;
use rpcmux_wire::WireError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
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
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => FAILURE,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn socket_error(context: &str, err: SocketError) -> CliError {
    match err {
        SocketError::Transport(err) => transport_error(context, err),
        SocketError::Wire(WireError::Io(source)) => io_error(context, source),
        SocketError::Wire(err) => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        SocketError::Deserialization(err) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        err @ SocketError::Protocol(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        err @ (SocketError::UnknownPeer(_) | SocketError::Closed) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_failure_maps_to_failure_code() {
        let err = SocketError::Transport(TransportError::Connect {
            path: "/tmp/x.sock".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        });
        assert_eq!(socket_error("connect failed", err).code, FAILURE);
    }

    #[test]
    fn decode_failure_maps_to_data_invalid() {
        let err = SocketError::Protocol("bad delimiter".to_string());
        assert_eq!(socket_error("recv failed", err).code, DATA_INVALID);
    }

    #[test]
    fn timeout_kind_maps_to_timeout_code() {
        let err = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(io_error("op", err).code, TIMEOUT);
    }
}
