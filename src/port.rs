use crate::{config::MIN_STARTING_PORT, error::LivedirError};
use std::net::{Ipv4Addr, TcpListener};

/// Probe ports `starting_port..=65535` on all interfaces and return the first one that binds.
///
/// The probe listener is dropped before returning, so another process can still take the
/// port before the real server binds it.
pub fn find_available_port(starting_port: u16) -> Result<u16, LivedirError> {
    if starting_port < MIN_STARTING_PORT {
        return Err(LivedirError::InvalidArgument(format!(
            "port must be greater than or equal to {MIN_STARTING_PORT}, got {starting_port}"
        )));
    }

    for port in starting_port..=u16::MAX {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)) {
            Ok(_listener) => {
                tracing::debug!("Port {} is available", port);
                return Ok(port);
            }
            Err(e) => {
                tracing::trace!("Port {} unavailable: {}", port, e);
            }
        }
    }
    Err(LivedirError::PortExhausted {
        start: starting_port,
    })
}
