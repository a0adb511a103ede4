//! Gatekeeping for outbound playback commands.
//!
//! Commands are only written to a connection that is open. Anything issued
//! while connecting or disconnected is rejected and dropped: it is never
//! queued for a later connection.

use crate::{
    error::{Error, Result},
    protocol::Command,
    state::ConnectionStatus,
    transport::TransportHandle,
};

/// Sends `command` over `handle` if the connection is ready.
///
/// # Errors
///
/// Returns `Unavailable` when `status` is not [`ConnectionStatus::Connected`]
/// or there is no open handle. Nothing is sent in that case.
pub fn dispatch(
    status: ConnectionStatus,
    handle: Option<&TransportHandle>,
    command: Command,
) -> Result<()> {
    let handle = match handle {
        Some(handle) if status == ConnectionStatus::Connected && handle.is_open() => handle,
        _ => {
            return Err(Error::unavailable(format!(
                "{status}, dropping command \"{command}\""
            )));
        }
    };

    handle.send(command.as_str().to_owned())?;
    debug!("sent {command} to {}", handle.target());
    Ok(())
}
