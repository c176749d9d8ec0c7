//! Listener binding.

use std::io;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, warn};

use coffee_core::error::{AppError, ErrorKind};
use coffee_core::result::AppResult;

/// Bind `address:port`, walking forward one port at a time while the port
/// is already in use.
///
/// At most `max_attempts` ports are tried (`port`, `port + 1`, ...). Any
/// bind error other than "address in use" fails immediately. Returns the
/// listener and the address actually bound.
pub async fn bind_with_retry(
    address: &str,
    port: u16,
    max_attempts: u16,
) -> AppResult<(TcpListener, SocketAddr)> {
    if max_attempts == 0 {
        return Err(AppError::configuration(
            "Port binding needs at least one attempt",
        ));
    }

    let mut last_in_use = None;
    for offset in 0..max_attempts {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };

        match TcpListener::bind((address, candidate)).await {
            Ok(listener) => {
                let bound = listener.local_addr().map_err(|e| {
                    AppError::with_source(
                        ErrorKind::Storage,
                        format!("Failed to read bound address: {e}"),
                        e,
                    )
                })?;
                info!(
                    address = %bound,
                    attempts = offset + 1,
                    "HTTP server bound"
                );
                return Ok((listener, bound));
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                warn!(address, port = candidate, "Port in use, trying the next one");
                last_in_use = Some(e);
            }
            Err(e) => {
                return Err(AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to bind {address}:{candidate}: {e}"),
                    e,
                ));
            }
        }
    }

    let message = format!(
        "No free port on {address} after {max_attempts} attempts starting at {port}"
    );
    Err(match last_in_use {
        Some(e) => AppError::with_source(ErrorKind::Storage, message, e),
        None => AppError::new(ErrorKind::Storage, message),
    })
}
