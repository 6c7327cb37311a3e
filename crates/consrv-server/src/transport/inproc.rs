//! In-process transport: no socket at all.
//!
//! The host program splits its own argv and hands it to the server's
//! dispatcher directly. The serve loop has nothing to read; it parks
//! until stopped so `spawn` works the same as for the socket transports.

use std::sync::atomic::Ordering;

use consrv_types::{Result, ServerConfig};

use crate::server::Shared;
use crate::transport::STOP_POLL;

pub(crate) fn serve(config: &ServerConfig, shared: &Shared) -> Result<()> {
    log::info!("'{}' serving in-process dispatch", config.name);
    while !shared.stop.load(Ordering::SeqCst) {
        std::thread::sleep(STOP_POLL / 5);
    }
    Ok(())
}
