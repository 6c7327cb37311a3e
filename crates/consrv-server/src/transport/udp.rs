//! UDP datagram transport.
//!
//! Connectionless: every datagram is a self-contained message and every
//! reply goes back to the sender's address. Broadcast senders are
//! answered the same way.

use std::net::UdpSocket;
use std::sync::atomic::Ordering;

use consrv_types::{Result, ServerConfig, PAYLOAD_CHUNK};

use crate::lockfile::LockFile;
use crate::server::Shared;
use crate::transport::{bind_ip, handle_datagram, is_timeout, Bound, STOP_POLL};

pub(crate) fn bind(config: &mut ServerConfig, name_lock: LockFile) -> Result<Bound> {
    let (socket, addr_lock) = bind_ip(
        config,
        "udp",
        |addr: &str| UdpSocket::bind(addr),
        |s: &UdpSocket| s.local_addr().map(|a| a.port()),
    )?;
    socket.set_broadcast(true)?;
    Ok(Bound::Udp {
        socket,
        _name_lock: name_lock,
        _addr_lock: addr_lock,
    })
}

pub(crate) fn serve(socket: &UdpSocket, config: &ServerConfig, shared: &Shared) -> Result<()> {
    socket.set_read_timeout(Some(STOP_POLL))?;
    log::info!(
        "'{}' serving udp on {}:{}",
        config.name,
        config.host,
        config.port
    );
    let mut buf = vec![0u8; PAYLOAD_CHUNK];
    while !shared.stop.load(Ordering::SeqCst) {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => return Err(e.into()),
        };
        for reply in handle_datagram(shared, config, &buf[..len]) {
            if let Err(e) = socket.send_to(&reply, peer) {
                log::warn!("udp send to {peer} failed: {e}");
            }
        }
    }
    Ok(())
}
