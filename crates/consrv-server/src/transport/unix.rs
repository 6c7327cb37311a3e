//! Local-domain datagram transport.
//!
//! Same message protocol as UDP, spoken over a filesystem socket named
//! after the server. Peers must bind their own socket path to get
//! replies; datagrams from anonymous sockets are dispatched but cannot
//! be answered.

use std::os::unix::net::UnixDatagram;
use std::sync::atomic::Ordering;

use consrv_types::{Result, ServerConfig, PAYLOAD_CHUNK};

use crate::lockfile::LockFile;
use crate::server::Shared;
use crate::transport::{handle_datagram, is_timeout, Bound, STOP_POLL};

pub(crate) fn bind(config: &mut ServerConfig, name_lock: LockFile) -> Result<Bound> {
    let path = config.runtime_dir.join(format!("{}.sock", config.name));
    // The name lock is held, so anything at this path is a stale socket
    // from a crashed instance.
    if path.exists() {
        log::info!("removing stale socket {}", path.display());
        std::fs::remove_file(&path)?;
    }
    let socket = UnixDatagram::bind(&path)?;
    Ok(Bound::Unix {
        socket,
        path,
        _name_lock: name_lock,
    })
}

pub(crate) fn serve(socket: &UnixDatagram, config: &ServerConfig, shared: &Shared) -> Result<()> {
    socket.set_read_timeout(Some(STOP_POLL))?;
    log::info!("'{}' serving local-domain datagrams", config.name);
    let mut buf = vec![0u8; PAYLOAD_CHUNK];
    while !shared.stop.load(Ordering::SeqCst) {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => return Err(e.into()),
        };
        let replies = handle_datagram(shared, config, &buf[..len]);
        match peer.as_pathname() {
            Some(peer_path) => {
                for reply in replies {
                    if let Err(e) = socket.send_to(&reply, peer_path) {
                        log::warn!("send to {} failed: {e}", peer_path.display());
                    }
                }
            },
            None if !replies.is_empty() => {
                log::warn!("peer socket is anonymous, dropping {} replies", replies.len());
            },
            None => {},
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CommandCall, CommandDef, CommandHandler};
    use crate::reply::Reply;
    use crate::server::Server;
    use consrv_types::{Message, MessageKind, Transport};
    use std::sync::Arc;
    use std::time::Duration;

    fn spawn_server(dir: &std::path::Path, name: &str) -> crate::server::ServerHandle {
        let mut config = ServerConfig::new(name);
        config.transport = Transport::UnixDatagram;
        config.runtime_dir = dir.to_path_buf();
        let server = Server::new(config);
        let handler: Arc<dyn CommandHandler> =
            Arc::new(|_: &CommandCall<'_>, reply: &mut Reply<'_>| {
                reply.println("pong");
                Ok(())
            });
        server
            .register(CommandDef::new("ping", "Reply with pong", handler))
            .unwrap();
        server.spawn().unwrap()
    }

    #[test]
    fn round_trip_over_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn_server(dir.path(), "local");
        let server_path = dir.path().join("local.sock");

        let client_path = dir.path().join("client.sock");
        let client = UnixDatagram::bind(&client_path).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        client
            .send_to(
                &Message::new(MessageKind::UserCommand, "ping").encode(),
                &server_path,
            )
            .unwrap();

        let mut buf = vec![0u8; PAYLOAD_CHUNK];
        let (len, _) = client.recv_from(&mut buf).unwrap();
        let reply = Message::decode(&buf[..len]).unwrap();
        assert_eq!(reply.kind, MessageKind::CommandComplete);
        assert_eq!(reply.text(), "pong\r\n");

        handle.join().unwrap();
        // Shutdown removes the socket file.
        assert!(!server_path.exists());
    }

    #[test]
    fn second_instance_gets_suffixed_socket() {
        let dir = tempfile::tempdir().unwrap();
        let first = spawn_server(dir.path(), "twin");
        let second = spawn_server(dir.path(), "twin");
        assert_eq!(first.name(), "twin");
        assert_eq!(second.name(), "twin1");

        // Both instances answer on their own socket.
        let client_path = dir.path().join("client.sock");
        let client = UnixDatagram::bind(&client_path).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut buf = vec![0u8; PAYLOAD_CHUNK];
        for (sock, name) in [("twin.sock", "twin"), ("twin1.sock", "twin1")] {
            client
                .send_to(
                    &Message::query(MessageKind::NameQuery).encode(),
                    dir.path().join(sock),
                )
                .unwrap();
            let (len, _) = client.recv_from(&mut buf).unwrap();
            let reply = Message::decode(&buf[..len]).unwrap();
            assert_eq!(reply.text(), name);
        }

        second.join().unwrap();
        first.join().unwrap();
    }
}
