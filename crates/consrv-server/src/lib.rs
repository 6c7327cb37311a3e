//! Command dispatch and transport server for consrv.
//!
//! A host program registers named, argument-validated commands here and
//! the server exposes them over one of four transport personalities:
//! connectionless UDP datagrams, a connection-oriented TCP stream with a
//! full line editor, local-domain datagrams, or a direct in-process
//! dispatch of the host's own argument vector.
//!
//! ```no_run
//! use consrv_server::{CommandCall, CommandDef, CommandHandler, Reply, Server};
//! use consrv_types::{ServerConfig, Transport};
//! use std::sync::Arc;
//!
//! let mut config = ServerConfig::new("demo");
//! config.transport = Transport::Tcp;
//! let server = Server::new(config);
//! let add: Arc<dyn CommandHandler> =
//!     Arc::new(|call: &CommandCall<'_>, reply: &mut Reply<'_>| {
//!         let a: i64 = call.args[0].parse().unwrap_or(0);
//!         let b: i64 = call.args[1].parse().unwrap_or(0);
//!         reply.println(&format!("{}", a + b));
//!         Ok(())
//!     });
//! server.register(
//!     CommandDef::new("add", "Add two integers", add)
//!         .with_usage("add <a> <b>")
//!         .with_args(2, 2),
//! ).unwrap();
//! server.run().unwrap();
//! ```

pub mod dispatch;
pub mod lockfile;
pub mod native;
pub mod overrides;
pub mod registry;
pub mod reply;
pub mod server;
pub mod tokens;
mod transport;

pub use dispatch::{DispatchOutcome, DispatchStatus, SessionAction};
pub use lockfile::LockFile;
pub use native::NativeCommand;
pub use overrides::Overrides;
pub use registry::{CommandCall, CommandDef, CommandHandler, CommandTable, Resolution};
pub use reply::{OverflowPolicy, Reply, ReplySink};
pub use server::{Server, ServerHandle};
pub use tokens::Tokenizer;
