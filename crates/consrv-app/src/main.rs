//! consrv demo server.
//!
//! Serves a small set of sample commands over the transport chosen on
//! the command line. With `--transport in-process` the remaining
//! arguments are dispatched once and the program exits; the socket
//! transports serve until interrupted.
//!
//!   consrv --name tel1 --transport tcp --port 7501
//!   consrv --transport udp --host 0.0.0.0 --port 7501
//!   consrv --transport in-process -- add 3 4

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};

use consrv_server::{CommandCall, CommandDef, CommandHandler, Reply, Server};
use consrv_types::{ConsrvError, ServerConfig, Transport};

struct Options {
    config: ServerConfig,
    override_file: Option<PathBuf>,
    /// Argv to dispatch for the in-process transport.
    argv: Vec<String>,
}

fn usage() -> &'static str {
    "usage: consrv [--name NAME] [--transport udp|tcp|unix-datagram|in-process]\n\
     \x20             [--host HOST] [--port PORT] [--banner TEXT] [--config FILE]\n\
     \x20             [-- ARGS...]"
}

fn take_value(args: &mut std::env::Args, flag: &str) -> Result<String> {
    args.next()
        .with_context(|| format!("{flag} requires a value"))
}

fn parse_options(mut args: std::env::Args) -> Result<Options> {
    let _program = args.next();
    let mut config = ServerConfig::new("consrv");
    let mut override_file = None;
    let mut argv = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--name" => config.name = take_value(&mut args, "--name")?,
            "--transport" => {
                config.transport = match take_value(&mut args, "--transport")?.as_str() {
                    "udp" => Transport::Udp,
                    "tcp" => Transport::Tcp,
                    "unix-datagram" => Transport::UnixDatagram,
                    "in-process" => Transport::InProcess,
                    other => bail!("unknown transport '{other}'\n{}", usage()),
                };
            },
            "--host" => config.host = take_value(&mut args, "--host")?,
            "--port" => {
                let port = take_value(&mut args, "--port")?;
                config.port = port
                    .parse()
                    .with_context(|| format!("bad port '{port}'"))?;
            },
            "--banner" => config.banner = take_value(&mut args, "--banner")?,
            "--config" => {
                override_file = Some(PathBuf::from(take_value(&mut args, "--config")?));
            },
            "--help" | "-h" => {
                println!("{}", usage());
                std::process::exit(0);
            },
            "--" => {
                argv.extend(args.by_ref());
                break;
            },
            other => bail!("unknown option '{other}'\n{}", usage()),
        }
    }
    Ok(Options {
        config,
        override_file,
        argv,
    })
}

fn register_sample_commands(server: &Server) -> Result<()> {
    let add: Arc<dyn CommandHandler> =
        Arc::new(|call: &CommandCall<'_>, reply: &mut Reply<'_>| {
            let mut sum: i64 = 0;
            for arg in call.args {
                sum += arg.parse::<i64>().map_err(|_| {
                    ConsrvError::Command(format!("not an integer: {arg}"))
                })?;
            }
            reply.println(&sum.to_string());
            Ok(())
        });
    server.register(
        CommandDef::new("add", "Add integers", add)
            .with_usage("add <n> [n...]")
            .with_args(1, 16),
    )?;

    let echo: Arc<dyn CommandHandler> =
        Arc::new(|call: &CommandCall<'_>, reply: &mut Reply<'_>| {
            reply.println(&call.args.join(" "));
            Ok(())
        });
    server.register(
        CommandDef::new("echo", "Echo the arguments back", echo)
            .with_usage("echo <words>...")
            .with_args(1, 32),
    )?;

    let started = Instant::now();
    let uptime: Arc<dyn CommandHandler> =
        Arc::new(move |_: &CommandCall<'_>, reply: &mut Reply<'_>| {
            reply.println(&format!("{}s", started.elapsed().as_secs()));
            Ok(())
        });
    server.register(CommandDef::new("uptime", "Seconds since startup", uptime))?;

    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = parse_options(std::env::args())?;
    let server = match &options.override_file {
        Some(path) => Server::with_overrides(options.config, path)?,
        None => Server::new(options.config),
    };
    register_sample_commands(&server)?;

    if server.config().transport == Transport::InProcess {
        if options.argv.is_empty() {
            bail!("in-process transport needs arguments after --\n{}", usage());
        }
        let argv: Vec<&str> = options.argv.iter().map(String::as_str).collect();
        let (status, text) = server.dispatch_args(&argv);
        print!("{text}");
        std::process::exit(status as u8 as i32);
    }

    let mut server = server;
    server.bind()?;
    log::info!(
        "serving '{}' on {}:{} -- ctrl-c to stop",
        server.name(),
        server.config().host,
        server.port()
    );
    server.run()?;
    Ok(())
}
