//! bridge-term: watch (and optionally type into) one device on a Serial
//! Bridge multiplex server.
//!
//! # Usage
//!
//! ```text
//! bridge-term <HOST> [-p PORT] -d DEVICE [--rw]
//! ```
//!
//! Output of `DEVICE` is copied to stdout.  With `--rw`, stdin is forwarded
//! to the device.  The client exits when stdin ends or the server hangs up.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::thread;

use anyhow::Context;
use bridge_core::protocol::stream::iter_frames;
use bridge_term::{Incoming, Session};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// ASCII ETX; ends the session like Ctrl+C in a raw terminal.
const INTERRUPT: u8 = 0x03;

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "bridge-term",
    about = "Terminal client for a Serial Bridge multiplex server",
    version
)]
struct Cli {
    /// Server hostname or IP address.
    host: String,

    /// Multiplex server port.
    #[arg(short, long, default_value_t = 7777, env = "BRIDGE_TERM_PORT")]
    port: u16,

    /// Device to watch.
    #[arg(short, long)]
    device: String,

    /// Forward stdin to the device.
    #[arg(long = "rw", alias = "write")]
    write: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only device output.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let session = Session::new(cli.device)?;

    let mut stream = TcpStream::connect((cli.host.as_str(), cli.port))
        .with_context(|| format!("failed to connect to {}:{}", cli.host, cli.port))?;
    stream.write_all(&session.subscribe_frame())?;
    info!("subscribed to {} on {}:{}", session.device(), cli.host, cli.port);

    let input = stream.try_clone()?;
    let input_session = session.clone();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || forward_stdin(input, &input_session, cli.write))?;

    print_output(stream, &session)
}

/// Copies the device's output to stdout until the server closes the
/// connection.
fn print_output(stream: TcpStream, session: &Session) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    for frame in iter_frames(stream) {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                error!("connection ended: {e}");
                break;
            }
        };
        match session.classify(&msg) {
            Incoming::Output(bytes) => {
                stdout.write_all(bytes)?;
                stdout.flush()?;
            }
            Incoming::Notice(text) => info!("server: {text}"),
            Incoming::Ignored => debug!("ignored {msg}"),
        }
    }
    Ok(())
}

/// Reads stdin until EOF or Ctrl+C, forwarding it when `write` is set, then
/// hangs up so `print_output` returns.
fn forward_stdin(mut stream: TcpStream, session: &Session, write: bool) {
    let mut stdin = io::stdin().lock();
    let mut buf = [0u8; 256];
    loop {
        let n = match stdin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                error!("stdin: {e}");
                break;
            }
        };
        let (chunk, interrupted) = match buf[..n].iter().position(|b| *b == INTERRUPT) {
            Some(at) => (&buf[..at], true),
            None => (&buf[..n], false),
        };
        if write {
            if let Some(frame) = session.send_frame(chunk) {
                if let Err(e) = stream.write_all(&frame) {
                    error!("send failed: {e}");
                    break;
                }
            }
        }
        if interrupted {
            break;
        }
    }
    stream.shutdown(Shutdown::Both).ok();
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_device_and_defaults_port() {
        let cli = Cli::try_parse_from(["bridge-term", "lab-pi", "-d", "foo"]).unwrap();

        if std::env::var_os("BRIDGE_TERM_PORT").is_none() {
            assert_eq!(cli.port, 7777);
        }
        assert_eq!(cli.host, "lab-pi");
        assert_eq!(cli.device, "foo");
        assert!(!cli.write);
    }

    #[test]
    fn test_cli_accepts_rw_and_write_alias() {
        let rw = Cli::try_parse_from(["bridge-term", "h", "-d", "foo", "--rw"]).unwrap();
        let write = Cli::try_parse_from(["bridge-term", "h", "-d", "foo", "--write"]).unwrap();

        assert!(rw.write);
        assert!(write.write);
    }

    #[test]
    fn test_cli_without_device_is_an_error() {
        assert!(Cli::try_parse_from(["bridge-term", "h"]).is_err());
    }
}
