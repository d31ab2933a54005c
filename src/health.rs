//! A tiny always-on health responder (§0.6 supplemental: "Health endpoint"),
//! distinct from and much simpler than the out-of-scope HTTP/SSE control
//! plane named in §6. Every connection gets the same plain-text `200 OK`
//! regardless of the request line; this exists so an external process
//! supervisor has something to poll, not as a general-purpose web server.

use slog::Logger;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nContent-Type: text/plain\r\n\r\nOK";

/// Binds `host:port` and serves health checks on a background thread until
/// the process exits. Bind failures are logged and swallowed -- a stuck
/// health port must never prevent the scheduler itself from starting.
pub fn spawn(log: &Logger, host: &str, port: u16) {
    let addr = format!("{}:{}", host, port);
    let listener = match TcpListener::bind(&addr) {
        Ok(l) => l,
        Err(e) => {
            warn!(log, "Failed to bind health endpoint"; "addr" => &addr, "error" => e.to_string());
            return;
        }
    };

    info!(log, "Health endpoint listening"; "addr" => &addr);
    let log = log.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => handle_connection(stream),
                Err(e) => debug!(log, "Health endpoint accept failed"; "error" => e.to_string()),
            }
        }
    });
}

fn handle_connection(mut stream: TcpStream) {
    let mut buf = [0u8; 512];
    let _ = stream.read(&mut buf);
    let _ = stream.write_all(RESPONSE);
}
