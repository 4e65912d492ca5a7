// SPDX-License-Identifier: MIT

//! Probe the configured PMD port and spawn `pmdd` as a detached child if
//! nothing answers (§4.5 step 3).

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use meshnode_core::{ErrorKind, MeshError};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::info;

const SPAWN_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const SPAWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// If `host:port` doesn't accept a connection, spawn `pmdd --port <port>` as
/// a detached child and wait until it does.
pub async fn probe_or_spawn(host: &str, port: u16) -> Result<(), MeshError> {
    if TcpStream::connect((host, port)).await.is_ok() {
        return Ok(());
    }

    info!(port, "no pmd responding, spawning pmdd");
    let mut command = pmdd_command();
    command
        .arg("--port")
        .arg(port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    command
        .spawn()
        .map_err(|err| MeshError::new(ErrorKind::PmdUnavailable, format!("failed to spawn pmdd: {err}")))?;

    wait_until_accepting(host, port).await
}

fn pmdd_command() -> Command {
    let exe_name = if cfg!(windows) { "pmdd.exe" } else { "pmdd" };
    let path = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(exe_name)))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from(exe_name));
    Command::new(path)
}

async fn wait_until_accepting(host: &str, port: u16) -> Result<(), MeshError> {
    let deadline = Instant::now() + SPAWN_WAIT_TIMEOUT;
    loop {
        if TcpStream::connect((host, port)).await.is_ok() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(MeshError::new(
                ErrorKind::PmdUnavailable,
                "pmd did not start accepting connections in time",
            ));
        }
        tokio::time::sleep(SPAWN_POLL_INTERVAL).await;
    }
}
