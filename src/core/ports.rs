//! Port discovery - Which processes hold which ports open

use std::collections::HashSet;
use std::io::ErrorKind;
use std::process::Command;

use tracing::debug;

use super::backend::{BackendError, BackendResult};
use super::resource::{PortBinding, Protocol};

/// Collect listening TCP ports and bound UDP ports from the OS
pub fn scan() -> BackendResult<Vec<PortBinding>> {
    #[cfg(windows)]
    {
        let stdout = run("netstat", &["-ano"])?;
        Ok(normalize(parse_netstat(&stdout)))
    }
    #[cfg(not(windows))]
    {
        let tcp = run("lsof", &["-nP", "-iTCP", "-sTCP:LISTEN"])?;
        let udp = run("lsof", &["-nP", "-iUDP"])?;
        let mut bindings = parse_lsof(&tcp, Protocol::Tcp);
        bindings.extend(parse_lsof(&udp, Protocol::Udp));
        Ok(normalize(bindings))
    }
}

fn run(program: &str, args: &[&str]) -> BackendResult<String> {
    debug!("Running {} {}", program, args.join(" "));
    let output = Command::new(program).args(args).output().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            BackendError::Unavailable(program.to_string())
        } else {
            BackendError::Failed(format!("Error executing {}: {}", program, e))
        }
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        return Ok(stdout);
    }

    // lsof exits 1 when nothing matched
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stdout.trim().is_empty() && stderr.trim().is_empty() {
        Ok(String::new())
    } else if !stdout.trim().is_empty() {
        // Partial output with warnings (e.g. inaccessible /proc entries)
        Ok(stdout)
    } else {
        Err(BackendError::Failed(format!(
            "{} failed: {}",
            program,
            stderr.trim()
        )))
    }
}

/// Extract the port from an address such as `*:8080`, `127.0.0.1:53` or
/// `[::1]:5432`
fn port_of(address: &str) -> Option<u16> {
    address
        .rsplit(':')
        .next()
        .and_then(|p| p.parse::<u16>().ok())
        .filter(|p| *p != 0)
}

/// Parse `lsof -nP -i...` output
///
/// Columns: COMMAND PID USER FD TYPE DEVICE SIZE/OFF NODE NAME [(STATE)]
pub fn parse_lsof(stdout: &str, protocol: Protocol) -> Vec<PortBinding> {
    let mut bindings = Vec::new();
    for line in stdout.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 9 {
            continue;
        }
        let Ok(pid) = parts[1].parse::<u32>() else {
            continue;
        };
        let address = parts[8];
        // Connected sockets are not listeners
        if address.contains("->") {
            continue;
        }
        if let Some(port) = port_of(address) {
            bindings.push(PortBinding {
                port,
                pid,
                process_name: parts[0].to_string(),
                protocol,
            });
        }
    }
    bindings
}

/// Parse `netstat -ano` output (Windows)
///
/// TCP rows carry a state column; only `LISTENING` rows are kept. UDP rows
/// have no state, the pid is always the last column.
pub fn parse_netstat(stdout: &str) -> Vec<PortBinding> {
    let mut bindings = Vec::new();
    for line in stdout.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let (protocol, listening) = match parts.as_slice() {
            [proto, _local, _remote, state, _pid] if proto.eq_ignore_ascii_case("tcp") => {
                (Protocol::Tcp, *state == "LISTENING")
            }
            [proto, _local, _remote, _pid] if proto.eq_ignore_ascii_case("udp") => {
                (Protocol::Udp, true)
            }
            _ => continue,
        };
        if !listening {
            continue;
        }
        let Some(pid) = parts.last().and_then(|p| p.parse::<u32>().ok()) else {
            continue;
        };
        if let Some(port) = port_of(parts[1]) {
            bindings.push(PortBinding {
                port,
                pid,
                process_name: String::new(),
                protocol,
            });
        }
    }
    bindings
}

/// Deduplicate on (port, pid, protocol) and sort by port
pub fn normalize(bindings: Vec<PortBinding>) -> Vec<PortBinding> {
    let mut seen = HashSet::new();
    let mut unique: Vec<PortBinding> = bindings
        .into_iter()
        .filter(|b| seen.insert((b.port, b.pid, b.protocol)))
        .collect();
    unique.sort_by_key(|b| (b.port, b.protocol, b.pid));
    unique
}
