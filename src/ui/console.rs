//! Line console - Drives the controller from stdin and prints plain tables

use std::fmt::Write as _;

use anyhow::Result;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::debug;

use crate::core::resource::format_bytes;
use crate::core::{ConsoleSnapshot, Controller, FetchKind, KillRecord, ProcessFilter};

const HELP: &str = "\
Commands:
  show                 process table (filtered)
  ports                listening ports
  stats                system load
  find <text>          filter by name or pid
  clear                clear the search text
  filter all|cpu|mem   category filter
  refresh [procs|ports] refresh now
  kill <pid>           terminate a process
  history              recent kill requests
  watch                toggle re-printing on every update
  quit                 exit
";

/// One line of operator input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Show,
    Ports,
    Stats,
    Find(String),
    Clear,
    Filter(ProcessFilter),
    /// `None` refreshes both kinds
    Refresh(Option<FetchKind>),
    Kill(u32),
    History,
    Watch,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command '{0}', type 'help'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("'{0}' is not a valid pid")]
    InvalidPid(String),
}

/// Parse one input line. Blank lines parse as `Show`.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_lowercase().as_str() {
        "" | "show" | "ps" => Ok(Command::Show),
        "help" | "?" => Ok(Command::Help),
        "ports" => Ok(Command::Ports),
        "stats" => Ok(Command::Stats),
        "find" | "search" => {
            if rest.is_empty() {
                Err(CommandError::Usage("find <text>"))
            } else {
                Ok(Command::Find(rest.to_string()))
            }
        }
        "clear" => Ok(Command::Clear),
        "filter" => match rest.to_lowercase().as_str() {
            "all" => Ok(Command::Filter(ProcessFilter::All)),
            "cpu" => Ok(Command::Filter(ProcessFilter::HighCpu)),
            "mem" | "memory" => Ok(Command::Filter(ProcessFilter::HighMemory)),
            _ => Err(CommandError::Usage("filter all|cpu|mem")),
        },
        "refresh" => match rest.to_lowercase().as_str() {
            "" => Ok(Command::Refresh(None)),
            "procs" | "processes" => Ok(Command::Refresh(Some(FetchKind::Processes))),
            "ports" => Ok(Command::Refresh(Some(FetchKind::Ports))),
            _ => Err(CommandError::Usage("refresh [procs|ports]")),
        },
        "kill" => {
            if rest.is_empty() {
                return Err(CommandError::Usage("kill <pid>"));
            }
            rest.parse::<u32>()
                .map(Command::Kill)
                .map_err(|_| CommandError::InvalidPid(rest.to_string()))
        }
        "history" => Ok(Command::History),
        "watch" => Ok(Command::Watch),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

pub fn render_processes(snapshot: &ConsoleSnapshot) -> String {
    let mut out = String::new();
    let view = &snapshot.processes;
    let _ = writeln!(
        out,
        "{:>8}  {:<28} {:>7} {:>12}  {}",
        "PID", "NAME", "CPU", "MEMORY", "STATUS"
    );
    for p in &view.rows {
        let _ = writeln!(
            out,
            "{:>8}  {:<28} {:>7} {:>12}  {}",
            p.pid,
            truncate(&p.name, 28),
            p.cpu_string(),
            p.memory_string(),
            p.status
        );
    }
    if view.is_truncated() {
        let _ = writeln!(out, "showing {} of {}", view.rows.len(), view.total_matches);
    } else {
        let _ = writeln!(out, "{} processes", view.total_matches);
    }
    if !snapshot.filter.query.is_empty() || snapshot.filter.filter != ProcessFilter::All {
        let _ = writeln!(
            out,
            "filter: '{}' / {}",
            snapshot.filter.query,
            snapshot.filter.filter.label()
        );
    }
    if let Some(error) = &snapshot.process_error {
        let _ = writeln!(out, "! process list may be stale: {}", error);
    }
    out
}

pub fn render_ports(snapshot: &ConsoleSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>6}  {:<5} {:>8}  {}", "PORT", "PROTO", "PID", "PROCESS");
    for b in &snapshot.ports {
        let _ = writeln!(
            out,
            "{:>6}  {:<5} {:>8}  {}",
            b.port, b.protocol, b.pid, b.process_name
        );
    }
    let _ = writeln!(out, "{} ports", snapshot.ports.len());
    if let Some(error) = &snapshot.port_error {
        let _ = writeln!(out, "! port list may be stale: {}", error);
    }
    out
}

pub fn render_stats(snapshot: &ConsoleSnapshot) -> String {
    let mut out = String::new();
    if let Some(host) = &snapshot.host {
        let _ = writeln!(out, "host: {}", host.summary());
    }
    match &snapshot.stats {
        Some(stats) => {
            let _ = writeln!(
                out,
                "processes: {}  cpu: {:.1}%  memory: {} / {} ({:.1}%)",
                stats.total_processes,
                stats.total_cpu_usage,
                stats.used_memory_string(),
                stats.total_memory_string(),
                stats.memory_percent()
            );
        }
        None => {
            let _ = writeln!(out, "no statistics yet");
        }
    }
    if let Some(error) = &snapshot.stats_error {
        let _ = writeln!(out, "! statistics may be stale: {}", error);
    }
    out
}

pub fn render_history(records: &[KillRecord]) -> String {
    let mut out = String::new();
    if records.is_empty() {
        let _ = writeln!(out, "no kill requests yet");
    }
    for r in records {
        let outcome = if r.success {
            "ok".to_string()
        } else {
            r.message.clone().unwrap_or_else(|| "failed".to_string())
        };
        let _ = writeln!(
            out,
            "{}  {:>8}  {:<24} {}",
            r.requested_at.format("%Y-%m-%d %H:%M:%S"),
            r.pid,
            truncate(&r.process_name, 24),
            outcome
        );
    }
    out
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

enum Input {
    Line(Option<String>),
    /// Store revision changed; false once the controller is gone
    Changed(bool),
}

/// Interactive console over stdin/stdout
pub struct Console {
    controller: Controller,
    lines: Lines<BufReader<Stdin>>,
    stdout: tokio::io::Stdout,
    watching: bool,
}

impl Console {
    pub fn new(controller: Controller) -> Self {
        Self {
            controller,
            lines: BufReader::new(tokio::io::stdin()).lines(),
            stdout: tokio::io::stdout(),
            watching: false,
        }
    }

    /// Read and execute commands until `quit` or end of input
    pub async fn run(&mut self) -> Result<()> {
        let mut changes = self.controller.subscribe();
        self.print(HELP).await?;

        loop {
            let watching = self.watching;
            let input = tokio::select! {
                line = self.lines.next_line() => Input::Line(line?),
                changed = changes.changed(), if watching => Input::Changed(changed.is_ok()),
            };

            let line = match input {
                Input::Line(line) => line,
                Input::Changed(false) => return Ok(()),
                Input::Changed(true) => {
                    let snapshot = self.controller.snapshot();
                    let text = format!("{}{}", render_stats(&snapshot), render_processes(&snapshot));
                    self.print(&text).await?;
                    continue;
                }
            };

            let Some(line) = line else {
                return Ok(());
            };
            match parse_command(&line) {
                Ok(Command::Quit) => return Ok(()),
                Ok(command) => self.execute(command).await?,
                Err(e) => self.print(&format!("{}\n", e)).await?,
            }
        }
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        debug!("Console command: {:?}", command);
        let text = match command {
            Command::Help => HELP.to_string(),
            Command::Show => render_processes(&self.controller.snapshot()),
            Command::Ports => render_ports(&self.controller.snapshot()),
            Command::Stats => render_stats(&self.controller.snapshot()),
            Command::Find(query) => {
                self.controller.set_query(query);
                render_processes(&self.controller.snapshot())
            }
            Command::Clear => {
                self.controller.set_query("");
                render_processes(&self.controller.snapshot())
            }
            Command::Filter(filter) => {
                self.controller.set_filter(filter);
                render_processes(&self.controller.snapshot())
            }
            Command::Refresh(kind) => self.refresh(kind).await,
            Command::Kill(pid) => self.kill(pid).await?,
            Command::History => render_history(&self.controller.kill_history(20).await?),
            Command::Watch => {
                self.watching = !self.watching;
                format!("watch {}\n", if self.watching { "on" } else { "off" })
            }
            Command::Quit => String::new(),
        };
        self.print(&text).await
    }

    async fn refresh(&self, kind: Option<FetchKind>) -> String {
        let kinds = match kind {
            Some(kind) => vec![kind],
            None => vec![FetchKind::Processes, FetchKind::Ports],
        };
        let mut out = String::new();
        for kind in kinds {
            let started = match kind {
                FetchKind::Processes => self.controller.refresh_processes().await,
                FetchKind::Ports => self.controller.refresh_ports().await,
            };
            if started {
                let _ = writeln!(out, "{} refreshed", kind);
            } else {
                let _ = writeln!(out, "{} refresh already in progress", kind);
            }
        }
        out
    }

    async fn kill(&mut self, pid: u32) -> Result<String> {
        let name = self
            .controller
            .find_process(pid)
            .map(|p| format!("{} ({}, {})", p.name, p.cpu_string(), format_bytes(p.memory)))
            .unwrap_or_else(|| "unknown process".to_string());
        self.print(&format!("Kill PID {} {}? [y/N] ", pid, name))
            .await?;

        let answer = self.lines.next_line().await?.unwrap_or_default();
        if !answer.trim().eq_ignore_ascii_case("y") {
            return Ok("cancelled\n".to_string());
        }

        Ok(match self.controller.kill_process(pid).await {
            Ok(()) => format!("PID {} terminated\n", pid),
            Err(e) => format!("kill failed: {}\n", e),
        })
    }

    async fn print(&mut self, text: &str) -> Result<()> {
        self.stdout.write_all(text.as_bytes()).await?;
        self.stdout.flush().await?;
        Ok(())
    }
}
