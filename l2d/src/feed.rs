// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! A line-oriented event feed standing in for the switch hardware and the
//! control plane.  Each line is one of:
//!
//! ```text
//! learn <mac> <port>
//! link <port> up|down
//! static <mac> <port>[,<port>...] [priority]
//! unstatic <mac>
//! clear
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Context;
use slog::debug;
use slog::error;
use slog::info;
use slog::warn;

use atable::learn::LearnSender;
use atable::Fabric;
use atable::LearnEvent;
use atable::Priority;
use common::network::MacAddr;
use common::ports::PortId;
use common::ports::PortMask;

#[derive(Debug, PartialEq, Eq)]
enum FeedCommand {
    Learn(LearnEvent),
    Link { port: PortId, up: bool },
    Static {
        mac: MacAddr,
        ports: PortMask,
        priority: Priority,
    },
    Unstatic(MacAddr),
    Clear,
}

fn parse_mac(field: Option<&str>) -> anyhow::Result<MacAddr> {
    let field = field.ok_or_else(|| anyhow!("missing MAC address"))?;
    field
        .parse()
        .map_err(|e| anyhow!("bad MAC address {field}: {e}"))
}

fn parse_port(field: Option<&str>) -> anyhow::Result<PortId> {
    let field = field.ok_or_else(|| anyhow!("missing port"))?;
    field.parse().map_err(|e| anyhow!("bad port {field}: {e}"))
}

fn parse_line(line: &str) -> anyhow::Result<Option<FeedCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut fields = line.split_whitespace();
    let verb = fields.next().unwrap_or_default();
    let cmd = match verb {
        "learn" => FeedCommand::Learn(LearnEvent {
            mac: parse_mac(fields.next())?,
            port: parse_port(fields.next())?,
        }),
        "link" => {
            let port = parse_port(fields.next())?;
            let up = match fields.next() {
                Some("up") => true,
                Some("down") => false,
                other => bail!("bad link state: {other:?}"),
            };
            FeedCommand::Link { port, up }
        }
        "static" => {
            let mac = parse_mac(fields.next())?;
            let ports: PortMask = fields
                .next()
                .ok_or_else(|| anyhow!("missing port list"))?
                .parse()
                .map_err(|e| anyhow!("bad port list: {e}"))?;
            if ports.is_empty() {
                bail!("empty port list");
            }
            let priority = match fields.next() {
                Some(p) => {
                    let p: u8 =
                        p.parse().with_context(|| format!("bad priority {p}"))?;
                    Priority::new(p)?
                }
                None => Priority::default(),
            };
            FeedCommand::Static {
                mac,
                ports,
                priority,
            }
        }
        "unstatic" => FeedCommand::Unstatic(parse_mac(fields.next())?),
        "clear" => FeedCommand::Clear,
        _ => bail!("unknown command: {verb}"),
    };

    if let Some(extra) = fields.next() {
        bail!("trailing input: {extra}");
    }
    Ok(Some(cmd))
}

fn apply(fabric: &Fabric, sender: &LearnSender, cmd: FeedCommand) -> bool {
    match cmd {
        FeedCommand::Learn(event) => {
            if !sender.blocking_push(event) {
                return false;
            }
        }
        FeedCommand::Link { port, up } => {
            let flushed = fabric.port_link_changed(port, up);
            info!(fabric.log, "link event";
                "port" => %port, "up" => up, "flushed" => flushed);
        }
        FeedCommand::Static {
            mac,
            ports,
            priority,
        } => {
            if let Err(e) = fabric.static_entry_set(mac, ports, priority) {
                error!(fabric.log, "failed to set static entry: {e}");
            }
        }
        FeedCommand::Unstatic(mac) => {
            if !fabric.static_entry_clear(mac) {
                warn!(fabric.log, "no static entry to clear"; "mac" => %mac);
            }
        }
        FeedCommand::Clear => fabric.clear_all(),
    }
    true
}

/// Open the named feed, with "-" meaning stdin.
pub fn open(path: &str) -> anyhow::Result<Box<dyn BufRead + Send>> {
    if path == "-" {
        Ok(Box::new(BufReader::new(std::io::stdin())))
    } else {
        let file =
            File::open(path).with_context(|| format!("opening feed {path}"))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Read the feed until it ends or the learning worker goes away.  This runs
/// on its own thread, outside the async runtime, since reads block.
pub fn feed_loop(
    fabric: Arc<Fabric>,
    sender: LearnSender,
    reader: Box<dyn BufRead + Send>,
) {
    let log = fabric.log.new(slog::o!("unit" => "feed"));
    let mut lines = 0;

    for (idx, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!(log, "failed to read feed: {e}");
                break;
            }
        };
        match parse_line(&line) {
            Ok(Some(cmd)) => {
                if !apply(&fabric, &sender, cmd) {
                    info!(log, "learning worker gone, stopping feed");
                    break;
                }
                lines += 1;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(log, "skipping bad feed line";
                    "line" => idx + 1, "error" => %e)
            }
        }
    }
    debug!(log, "feed finished"; "commands" => lines);
}
