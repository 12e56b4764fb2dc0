// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::fs::OpenOptions;
use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;
use slog::o;
use slog::Drain;

/// How log records are rendered.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Human,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("invalid log format: {s}")),
        }
    }
}

fn async_root<D>(drain: D, name: &'static str) -> slog::Logger
where
    D: Drain<Ok = (), Err = slog::Never> + Send + 'static,
{
    let drain = slog_async::Async::new(drain)
        .chan_size(0x2000)
        .build()
        .fuse();
    slog::Logger::root(drain, o!("name" => name))
}

/// Build the root logger for a daemon.  If `log_file` is set the records are
/// appended to that file, otherwise they go to stdout.
pub fn init(
    name: &'static str,
    log_file: &Option<String>,
    log_format: LogFormat,
) -> anyhow::Result<slog::Logger> {
    let log = match (log_file, log_format) {
        (Some(path), LogFormat::Human) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {path}"))?;
            let decorator = slog_term::PlainDecorator::new(file);
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            async_root(drain, name)
        }
        (Some(path), LogFormat::Json) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {path}"))?;
            let drain = slog_bunyan::with_name(name, file).build().fuse();
            async_root(drain, name)
        }
        (None, LogFormat::Human) => {
            let decorator = slog_term::TermDecorator::new().build();
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            async_root(drain, name)
        }
        (None, LogFormat::Json) => {
            let drain = slog_bunyan::with_name(name, std::io::stdout())
                .build()
                .fuse();
            async_root(drain, name)
        }
    };

    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::LogFormat;

    #[test]
    fn test_parse_format() {
        assert_eq!("human".parse::<LogFormat>(), Ok(LogFormat::Human));
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
