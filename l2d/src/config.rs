// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Configuration for `l2d`.

use anyhow::Context;

use atable::TableConfig;

/// The run-time settings of the daemon, assembled from the command line and
/// the optional table configuration file.
#[derive(Debug)]
pub struct Config {
    /// If set, where the log should be written.  If not set, the log goes to
    /// stdout.
    pub log_file: Option<String>,

    /// Output log info in unstructured text or json?
    pub log_format: common::logging::LogFormat,

    /// Geometry, aging and learning settings, plus the static entries to
    /// install at startup.
    pub table: TableConfig,

    /// Where learning and control events are read from.  "-" is stdin.
    pub feed: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_file: None,
            log_format: common::logging::LogFormat::Json,
            table: TableConfig::default(),
            feed: None,
        }
    }
}

fn load_table_config(path: &str) -> anyhow::Result<TableConfig> {
    let txt = std::fs::read_to_string(path)
        .with_context(|| format!("reading table config {path}"))?;
    TableConfig::from_toml(&txt)
        .with_context(|| format!("parsing table config {path}"))
}

/// Build a Config from the command-line options.
pub(crate) fn build_config(opts: &crate::Opt) -> anyhow::Result<Config> {
    let mut config = Config::default();

    if let Some(log_file) = &opts.log_file {
        config.log_file = Some(log_file.to_string());
    }

    if let Some(log_format) = opts.log_format {
        config.log_format = log_format;
    }

    if let Some(path) = &opts.config {
        config.table = load_table_config(path)?;
    }

    if let Some(age_max) = opts.age_max {
        config.table.age_max = age_max;
    }

    if opts.protect_static {
        config.table.protect_static = true;
    }

    config.table.validate()?;

    if let Some(feed) = &opts.feed {
        config.feed = Some(feed.to_string());
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Opt;

    use std::io::Write;

    #[test]
    fn test_updates() {
        let opts = Opt {
            log_file: Some("test.log".to_string()),
            age_max: Some(30),
            feed: Some("-".to_string()),
            ..Opt::default()
        };

        let config = build_config(&opts).unwrap();
        assert_eq!(config.log_file, Some("test.log".to_string()));
        assert_eq!(config.table.age_max, 30);
        assert_eq!(config.table.buckets, 256);
        assert_eq!(config.feed, Some("-".to_string()));
        assert!(!config.table.protect_static);
    }

    #[test]
    fn test_config_file() {
        let path = std::env::temp_dir()
            .join(format!("l2d-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "timestamp_bits = 7").unwrap();
        writeln!(file, "age_max = 100").unwrap();
        drop(file);

        let opts = Opt {
            config: Some(path.display().to_string()),
            protect_static: true,
            ..Opt::default()
        };
        let config = build_config(&opts).unwrap();
        assert_eq!(config.table.timestamp_bits, 7);
        assert_eq!(config.table.age_max, 100);
        assert!(config.table.protect_static);

        // An override that no longer fits the counter width is refused.
        let opts = Opt {
            config: Some(path.display().to_string()),
            age_max: Some(127),
            ..Opt::default()
        };
        assert!(build_config(&opts).is_err());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let opts = Opt {
            config: Some("/nonexistent/l2d.toml".to_string()),
            ..Opt::default()
        };
        assert!(build_config(&opts).is_err());
    }
}
