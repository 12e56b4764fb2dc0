// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::sync::Arc;
use std::thread;

use anyhow::Context;
use futures::stream::StreamExt;
use libc::c_int;
use signal_hook::consts::SIGHUP;
use signal_hook::consts::SIGINT;
use signal_hook::consts::SIGQUIT;
use signal_hook::consts::SIGTERM;
use signal_hook::consts::SIGUSR1;
use signal_hook::consts::SIGUSR2;
use signal_hook_tokio::Signals;
use slog::debug;
use slog::error;
use slog::info;
use structopt::StructOpt;
use tokio::sync::watch;

use atable::aging::aging_loop;
use atable::learn::learn_loop;
use atable::learn_channel;
use atable::Fabric;

mod config;
mod feed;

#[derive(Debug, Default, StructOpt)]
#[structopt(name = "l2d", about = "layer 2 address table daemon")]
pub(crate) struct Opt {
    #[structopt(long, about = "log file")]
    log_file: Option<String>,

    #[structopt(
        long,
        short = "l",
        about = "log format",
        help = "format logs for 'human' or 'json' consumption"
    )]
    log_format: Option<common::logging::LogFormat>,

    #[structopt(long, short, help = "TOML file with the table configuration")]
    config: Option<String>,

    #[structopt(
        long,
        help = "ticks an unrefreshed learned entry survives before aging out"
    )]
    age_max: Option<u8>,

    #[structopt(
        long,
        help = "refuse to let learning overwrite static entries"
    )]
    protect_static: bool,

    #[structopt(
        long,
        short,
        help = "file of learning and control events, or '-' for stdin"
    )]
    feed: Option<String>,
}

fn log_table(log: &slog::Logger, fabric: &Fabric) {
    let dump = fabric.dump_table();
    info!(log, "table contents";
        "now" => dump.now,
        "dynamic" => dump.dynamic.len(),
        "static" => dump.statics.len());
    for d in &dump.dynamic {
        info!(log, "dynamic";
            "mac" => %d.mac, "port" => %d.port, "age" => d.age);
    }
    for s in &dump.statics {
        info!(log, "static";
            "mac" => %s.mac,
            "ports" => %s.port_mask,
            "priority" => %s.priority);
    }
    info!(log, "table usage"; "usage" => ?fabric.usage());
}

async fn handle_signals(fabric: &Fabric, mut signals: Signals) {
    let log = fabric.log.new(slog::o!("unit" => "signal_handler"));
    let handle = signals.handle();

    while let Some(signal) = signals.next().await {
        match signal {
            SIGTERM | SIGQUIT | SIGINT | SIGHUP => {
                info!(log, "received signal"; "sig" => signal);
                handle.close();
                return;
            }
            SIGUSR1 => log_table(&log, fabric),
            SIGUSR2 => {
                info!(log, "flushing table");
                fabric.clear_all();
            }
            _ => unreachable!(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opt::from_args();
    let config = config::build_config(&opts)?;

    let log =
        common::logging::init("l2d", &config.log_file, config.log_format)?;
    info!(log, "starting address table";
        "buckets" => config.table.buckets,
        "entries_per_bucket" => config.table.entries_per_bucket,
        "age_max" => config.table.age_max,
        "sweep_mode" => ?config.table.sweep_mode);

    // Register for signals before anything can fail slowly, so that an early
    // request to stop is queued rather than killing the process.
    const SIGNALS: &[c_int] =
        &[SIGTERM, SIGQUIT, SIGINT, SIGHUP, SIGUSR1, SIGUSR2];
    let signals =
        Signals::new(SIGNALS).context("registering signal handlers")?;

    let fabric = Arc::new(Fabric::new(&log, config.table.clone())?);
    let (sender, queue) = learn_channel(config.table.learn_queue_depth);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let learn_task = tokio::spawn(learn_loop(
        fabric.clone(),
        queue,
        shutdown_rx.clone(),
    ));
    let aging_task = tokio::spawn(aging_loop(fabric.clone(), shutdown_rx));

    // The feed reads block, so it gets a thread of its own.  It is never
    // joined: a reader parked on stdin would hold up shutdown.
    if let Some(path) = &config.feed {
        let reader = feed::open(path)?;
        let fabric = fabric.clone();
        let sender = sender.clone();
        thread::Builder::new()
            .name("feed".to_string())
            .spawn(move || feed::feed_loop(fabric, sender, reader))
            .context("spawning feed thread")?;
    } else {
        debug!(log, "no feed configured");
    }

    handle_signals(&fabric, signals).await;

    info!(log, "shutting down address table");
    let dropped = sender.dropped();
    drop(sender);
    if shutdown_tx.send(true).is_err() {
        debug!(log, "workers already gone");
    }
    let (learn_res, aging_res) = tokio::join!(learn_task, aging_task);
    if let Err(e) = learn_res {
        error!(log, "learning worker failed: {e:?}");
    }
    if let Err(e) = aging_res {
        error!(log, "aging driver failed: {e:?}");
    }

    info!(log, "done"; "learn_dropped" => dropped);
    Ok(())
}
