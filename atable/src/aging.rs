// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::sync::Arc;

use slog::debug;
use slog::info;
use slog::o;
use tokio::sync::watch;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;

use crate::config::SweepMode;
use crate::fabric::Fabric;

/// Drive the aging clock, and in `timer` sweep mode the batched age sweeps.
///
/// The clock tick and the sweep run on independent periods.  Each sweep
/// visits `sweep_batch` buckets, so a full pass over the table completes
/// every `buckets / sweep_batch` sweeps.
pub async fn aging_loop(
    fabric: Arc<Fabric>,
    mut shutdown: watch::Receiver<bool>,
) {
    let log = fabric.log.new(o!("unit" => "aging"));
    let config = fabric.config();
    let sweeps = config.sweep_mode == SweepMode::Timer;
    let batch = config.sweep_batch;

    let mut tick = interval(config.tick_interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sweep = interval(config.sweep_interval());
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // an interval's first tick fires immediately
    tick.tick().await;
    sweep.tick().await;

    info!(log, "aging driver started";
        "tick_ms" => config.tick_interval_ms,
        "sweeps" => sweeps);
    while !*shutdown.borrow() {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                let now = fabric.tick();
                debug!(log, "tick"; "now" => now);
            }
            _ = sweep.tick(), if sweeps => {
                let aged = fabric.sweep_next(batch);
                if aged > 0 {
                    debug!(log, "swept batch"; "aged" => aged);
                }
            }
        }
    }
    info!(log, "aging driver exiting");
}
