// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Learning ingestion: a bounded FIFO of (source MAC, ingress port)
//! observations and the worker that drains it into the table.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use slog::debug;
use slog::info;
use slog::o;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;

use crate::config::SweepMode;
use crate::fabric::Fabric;
use common::network::MacAddr;
use common::ports::PortId;

/// One observation from the hardware learning logic.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LearnEvent {
    pub mac: MacAddr,
    pub port: PortId,
}

/// Producer side of the learning FIFO.
#[derive(Clone)]
pub struct LearnSender {
    tx: mpsc::Sender<LearnEvent>,
    dropped: Arc<AtomicU64>,
}

impl LearnSender {
    /// Queue an event without waiting.  When the FIFO is full the event is
    /// lost, exactly as a hardware FIFO overflow would lose it.
    pub fn push(&self, event: LearnEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Queue an event, waiting for room.
    pub async fn push_wait(&self, event: LearnEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Queue an event from a thread outside the async runtime, waiting for
    /// room.
    pub fn blocking_push(&self, event: LearnEvent) -> bool {
        self.tx.blocking_send(event).is_ok()
    }

    /// Events lost to overflow so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer side of the learning FIFO.
pub struct LearnQueue {
    rx: mpsc::Receiver<LearnEvent>,
}

pub fn learn_channel(depth: usize) -> (LearnSender, LearnQueue) {
    let (tx, rx) = mpsc::channel(depth);
    (
        LearnSender {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        LearnQueue { rx },
    )
}

/// Drain learning events into the table until told to stop or until every
/// producer has gone away.
///
/// The worker sleeps while the FIFO is empty, waking at least once per
/// `learn_poll` interval.  In `learner` sweep mode each wakeup that finds the
/// aging clock has moved also runs one batch of age sweeps, so aging keeps
/// up even when no traffic is being learned.
pub async fn learn_loop(
    fabric: Arc<Fabric>,
    mut queue: LearnQueue,
    mut shutdown: watch::Receiver<bool>,
) {
    let log = fabric.log.new(o!("unit" => "learn"));
    let poll = fabric.config().learn_poll();
    let sweeps = fabric.config().sweep_mode == SweepMode::Learner;
    let batch = fabric.config().sweep_batch;
    let mut last_seen = fabric.now();
    let mut learned = 0u64;

    info!(log, "learning worker started"; "sweeps" => sweeps);
    while !*shutdown.borrow() {
        tokio::select! {
            _ = shutdown.changed() => break,
            polled = tokio::time::timeout(poll, queue.rx.recv()) => {
                match polled {
                    Ok(Some(event)) => {
                        fabric.learning_event(event.mac, event.port);
                        learned += 1;
                    }
                    Ok(None) => {
                        info!(log, "learning queue closed");
                        break;
                    }
                    Err(_) => {}
                }
            }
        }

        if sweeps {
            let now = fabric.now();
            if now != last_seen {
                last_seen = now;
                let aged = fabric.sweep_next(batch);
                debug!(log, "swept batch"; "now" => now, "aged" => aged);
            }
        }
    }

    // Anything still queued is abandoned; the next observation of each
    // address will relearn it.
    queue.rx.close();
    info!(log, "learning worker exiting"; "learned" => learned);
}
