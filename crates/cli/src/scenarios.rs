//! Demonstration trees run by the binary.
//!
//! Actions stand in for real work by sleeping for the configured step, so the
//! trees take long enough for polling and cancellation to be observable.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use task_tree::builder::{action, branch_else, repeat_forever, sequence};
use task_tree::{
    Action, Predicate, RepeatBound, RepeatingSequence, SharedNode, Status, TaskRunner, WorkerPool,
    shared,
};
use tracing::{debug, info, warn};

use crate::config::{CliConfig, Scenario};

/// Attempt on which the flaky operation of the retry scenario succeeds.
const FLAKY_SUCCESS_ATTEMPT: u64 = 3;

/// Polls issued before the abort scenario gives up on its tree.
const POLLS_BEFORE_ABORT: usize = 3;

/// What a scenario reports back to `main`.
#[derive(Debug)]
pub struct Outcome {
    pub status: Status,
    pub summary: String,
}

pub async fn run(pool: &WorkerPool, config: &CliConfig) -> Result<Outcome> {
    match config.scenario {
        Scenario::Patrol => patrol(pool, config).await,
        Scenario::Retry => retry(pool, config).await,
        Scenario::Abort => abort(pool, config).await,
    }
}

fn walk(waypoint: &'static str, step: Duration, walked: &Arc<AtomicU64>) -> SharedNode {
    let walked = Arc::clone(walked);
    shared(
        Action::new(move || {
            std::thread::sleep(step);
            walked.fetch_add(1, Ordering::SeqCst);
            debug!(waypoint, "waypoint reached");
            true
        })
        .named(format!("walk-{waypoint}"))
        .with_description(format!("walk to the {waypoint}")),
    )
}

/// Polls `runner` with the pool's interval until it finishes, the way an
/// embedding application would.
async fn observe(runner: &mut TaskRunner, pool: &WorkerPool) -> Result<Status> {
    let interval = pool.config().poll_interval;
    runner.start()?;

    let mut polls = 0u64;
    loop {
        let status = runner.poll(interval, false).await?;
        if status.is_terminal() {
            debug!(polls, "tree finished");
            return Ok(status);
        }
        polls += 1;
    }
}

async fn patrol(pool: &WorkerPool, config: &CliConfig) -> Result<Outcome> {
    let walked = Arc::new(AtomicU64::new(0));
    let laps = Arc::new(AtomicU64::new(0));
    let alerts = Arc::new(AtomicU64::new(0));
    let ticks = Arc::new(AtomicU64::new(0));

    let lap_done = {
        let laps = Arc::clone(&laps);
        action(move || {
            laps.fetch_add(1, Ordering::SeqCst);
            true
        })
    };

    // Every other lap the sensor trips.
    let sensor = {
        let laps = Arc::clone(&laps);
        let alerts = Arc::clone(&alerts);
        branch_else(
            move || laps.load(Ordering::SeqCst) % 2 == 1,
            action(move || {
                alerts.fetch_add(1, Ordering::SeqCst);
                warn!("movement detected near the tower");
                true
            }),
            action(|| {
                debug!("all clear");
                true
            }),
        )
    };

    let route = vec![
        walk("gate", config.step, &walked),
        walk("yard", config.step, &walked),
        walk("tower", config.step, &walked),
        lap_done,
        sensor,
    ];

    let counter = Arc::clone(&ticks);
    let tree = shared(
        RepeatingSequence::times(config.repeats, route)?
            .named("patrol")
            .with_tick_hook(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            }),
    );

    info!(laps = config.repeats, "starting patrol");
    let mut runner = TaskRunner::new(tree, pool.clone());
    let status = observe(&mut runner, pool).await?;

    Ok(Outcome {
        status,
        summary: format!(
            "{} laps, {} waypoints, {} alerts, {} progress ticks",
            laps.load(Ordering::SeqCst),
            walked.load(Ordering::SeqCst),
            alerts.load(Ordering::SeqCst),
            ticks.load(Ordering::Relaxed),
        ),
    })
}

async fn retry(pool: &WorkerPool, config: &CliConfig) -> Result<Outcome> {
    let attempts = Arc::new(AtomicU64::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let attempt = {
        let attempts = Arc::clone(&attempts);
        let done = Arc::clone(&done);
        let step = config.step;
        shared(
            Action::new(move || {
                std::thread::sleep(step);
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt >= FLAKY_SUCCESS_ATTEMPT {
                    done.store(true, Ordering::SeqCst);
                } else {
                    warn!(attempt, "upload rejected");
                }
                true
            })
            .named("upload"),
        )
    };

    let settle = {
        let done = Arc::clone(&done);
        let step = config.step;
        branch_else(
            move || done.load(Ordering::SeqCst),
            action(|| {
                info!("upload accepted");
                true
            }),
            action(move || {
                std::thread::sleep(step * 2);
                true
            }),
        )
    };

    let condition: Predicate = {
        let done = Arc::clone(&done);
        Arc::new(move || done.load(Ordering::SeqCst))
    };
    let tree = shared(
        RepeatingSequence::new(
            RepeatBound::times(config.repeats)?,
            Some(condition),
            true,
            vec![sequence(vec![attempt, settle])],
        )?
        .named("retry-upload"),
    );

    info!(budget = config.repeats, "starting retry");
    let mut runner = TaskRunner::new(tree, pool.clone());
    let status = observe(&mut runner, pool).await?;

    let attempts = attempts.load(Ordering::SeqCst);
    let summary = if status.is_success() {
        format!("succeeded after {attempts} attempts")
    } else {
        format!("gave up after {attempts} attempts")
    };
    Ok(Outcome { status, summary })
}

async fn abort(pool: &WorkerPool, config: &CliConfig) -> Result<Outcome> {
    let walked = Arc::new(AtomicU64::new(0));
    let endless = || {
        repeat_forever(vec![
            walk("north", config.step, &walked),
            walk("south", config.step, &walked),
        ])
    };

    // Abort one runner directly.
    let mut runner = TaskRunner::new(endless(), pool.clone());
    runner.start()?;
    for _ in 0..POLLS_BEFORE_ABORT {
        let status = runner.poll(config.step, false).await?;
        debug!(?status, "still walking");
    }
    let aborted = runner.abort().await?;
    let status = runner.poll(Duration::ZERO, false).await?;
    info!(aborted, ?status, "runner aborted");

    // Drain the whole pool under a second runner, then bring it back.
    let mut stranded = TaskRunner::new(endless(), pool.clone());
    stranded.start()?;
    stranded.poll(config.step, false).await?;
    pool.drain().await;
    let stranded_status = stranded.poll(Duration::ZERO, false).await?;
    info!(status = ?stranded_status, "runner stopped by drain");

    pool.restart();
    let mut fresh = TaskRunner::new(action(|| true), pool.clone());
    let restarted = fresh.run().await?;

    Ok(Outcome {
        status,
        summary: format!(
            "aborted={aborted}, {} waypoints before stopping, drained runner reported {stranded_status:?}, restarted pool ran to {restarted:?}",
            walked.load(Ordering::SeqCst),
        ),
    })
}
