//! Runs the calibrator on its own thread.
//!
//! The GUI thread only holds the intent sender and the shared dashboard.
//! The calibrator is built on the worker thread itself (the camera handle
//! may not be `Send`), and startup failures are reported back before
//! `spawn` returns.

use anyhow::{anyhow, Context, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::calibrator::{Calibrator, TickOutcome};
use super::dashboard::Dashboard;
use super::intent::Intent;
use crate::serial::Connector;

/// Handle to the running processing thread.
pub struct Worker {
    handle: Option<JoinHandle<Result<()>>>,
    shutdown: Arc<AtomicBool>,
    intents: Sender<Intent>,
    dashboard: Arc<Mutex<Dashboard>>,
}

impl Worker {
    pub fn intents(&self) -> Sender<Intent> {
        self.intents.clone()
    }

    pub fn dashboard(&self) -> Arc<Mutex<Dashboard>> {
        Arc::clone(&self.dashboard)
    }

    /// Stops the loop and waits for the thread to release its resources.
    ///
    /// Returns the error that stopped the loop, if it stopped on its own.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.intents.send(Intent::Shutdown);

        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("Processing thread panicked during shutdown"))?,
            None => Ok(()),
        }
    }
}

/// Spawns the processing thread.
///
/// `build` runs on the new thread and receives the intent receiver and the
/// dashboard. If it fails, the error is returned here and no thread is left
/// running.
pub fn spawn<C, F>(build: F, tick_interval: Duration) -> Result<Worker>
where
    C: Connector + 'static,
    F: FnOnce(Receiver<Intent>, Arc<Mutex<Dashboard>>) -> Result<Calibrator<C>> + Send + 'static,
{
    let (intent_tx, intent_rx) = mpsc::channel();
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);
    let dashboard = Arc::new(Mutex::new(Dashboard::default()));
    let shutdown = Arc::new(AtomicBool::new(false));

    let thread_dashboard = Arc::clone(&dashboard);
    let thread_shutdown = Arc::clone(&shutdown);

    let handle = thread::Builder::new()
        .name("processing".to_string())
        .spawn(move || {
            let mut calibrator = match build(intent_rx, thread_dashboard) {
                Ok(calibrator) => {
                    let _ = ready_tx.send(Ok(()));
                    calibrator
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return Ok(());
                }
            };
            run_loop(&mut calibrator, &thread_shutdown, tick_interval)
        })
        .context("Failed to spawn processing thread")?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(Worker {
            handle: Some(handle),
            shutdown,
            intents: intent_tx,
            dashboard,
        }),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => {
            let _ = handle.join();
            Err(anyhow!("Processing thread exited during startup"))
        }
    }
}

fn run_loop<C: Connector>(
    calibrator: &mut Calibrator<C>,
    shutdown: &AtomicBool,
    interval: Duration,
) -> Result<()> {
    log::info!("Processing loop started");
    let mut failure: Option<anyhow::Error> = None;

    while !shutdown.load(Ordering::SeqCst) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| calibrator.tick()))
            .unwrap_or_else(|_| Err(anyhow!("Processing tick panicked")));

        match result {
            Ok(TickOutcome::Continue) => {}
            Ok(TickOutcome::Stop) => break,
            Err(e) => {
                log::error!("Processing loop stopped: {:#}", e);
                failure = Some(e);
                break;
            }
        }
        thread::sleep(interval);
    }

    calibrator.close();
    calibrator.report_stopped(failure.as_ref());
    log::info!("Processing loop finished");

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
