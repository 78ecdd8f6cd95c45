//! Background link ingestion and command sending.
//!
//! `Transport::start` spawns exactly one thread that owns the `LinkReader`.
//! It reads one byte at a time with the link read timeout, feeds the frame
//! decoder and hands accepted payloads to the `DeviceSession`. The thread
//! checks a shutdown flag on every iteration and drops the reader (closing the
//! port) before it exits. A pause flag parks the loop without tearing anything
//! down.
//!
//! The writer half is shared behind a mutex so that the control tick and
//! event observers can send commands concurrently.
use crossbeam_channel as xch;
use parking_lot::Mutex;
use pluto_traits::clock::Clock;
use pluto_traits::{LinkReader, LinkWriter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::command::{Command, CommandSink};
use crate::error::{PlutoError, Result};
use crate::frame::{FrameDecoder, FrameOutcome};
use crate::session::DeviceSession;

/// Poll interval while paused.
const PAUSE_POLL: Duration = Duration::from_millis(5);
/// Back-off after a read error so a dead port does not spin the CPU.
const ERROR_BACKOFF: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy)]
pub struct TransportCfg {
    pub read_timeout: Duration,
    /// Upper bound on waiting for the ingestion thread in `stop`.
    pub join_timeout: Duration,
}

impl Default for TransportCfg {
    fn default() -> Self {
        Self {
            read_timeout: pluto_traits::link::READ_TIMEOUT,
            join_timeout: Duration::from_millis(1000),
        }
    }
}

type SharedWriter = Arc<Mutex<Box<dyn LinkWriter + Send>>>;

/// Cloneable handle that frames and writes commands.
#[derive(Clone)]
pub struct CommandSender {
    writer: SharedWriter,
    session: Arc<DeviceSession>,
}

impl CommandSender {
    pub fn new<W: LinkWriter + Send + 'static>(writer: W, session: Arc<DeviceSession>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            session,
        }
    }
}

impl CommandSink for CommandSender {
    fn send(&self, cmd: &Command) {
        let frame = cmd.to_frame();
        let res = self.writer.lock().write_all(&frame);
        match res {
            Ok(()) => tracing::trace!(opcode = %cmd.opcode(), len = frame.len(), "command sent"),
            Err(e) => {
                let err = crate::hw_error::map_link_error(e.as_ref());
                tracing::warn!(opcode = %cmd.opcode(), error = %err, "command write failed");
                self.session.on_write_error();
            }
        }
    }
}

pub struct Transport {
    sender: CommandSender,
    session: Arc<DeviceSession>,
    shutdown: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    done_rx: xch::Receiver<()>,
    join_handle: Option<std::thread::JoinHandle<()>>,
    join_timeout: Duration,
}

impl Transport {
    /// Start ingesting from `reader`. Opening the port is the caller's job, so
    /// an open failure surfaces before any thread exists.
    ///
    /// Fails with `PlutoError::Io` if the ingestion thread cannot be spawned.
    pub fn start<R, W, C>(
        mut reader: R,
        writer: W,
        session: Arc<DeviceSession>,
        clock: C,
        cfg: TransportCfg,
    ) -> Result<Self>
    where
        R: LinkReader + Send + 'static,
        W: LinkWriter + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let paused = Arc::new(AtomicBool::new(false));
        let paused_clone = paused.clone();
        let (done_tx, done_rx) = xch::bounded(1);
        let thread_session = session.clone();

        let join_handle = std::thread::Builder::new()
            .name("pluto-ingest".into())
            .spawn(move || {
                let mut frames = FrameDecoder::inbound();
                let mut was_paused = false;
                loop {
                    if shutdown_clone.load(Ordering::Relaxed) {
                        tracing::debug!("ingestion thread received shutdown signal");
                        break;
                    }
                    if paused_clone.load(Ordering::Relaxed) {
                        if !was_paused {
                            frames.reset();
                            was_paused = true;
                            tracing::debug!("ingestion paused");
                        }
                        clock.sleep(PAUSE_POLL);
                        continue;
                    }
                    was_paused = false;

                    match reader.read_byte(cfg.read_timeout) {
                        Ok(Some(b)) => match frames.push(b) {
                            Some(FrameOutcome::Accepted(payload)) => {
                                thread_session.ingest(&payload, clock.now());
                            }
                            Some(FrameOutcome::Rejected(e)) => thread_session.on_rejected(e),
                            None => {}
                        },
                        Ok(None) => {
                            let mid_frame = frames.in_frame();
                            if mid_frame {
                                frames.reset();
                            }
                            thread_session.on_timeout(mid_frame);
                        }
                        Err(e) => {
                            let err = crate::hw_error::map_link_error(e.as_ref());
                            match err {
                                PlutoError::Timeout => thread_session.on_timeout(frames.in_frame()),
                                other => tracing::warn!(error = %other, "link read failed"),
                            }
                            frames.reset();
                            if shutdown_clone.load(Ordering::Relaxed) {
                                break;
                            }
                            clock.sleep(ERROR_BACKOFF);
                        }
                    }
                }
                drop(reader);
                tracing::trace!("ingestion thread exiting cleanly");
                let _ = done_tx.send(());
            });

        let join_handle = join_handle.map_err(|e| {
            tracing::error!(error = %e, "failed to spawn ingestion thread");
            PlutoError::Io(format!("spawn ingestion thread: {e}"))
        })?;

        Ok(Self {
            sender: CommandSender::new(writer, session.clone()),
            session,
            shutdown,
            paused,
            done_rx,
            join_handle: Some(join_handle),
            join_timeout: cfg.join_timeout,
        })
    }

    pub fn session(&self) -> &Arc<DeviceSession> {
        &self.session
    }

    /// Handle for sending from other threads or observers.
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    pub fn is_running(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Suspend ingestion. Any partial frame is dropped.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Signal the thread and wait up to the join timeout for it to finish.
    ///
    /// Returns `PlutoError::Timeout` if the thread is still blocked in a read
    /// when the timeout expires; it will exit after that read returns.
    pub fn stop(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);
        let Some(handle) = self.join_handle.take() else {
            return Ok(());
        };
        match self.done_rx.recv_timeout(self.join_timeout) {
            Ok(()) | Err(xch::RecvTimeoutError::Disconnected) => {
                if let Err(e) = handle.join() {
                    tracing::warn!(?e, "ingestion thread panicked during shutdown");
                }
                tracing::trace!("ingestion thread joined successfully");
                Ok(())
            }
            Err(xch::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    "ingestion thread did not stop in time; detaching"
                );
                Err(eyre::Report::new(PlutoError::Timeout))
            }
        }
    }
}

impl CommandSink for Transport {
    fn send(&self, cmd: &Command) {
        self.sender.send(cmd);
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::debug!(error = %e, "transport dropped before thread exit");
        }
    }
}
