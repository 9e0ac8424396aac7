//! Chunk producers
//!
//! Both deployment shapes hand chunks to the scheduler through
//! [`ChunkSource`]: [`InlineChunkSource`] generates synchronously on the
//! caller's thread, [`WorkerChunkSource`] generates on a dedicated thread
//! and passes chunks back by message.

use super::AudioChunk;
use crate::inverter::ModulationEngine;
use crate::{Result, VvvfError};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Producer of audio chunks at a requested speed
pub trait ChunkSource {
    /// Ask for one chunk of `size` samples at `speed` km/h
    fn request(&mut self, speed: f64, size: usize);

    /// Next finished chunk, if one is ready
    fn poll(&mut self) -> Option<AudioChunk>;

    /// Requests issued but not yet returned by `poll`
    fn pending(&self) -> usize;

    /// Like `poll`, but a source that generates elsewhere may block up to `timeout`
    fn wait(&mut self, timeout: Duration) -> Option<AudioChunk> {
        let _ = timeout;
        self.poll()
    }
}

/// Generates chunks synchronously inside `request`
#[derive(Debug)]
pub struct InlineChunkSource {
    engine: ModulationEngine,
    sample_rate: u32,
    ready: VecDeque<AudioChunk>,
}

impl InlineChunkSource {
    /// Wrap an engine; the source becomes the engine's only user
    pub fn new(engine: ModulationEngine, sample_rate: u32) -> Self {
        InlineChunkSource {
            engine,
            sample_rate,
            ready: VecDeque::new(),
        }
    }

    /// Engine driving this source
    pub fn engine(&self) -> &ModulationEngine {
        &self.engine
    }
}

impl ChunkSource for InlineChunkSource {
    fn request(&mut self, speed: f64, size: usize) {
        let samples = self
            .engine
            .produce_chunk(speed, size, f64::from(self.sample_rate));
        self.ready.push_back(AudioChunk::new(samples, self.sample_rate));
    }

    fn poll(&mut self) -> Option<AudioChunk> {
        self.ready.pop_front()
    }

    fn pending(&self) -> usize {
        self.ready.len()
    }
}

/// Message sent to the generation worker
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkerRequest {
    /// Generate `size` samples at `speed` km/h
    Generate {
        /// Vehicle speed in km/h
        speed: f64,
        /// Samples to generate
        size: usize,
    },
    /// Exit the worker loop
    Shutdown,
}

/// Generates chunks on a dedicated thread that owns its engine
#[derive(Debug)]
pub struct WorkerChunkSource {
    requests: Sender<WorkerRequest>,
    chunks: Receiver<AudioChunk>,
    worker: Option<JoinHandle<()>>,
    pending: usize,
}

impl WorkerChunkSource {
    /// Move `engine` onto a new worker thread
    pub fn spawn(engine: ModulationEngine, sample_rate: u32) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<WorkerRequest>();
        let (chunk_tx, chunk_rx) = mpsc::channel::<AudioChunk>();

        let worker = thread::Builder::new()
            .name("vvvf-generator".into())
            .spawn(move || run_worker(engine, sample_rate, request_rx, chunk_tx))
            .map_err(|e| VvvfError::Other(format!("Failed to spawn generator thread: {e}")))?;

        Ok(WorkerChunkSource {
            requests: request_tx,
            chunks: chunk_rx,
            worker: Some(worker),
            pending: 0,
        })
    }

    /// Block up to `timeout` for the next chunk
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<AudioChunk> {
        match self.chunks.recv_timeout(timeout) {
            Ok(chunk) => {
                self.pending = self.pending.saturating_sub(1);
                Some(chunk)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.pending = 0;
                None
            }
        }
    }

    /// Stop the worker and wait for it to exit
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        // A worker that already exited has dropped its receiver
        let _ = self.requests.send(WorkerRequest::Shutdown);
        if worker.join().is_err() {
            tracing::warn!("generator thread panicked");
        }
        self.pending = 0;
    }

    /// Whether the worker thread is still attached
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl ChunkSource for WorkerChunkSource {
    fn request(&mut self, speed: f64, size: usize) {
        if self.requests.send(WorkerRequest::Generate { speed, size }).is_ok() {
            self.pending += 1;
        } else {
            tracing::warn!("generator thread is gone; request dropped");
        }
    }

    fn poll(&mut self) -> Option<AudioChunk> {
        let chunk = self.chunks.try_recv().ok()?;
        self.pending = self.pending.saturating_sub(1);
        Some(chunk)
    }

    fn pending(&self) -> usize {
        self.pending
    }

    fn wait(&mut self, timeout: Duration) -> Option<AudioChunk> {
        self.recv_timeout(timeout)
    }
}

impl Drop for WorkerChunkSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    mut engine: ModulationEngine,
    sample_rate: u32,
    requests: Receiver<WorkerRequest>,
    chunks: Sender<AudioChunk>,
) {
    tracing::debug!(sample_rate, "generator thread started");
    let rate = f64::from(sample_rate);
    for request in requests {
        match request {
            WorkerRequest::Generate { speed, size } => {
                let samples = engine.produce_chunk(speed, size, rate);
                if chunks.send(AudioChunk::new(samples, sample_rate)).is_err() {
                    break;
                }
            }
            WorkerRequest::Shutdown => break,
        }
    }
    tracing::debug!("generator thread exiting");
}
