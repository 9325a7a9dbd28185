//! In-memory block buffering with flushes to the session output file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::BufferLimits;
use crate::error::BufferError;

/// Figures returned by [`BufferManager::finalize`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferSummary {
    pub duration: Duration,
    pub throughput_bytes_per_sec: f64,
    pub total_bytes: usize,
    pub output_dir: PathBuf,

    /// `None` only if the output file could not be created at all.
    pub file_path: Option<PathBuf>,
}

/// Snapshot of the buffer while a run is in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferStats {
    pub elapsed: Duration,
    pub total_bytes: usize,
    pub buffered_bytes: usize,
    pub buffered_blocks: usize,
}

/// Accumulates formatted blocks and writes them to one output file per run.
///
/// The file is named `<mode>-<host>-<YYYYMMDD-HHMMSS>.txt`; the name is
/// fixed when the manager is created, so every flush of a run appends to
/// the same file.
#[derive(Debug)]
pub struct BufferManager {
    output_dir: PathBuf,
    file_path: PathBuf,
    limits: BufferLimits,
    blocks: Vec<String>,
    buffered_bytes: usize,
    total_bytes: usize,
    started: Instant,
    written: bool,
    cap_warned: bool,
    summary: Option<BufferSummary>,
}

impl BufferManager {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        mode_tag: &str,
        host: &str,
        limits: BufferLimits,
    ) -> Self {
        let output_dir = output_dir.into();
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let file_path = output_dir.join(format!("{mode_tag}-{host}-{timestamp}.txt"));
        Self {
            output_dir,
            file_path,
            limits,
            blocks: Vec::new(),
            buffered_bytes: 0,
            total_bytes: 0,
            started: Instant::now(),
            written: false,
            cap_warned: false,
            summary: None,
        }
    }

    /// Buffer one block.
    ///
    /// Returns false, leaving every counter untouched, if the block would
    /// push the run past the hard cap. Crossing the soft threshold flushes.
    pub fn add_data(&mut self, block: String) -> bool {
        let size = block.len();
        if self.total_bytes + size > self.limits.hard_cap_bytes {
            if !self.cap_warned {
                self.cap_warned = true;
                warn!(
                    "{}; further output is dropped",
                    BufferError::CapExceeded {
                        limit: self.limits.hard_cap_bytes
                    }
                );
            }
            return false;
        }

        self.blocks.push(block);
        self.buffered_bytes += size;
        self.total_bytes += size;

        if self.buffered_bytes > self.limits.soft_flush_bytes {
            debug!("{} bytes buffered, flushing", self.buffered_bytes);
            self.flush();
        }
        true
    }

    /// Append every buffered block to the output file.
    ///
    /// On failure the buffer is kept and false is returned.
    pub fn flush(&mut self) -> bool {
        if self.blocks.is_empty() {
            return true;
        }
        match self.write_blocks() {
            Ok(()) => {
                debug!(
                    "flushed {} blocks ({} bytes) to {}",
                    self.blocks.len(),
                    self.buffered_bytes,
                    self.file_path.display()
                );
                self.blocks.clear();
                self.buffered_bytes = 0;
                self.written = true;
                true
            }
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    fn write_blocks(&self) -> Result<(), BufferError> {
        let io_err = |source| BufferError::Io {
            path: self.file_path.clone(),
            source,
        };
        fs::create_dir_all(&self.output_dir).map_err(io_err)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        for block in &self.blocks {
            writer.write_all(block.as_bytes()).map_err(io_err)?;
        }
        writer.flush().map_err(io_err)
    }

    /// Last flush, make sure the file exists and compute the run figures.
    ///
    /// Calling it again returns the first summary without touching the file.
    pub fn finalize(&mut self) -> BufferSummary {
        if let Some(summary) = &self.summary {
            return summary.clone();
        }

        if !self.flush() {
            warn!("{} bytes could not be written", self.buffered_bytes);
        }
        let file_path = if self.ensure_file() {
            Some(self.file_path.clone())
        } else {
            None
        };

        let duration = self.started.elapsed();
        let secs = duration.as_secs_f64();
        let throughput = if secs > 0.0 {
            self.total_bytes as f64 / secs
        } else {
            0.0
        };

        let summary = BufferSummary {
            duration,
            throughput_bytes_per_sec: throughput,
            total_bytes: self.total_bytes,
            output_dir: self.output_dir.clone(),
            file_path,
        };
        info!(
            "output finalized: {} bytes in {:.2}s -> {}",
            summary.total_bytes,
            secs,
            self.file_path.display()
        );
        self.summary = Some(summary.clone());
        summary
    }

    fn ensure_file(&self) -> bool {
        if self.written || self.file_path.exists() {
            return true;
        }
        let created =
            fs::create_dir_all(&self.output_dir).and_then(|_| File::create(&self.file_path));
        match created {
            Ok(_) => true,
            Err(e) => {
                error!("could not create {}: {}", self.file_path.display(), e);
                false
            }
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            elapsed: self.started.elapsed(),
            total_bytes: self.total_bytes,
            buffered_bytes: self.buffered_bytes,
            buffered_blocks: self.blocks.len(),
        }
    }
}
