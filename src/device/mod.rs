//! Blocking audio device adapters.
//!
//! Physical audio I/O blocks, and blocking calls must never run on the
//! scheduler that drives the routing loop. The adapters here keep device
//! calls on dedicated worker threads and hand frames back through channels:
//!
//! ```text
//! ┌─────────┐ read_chunk ┌────────────────┐ channel ┌──────────────────┐
//! │ capture │───────────▶│ capture worker │────────▶│ production flow  │
//! │ device  │  (blocks)  │    (thread)    │         │ (enqueue_inbound)│
//! └─────────┘            └────────────────┘         └──────────────────┘
//!
//! ┌──────────────────┐ channel ┌─────────────────┐ write_chunk ┌──────────┐
//! │ delivery flow    │────────▶│ playback worker │────────────▶│ playback │
//! │ (deliver)        │         │    (thread)     │  (blocks)   │ device   │
//! └──────────────────┘         └─────────────────┘             └──────────┘
//! ```

pub mod endpoint;

pub use endpoint::DeviceEndpoint;

use crate::error::{Result, VoxbridgeError};

/// Blocking capture side of an audio device (microphone, file, test double).
///
/// Runs entirely on the capture worker thread; implementations may block in
/// `read_chunk`.
pub trait CaptureDevice: Send {
    /// Start capturing.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing.
    fn stop(&mut self) -> Result<()>;

    /// Read the next chunk of encoded audio.
    ///
    /// # Returns
    /// - `Ok(Some(chunk))` — captured bytes (may be empty if no samples are
    ///   ready yet; the worker polls again after a short interval)
    /// - `Ok(None)` — the source is exhausted (file ended, device detached
    ///   cleanly)
    /// - `Err(_)` — capture failed
    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Blocking playback side of an audio device (speaker, file, test double).
pub trait PlaybackDevice: Send {
    /// Start playback.
    fn start(&mut self) -> Result<()>;

    /// Stop playback.
    fn stop(&mut self) -> Result<()>;

    /// Write one chunk of encoded audio. May block until the device has
    /// buffered the samples.
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()>;
}

/// Mock capture device for testing
pub struct MockCaptureDevice {
    chunks: Vec<Vec<u8>>,
    position: usize,
    endless: bool,
    should_fail_start: bool,
    should_fail_read: bool,
    error_message: String,
}

impl MockCaptureDevice {
    /// Create a mock that yields the given chunks, then reports exhaustion
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            position: 0,
            endless: false,
            should_fail_start: false,
            should_fail_read: false,
            error_message: "mock capture error".to_string(),
        }
    }

    /// Keep reporting "no samples yet" after the chunks instead of ending
    pub fn endless(mut self) -> Self {
        self.endless = true;
        self
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on read
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }
}

impl CaptureDevice for MockCaptureDevice {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            return Err(VoxbridgeError::Device {
                message: self.error_message.clone(),
            });
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.should_fail_read {
            return Err(VoxbridgeError::Device {
                message: self.error_message.clone(),
            });
        }
        if self.position < self.chunks.len() {
            let chunk = self.chunks[self.position].clone();
            self.position += 1;
            Ok(Some(chunk))
        } else if self.endless {
            Ok(Some(Vec::new()))
        } else {
            Ok(None)
        }
    }
}

/// Mock playback device that records written chunks for inspection
pub struct MockPlaybackDevice {
    written: std::sync::Arc<std::sync::Mutex<Vec<Vec<u8>>>>,
    should_fail_write: bool,
}

impl MockPlaybackDevice {
    pub fn new() -> Self {
        Self {
            written: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
            should_fail_write: false,
        }
    }

    /// Configure the mock to fail on write
    pub fn with_write_failure(mut self) -> Self {
        self.should_fail_write = true;
        self
    }

    /// Handle to the chunks written so far; clone before moving the device
    /// into an endpoint.
    pub fn written(&self) -> std::sync::Arc<std::sync::Mutex<Vec<Vec<u8>>>> {
        self.written.clone()
    }
}

impl Default for MockPlaybackDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackDevice for MockPlaybackDevice {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if self.should_fail_write {
            return Err(VoxbridgeError::Device {
                message: "mock playback error".to_string(),
            });
        }
        self.written
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(chunk.to_vec());
        Ok(())
    }
}
