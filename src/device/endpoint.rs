//! Speaker/microphone endpoint backed by blocking device adapters.

use crate::config::Config;
use crate::device::{CaptureDevice, PlaybackDevice};
use crate::endpoint::{EndpointChannels, StreamEndpoint};
use crate::error::{Result, VoxbridgeError};
use crate::event::{AudioChunk, StreamEvent};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{error, warn};

/// Endpoint that plays routed audio on a local output device and produces
/// events from a local input device.
///
/// Both devices run on dedicated worker threads spawned at `initialize`;
/// frames cross into the async world over channels, so a blocking device
/// call can never stall the routing loop.
pub struct DeviceEndpoint {
    channels: EndpointChannels,
    mime_type: String,
    capture_buffer: usize,
    playback_buffer: usize,
    poll_interval: Duration,
    capture: StdMutex<Option<Box<dyn CaptureDevice>>>,
    playback: StdMutex<Option<Box<dyn PlaybackDevice>>>,
    frames: Mutex<Option<mpsc::Receiver<Result<Vec<u8>>>>>,
    playback_tx: StdMutex<Option<mpsc::Sender<Vec<u8>>>>,
    workers: StdMutex<Vec<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl DeviceEndpoint {
    /// Creates a device endpoint with default configuration.
    pub fn new(
        name: &str,
        capture: Box<dyn CaptureDevice>,
        playback: Box<dyn PlaybackDevice>,
    ) -> Self {
        Self::with_config(name, capture, playback, &Config::default())
    }

    /// Creates a device endpoint with explicit queue and device settings.
    pub fn with_config(
        name: &str,
        capture: Box<dyn CaptureDevice>,
        playback: Box<dyn PlaybackDevice>,
        config: &Config,
    ) -> Self {
        Self {
            channels: EndpointChannels::with_config(name, &config.queues),
            mime_type: config.device.mime_type.clone(),
            capture_buffer: config.device.capture_buffer,
            playback_buffer: config.device.playback_buffer,
            poll_interval: Duration::from_millis(config.device.poll_interval_ms),
            capture: StdMutex::new(Some(capture)),
            playback: StdMutex::new(Some(playback)),
            frames: Mutex::new(None),
            playback_tx: StdMutex::new(None),
            workers: StdMutex::new(Vec::new()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn take_capture(&self) -> Option<Box<dyn CaptureDevice>> {
        self.capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn take_playback(&self) -> Option<Box<dyn PlaybackDevice>> {
        self.playback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl StreamEndpoint for DeviceEndpoint {
    fn name(&self) -> &str {
        self.channels.name()
    }

    fn channels(&self) -> &EndpointChannels {
        &self.channels
    }

    async fn initialize(&self) -> Result<()> {
        let mut capture = self.take_capture().ok_or_else(|| VoxbridgeError::Other(
            "device endpoint initialized twice".to_string(),
        ))?;
        capture.start()?;

        let mut playback = self.take_playback().ok_or_else(|| VoxbridgeError::Other(
            "device endpoint initialized twice".to_string(),
        ))?;
        if let Err(start_error) = playback.start() {
            if let Err(stop_error) = capture.stop() {
                warn!(
                    endpoint = self.channels.name(),
                    %stop_error,
                    "failed to stop capture device after playback start failure"
                );
            }
            return Err(start_error);
        }

        self.running.store(true, Ordering::SeqCst);

        let (frame_tx, frame_rx) = mpsc::channel(self.capture_buffer);
        let capture_worker = {
            let running = self.running.clone();
            let poll = self.poll_interval;
            let endpoint = self.channels.name().to_string();
            thread::spawn(move || capture_loop(capture, frame_tx, running, poll, endpoint))
        };

        let (play_tx, play_rx) = mpsc::channel(self.playback_buffer);
        let playback_worker = {
            let endpoint = self.channels.name().to_string();
            thread::spawn(move || playback_loop(playback, play_rx, endpoint))
        };

        *self.frames.lock().await = Some(frame_rx);
        *self
            .playback_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(play_tx);
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([capture_worker, playback_worker]);
        Ok(())
    }

    async fn deliver(&self, event: Arc<StreamEvent>) -> Result<()> {
        // Transcript-only and control events carry nothing to play.
        let Some(audio) = &event.audio else {
            return Ok(());
        };
        let tx = self
            .playback_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| VoxbridgeError::Other(
                "device endpoint delivery flow started before initialize".to_string(),
            ))?;
        tx.send(audio.data.clone())
            .await
            .map_err(|_| VoxbridgeError::Device {
                message: "playback worker stopped".to_string(),
            })
    }

    async fn produce(&self) -> Result<()> {
        let mut frames =
            self.frames
                .lock()
                .await
                .take()
                .ok_or_else(|| VoxbridgeError::Other(
                    "device endpoint production flow started before initialize".to_string(),
                ))?;
        loop {
            match self.channels.stop().race(frames.recv()).await {
                // Stop won the race.
                None => return Ok(()),
                // Capture worker gone: the source drained normally.
                Some(None) => {
                    self.channels.signal_end_of_source().await;
                    return Ok(());
                }
                Some(Some(Err(error))) => return Err(error),
                Some(Some(Ok(chunk))) => {
                    let event = StreamEvent::audio(
                        self.channels.name(),
                        AudioChunk::new(chunk, self.mime_type.as_str()),
                    );
                    if self.channels.enqueue_inbound(event).await.is_stopped() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        // Dropping the playback sender lets its worker drain and exit;
        // dropping the frame receiver unblocks a capture worker stuck in a
        // full-channel send.
        self.playback_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.frames.lock().await.take();

        let workers: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for worker in workers {
            if worker.join().is_err() {
                warn!(endpoint = self.channels.name(), "device worker panicked");
            }
        }
        Ok(())
    }
}

/// Polls the capture device until stop, exhaustion, or failure, forwarding
/// chunks into the async side.
fn capture_loop(
    mut device: Box<dyn CaptureDevice>,
    tx: mpsc::Sender<Result<Vec<u8>>>,
    running: Arc<AtomicBool>,
    poll: Duration,
    endpoint: String,
) {
    while running.load(Ordering::SeqCst) {
        match device.read_chunk() {
            Ok(Some(chunk)) if chunk.is_empty() => {
                // No samples ready yet (normal at device startup).
                thread::sleep(poll);
            }
            Ok(Some(chunk)) => {
                if tx.blocking_send(Ok(chunk)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(read_error) => {
                error!(endpoint = %endpoint, error = %read_error, "audio capture failed");
                let _ = tx.blocking_send(Err(read_error));
                break;
            }
        }
    }
    if let Err(stop_error) = device.stop() {
        warn!(endpoint = %endpoint, error = %stop_error, "failed to stop capture device");
    }
}

/// Writes routed audio to the playback device until the channel closes or a
/// write fails.
fn playback_loop(
    mut device: Box<dyn PlaybackDevice>,
    mut rx: mpsc::Receiver<Vec<u8>>,
    endpoint: String,
) {
    while let Some(chunk) = rx.blocking_recv() {
        if let Err(write_error) = device.write_chunk(&chunk) {
            error!(endpoint = %endpoint, error = %write_error, "audio playback failed");
            break;
        }
    }
    if let Err(stop_error) = device.stop() {
        warn!(endpoint = %endpoint, error = %stop_error, "failed to stop playback device");
    }
}
