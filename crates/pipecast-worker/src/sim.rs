//! In-process stand-in for a real-time transport SDK.
//!
//! `SimulatedBackend` accepts every frame a real SDK would accept, keeps
//! counters, and plays back a plausible connect sequence from a background
//! thread. It backs `pipecast worker`, whose `--sim-connect-delay` sets the
//! connect delay, and the test suites.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use pipecast_protocol::{AudioConfig, SessionConfig, VideoConfig};

use crate::backend::{AudioFrame, RtcBackend, RtcCode, RtcConnection, RtcResult, VideoFrame};
use crate::event::{ConnectionEvent, EventSender};

const ERR_INVALID_ARGUMENT: RtcCode = RtcCode(-2);
const ERR_NOT_INITIALIZED: RtcCode = RtcCode(-7);

/// SDK calls the simulator records or can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulatedCall {
    Initialize,
    CreateConnection,
    Connect,
    SetVideoEncoder,
    PublishAudio,
    PublishVideo,
    UnpublishAudio,
    UnpublishVideo,
    PushVideo,
    PushAudio,
    Disconnect,
    Release,
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<SimulatedCall>>,
    video_frames: AtomicU64,
    audio_frames: AtomicU64,
    events: Mutex<Option<EventSender>>,
    released: AtomicBool,
}

impl Recorder {
    fn record(&self, call: SimulatedCall) {
        lock(&self.calls).push(call);
    }
}

/// Simulated SDK. Clones observe the same recorded activity.
#[derive(Clone)]
pub struct SimulatedBackend {
    connect_delay: Duration,
    auto_connect: bool,
    failures: HashMap<SimulatedCall, i32>,
    recorder: Arc<Recorder>,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self {
            connect_delay: Duration::from_millis(50),
            auto_connect: true,
            failures: HashMap::new(),
            recorder: Arc::new(Recorder::default()),
        }
    }

    /// Time between the connect call and the connected callback.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Never fire lifecycle events on their own; use [`inject`](Self::inject).
    pub fn without_auto_connect(mut self) -> Self {
        self.auto_connect = false;
        self
    }

    /// Make `call` return `code` instead of succeeding.
    pub fn failing(mut self, call: SimulatedCall, code: i32) -> Self {
        self.failures.insert(call, code);
        self
    }

    /// Deliver an event as if the SDK had fired it. Returns false if no
    /// connection has registered an observer yet.
    pub fn inject(&self, event: ConnectionEvent) -> bool {
        match lock(&self.recorder.events).as_ref() {
            Some(events) => {
                events.emit(event);
                true
            }
            None => false,
        }
    }

    /// Connection-level calls seen so far, excluding frame pushes.
    pub fn calls(&self) -> Vec<SimulatedCall> {
        lock(&self.recorder.calls).clone()
    }

    pub fn video_frames(&self) -> u64 {
        self.recorder.video_frames.load(Ordering::SeqCst)
    }

    pub fn audio_frames(&self) -> u64 {
        self.recorder.audio_frames.load(Ordering::SeqCst)
    }

    /// Whether the global release has run.
    pub fn is_released(&self) -> bool {
        self.recorder.released.load(Ordering::SeqCst)
    }

    fn forced(&self, call: SimulatedCall) -> RtcResult {
        forced(&self.failures, call)
    }
}

impl RtcBackend for SimulatedBackend {
    fn initialize(&self, config: &SessionConfig) -> RtcResult {
        tracing::debug!(app_id = %config.app_id, "simulated sdk initialize");
        self.forced(SimulatedCall::Initialize)
    }

    fn create_connection(
        &self,
        config: &SessionConfig,
        events: EventSender,
    ) -> Result<Arc<dyn RtcConnection>, RtcCode> {
        self.forced(SimulatedCall::CreateConnection)?;
        *lock(&self.recorder.events) = Some(events.clone());
        Ok(Arc::new(SimulatedConnection {
            video: config.video.clone(),
            audio: config.audio.clone(),
            connect_delay: self.connect_delay,
            auto_connect: self.auto_connect,
            failures: self.failures.clone(),
            recorder: Arc::clone(&self.recorder),
            events,
            released: AtomicBool::new(false),
        }))
    }

    fn release(&self) {
        self.recorder.released.store(true, Ordering::SeqCst);
        lock(&self.recorder.events).take();
    }
}

struct SimulatedConnection {
    video: VideoConfig,
    audio: AudioConfig,
    connect_delay: Duration,
    auto_connect: bool,
    failures: HashMap<SimulatedCall, i32>,
    recorder: Arc<Recorder>,
    events: EventSender,
    released: AtomicBool,
}

impl SimulatedConnection {
    fn call(&self, call: SimulatedCall) -> RtcResult {
        self.recorder.record(call);
        if self.released.load(Ordering::SeqCst) {
            return Err(ERR_NOT_INITIALIZED);
        }
        forced(&self.failures, call)
    }

    fn push(&self, call: SimulatedCall, len: usize, expected: usize, timestamp: i64) -> RtcResult {
        if self.released.load(Ordering::SeqCst) {
            return Err(ERR_NOT_INITIALIZED);
        }
        forced(&self.failures, call)?;
        if len != expected {
            return Err(ERR_INVALID_ARGUMENT);
        }
        let counter = match call {
            SimulatedCall::PushVideo => &self.recorder.video_frames,
            _ => &self.recorder.audio_frames,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(?call, timestamp, "simulated push");
        Ok(())
    }
}

impl RtcConnection for SimulatedConnection {
    fn connect(&self, _token: &str, channel: &str, user_id: &str) -> RtcResult {
        self.call(SimulatedCall::Connect)?;
        if !self.auto_connect {
            return Ok(());
        }

        let events = self.events.clone();
        let delay = self.connect_delay;
        let channel = channel.to_string();
        let user_id = user_id.to_string();
        thread::Builder::new()
            .name("sim-connect".to_string())
            .spawn(move || {
                events.emit(ConnectionEvent::Connecting { reason: 0 });
                thread::sleep(delay);
                events.emit(ConnectionEvent::Connected { channel, user_id });
            })
            .map(|_| ())
            .map_err(|err| {
                tracing::warn!(error = %err, "simulated connect thread failed to start");
                RtcCode(-1)
            })
    }

    fn set_video_encoder(&self, config: &VideoConfig) -> RtcResult {
        tracing::debug!(
            codec = %config.codec,
            bitrate_kbps = config.bitrate_kbps,
            min_bitrate_kbps = config.min_bitrate_kbps,
            "simulated encoder configured"
        );
        self.call(SimulatedCall::SetVideoEncoder)
    }

    fn publish_audio(&self) -> RtcResult {
        self.call(SimulatedCall::PublishAudio)
    }

    fn publish_video(&self) -> RtcResult {
        self.call(SimulatedCall::PublishVideo)
    }

    fn unpublish_audio(&self) -> RtcResult {
        self.call(SimulatedCall::UnpublishAudio)
    }

    fn unpublish_video(&self) -> RtcResult {
        self.call(SimulatedCall::UnpublishVideo)
    }

    fn push_video_frame(&self, frame: &VideoFrame<'_>) -> RtcResult {
        if frame.width != self.video.width || frame.height != self.video.height {
            return Err(ERR_INVALID_ARGUMENT);
        }
        self.push(
            SimulatedCall::PushVideo,
            frame.buffer.len(),
            self.video.frame_size(),
            frame.timestamp_nanos,
        )
    }

    fn push_audio_pcm(&self, frame: &AudioFrame<'_>) -> RtcResult {
        if frame.sample_rate != self.audio.sample_rate || frame.channels != self.audio.channels {
            return Err(ERR_INVALID_ARGUMENT);
        }
        self.push(
            SimulatedCall::PushAudio,
            frame.buffer.len(),
            self.audio.frame_size(),
            frame.timestamp_nanos,
        )
    }

    fn disconnect(&self) -> RtcResult {
        self.call(SimulatedCall::Disconnect)
    }

    fn release(&self) {
        self.recorder.record(SimulatedCall::Release);
        self.released.store(true, Ordering::SeqCst);
    }
}

fn forced(failures: &HashMap<SimulatedCall, i32>, call: SimulatedCall) -> RtcResult {
    match failures.get(&call) {
        Some(&code) => Err(RtcCode(code)),
        None => Ok(()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
