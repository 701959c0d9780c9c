//! Capture thread: pulls frames from a [`FrameSource`], throttles them by
//! system load and hands them to the consumer through a small bounded channel.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::frame::Frame;
use super::throttle::{FrameThrottle, LoadProbe};

/// Frames buffered between the capture thread and the consumer.
pub const CHANNEL_CAPACITY: usize = 2;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Frame source failed: {0}")]
    Source(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// 采集线程配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// 送入管线前的缩放比例
    pub scale: f32,
    /// 两次采集之间的休眠（毫秒）
    pub pacing_ms: u64,
    /// 每隔多少帧采样一次内存负载
    pub load_sample_interval: u64,
    /// 消费端忙时丢帧；关闭后采集线程会等待
    pub drop_when_busy: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            scale: 0.5,
            pacing_ms: 10,
            load_sample_interval: 100,
            drop_when_busy: true,
        }
    }
}

/// Anything that yields frames one at a time.
pub trait FrameSource: Send {
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    fn name(&self) -> String {
        "frame-source".to_string()
    }
}

/// Image files replayed in order, one frame each, with synthetic timestamps
/// `frame_interval_ms` apart.
pub struct ImageSequenceSource {
    paths: VecDeque<PathBuf>,
    frame_interval_ms: u64,
    frame_number: u64,
}

impl ImageSequenceSource {
    pub fn new(paths: Vec<PathBuf>, frame_interval_ms: u64) -> Self {
        Self {
            paths: paths.into(),
            frame_interval_ms,
            frame_number: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        let timestamp_ms = self.frame_number * self.frame_interval_ms;
        let frame = Frame::open(&path, timestamp_ms, self.frame_number)?;
        debug!("Loaded {} ({}x{})", path.display(), frame.width, frame.height);
        self.frame_number += 1;
        Ok(Some(frame))
    }

    fn name(&self) -> String {
        "image-sequence".to_string()
    }
}

/// Counters reported when the capture thread exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub captured: u64,
    pub delivered: u64,
    pub dropped: u64,
}

/// 采集线程句柄
pub struct CaptureWorker {
    handle: Option<JoinHandle<CaptureStats>>,
    stop_signal: Arc<AtomicBool>,
    frames: Option<Receiver<Frame>>,
    name: String,
}

impl CaptureWorker {
    pub fn start<S, P>(source: S, probe: P, settings: CaptureSettings) -> Result<Self, CaptureError>
    where
        S: FrameSource + 'static,
        P: LoadProbe + 'static,
    {
        let name = source.name();
        let stop_signal = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::sync_channel(CHANNEL_CAPACITY);

        let thread_stop = Arc::clone(&stop_signal);
        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(format!("capture-{}", name))
            .spawn(move || run_loop(source, probe, settings, tx, thread_stop, thread_name))?;

        info!("📷 Capture started: {}", name);
        Ok(Self {
            handle: Some(handle),
            stop_signal,
            frames: Some(rx),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocking iterator over delivered frames; ends when the thread exits.
    pub fn frames(&self) -> impl Iterator<Item = Frame> + '_ {
        self.frames.iter().flat_map(|rx| rx.iter())
    }

    /// `None` on timeout or once the thread has exited.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Frame> {
        let rx = self.frames.as_ref()?;
        match rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop to stop without waiting.
    pub fn request_stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop and join. Returns the thread's counters, or `None` if it was
    /// already joined or panicked.
    pub fn stop(&mut self) -> Option<CaptureStats> {
        self.request_stop();
        // unblock a sender waiting on a full channel
        self.frames.take();
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(stats) => {
                info!(
                    "📷 Capture stopped: {} ({} captured, {} delivered, {} dropped)",
                    self.name, stats.captured, stats.delivered, stats.dropped
                );
                Some(stats)
            }
            Err(_) => {
                error!("Capture thread {} panicked", self.name);
                None
            }
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

fn run_loop<S: FrameSource, P: LoadProbe>(
    mut source: S,
    mut probe: P,
    settings: CaptureSettings,
    tx: SyncSender<Frame>,
    stop_signal: Arc<AtomicBool>,
    name: String,
) -> CaptureStats {
    let mut throttle = FrameThrottle::new(settings.load_sample_interval);
    let mut stats = CaptureStats::default();
    let pacing = Duration::from_millis(settings.pacing_ms);

    while !stop_signal.load(Ordering::SeqCst) {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("{}: end of stream", name);
                break;
            }
            Err(e) => {
                warn!("{}: {}", name, e);
                break;
            }
        };
        stats.captured += 1;

        if throttle.on_frame(&mut probe) {
            let frame = frame.scaled(settings.scale);
            let sent = if settings.drop_when_busy {
                match tx.try_send(frame) {
                    Ok(()) => Ok(true),
                    Err(TrySendError::Full(_)) => Ok(false),
                    Err(TrySendError::Disconnected(_)) => Err(()),
                }
            } else {
                tx.send(frame).map(|_| true).map_err(|_| ())
            };
            match sent {
                Ok(true) => stats.delivered += 1,
                Ok(false) => stats.dropped += 1,
                Err(()) => {
                    debug!("{}: consumer gone", name);
                    break;
                }
            }
        }

        if !pacing.is_zero() {
            thread::sleep(pacing);
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::throttle::StaticLoadProbe;

    /// 生成固定数量的纯色帧
    struct CountingSource {
        remaining: u64,
        produced: u64,
    }

    impl FrameSource for CountingSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            self.produced += 1;
            Ok(Some(Frame::new(
                8,
                8,
                vec![200; 8 * 8 * 3],
                self.produced * 33,
                self.produced,
            )))
        }
    }

    struct FailingSource;

    impl FrameSource for FailingSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
            Err(CaptureError::Source("device unplugged".to_string()))
        }
    }

    fn blocking_settings() -> CaptureSettings {
        CaptureSettings {
            scale: 0.5,
            pacing_ms: 0,
            load_sample_interval: 100,
            drop_when_busy: false,
        }
    }

    #[test]
    fn test_delivers_all_frames_when_blocking() {
        let source = CountingSource {
            remaining: 12,
            produced: 0,
        };
        let mut worker =
            CaptureWorker::start(source, StaticLoadProbe(None), blocking_settings()).unwrap();

        let frames: Vec<Frame> = worker.frames().collect();
        assert_eq!(frames.len(), 12);
        assert_eq!(frames[0].width, 4);
        assert_eq!(frames[11].frame_number, 12);

        let stats = worker.stop().unwrap();
        assert_eq!(stats.captured, 12);
        assert_eq!(stats.delivered, 12);
    }

    #[test]
    fn test_source_error_ends_loop() {
        let probe = StaticLoadProbe(None);
        let mut worker = CaptureWorker::start(FailingSource, probe, blocking_settings()).unwrap();
        assert_eq!(worker.frames().count(), 0);
        assert_eq!(worker.stop(), Some(CaptureStats::default()));
    }

    #[test]
    fn test_stop_with_idle_consumer() {
        let source = CountingSource {
            remaining: u64::MAX,
            produced: 0,
        };
        let settings = CaptureSettings {
            pacing_ms: 1,
            drop_when_busy: true,
            ..blocking_settings()
        };
        let mut worker = CaptureWorker::start(source, StaticLoadProbe(None), settings).unwrap();
        assert!(worker.recv_timeout(Duration::from_secs(5)).is_some());

        let stats = worker.stop().unwrap();
        assert!(stats.captured >= 1);
        assert_eq!(stats.captured, stats.delivered + stats.dropped);
        assert!(!worker.is_running());
    }

    #[test]
    fn test_image_sequence_reports_missing_file() {
        let missing = vec![PathBuf::from("/nonexistent/frame.png")];
        let mut source = ImageSequenceSource::new(missing, 100);
        assert!(matches!(source.next_frame(), Err(CaptureError::Image(_))));
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_image_sequence_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..2 {
            let path = dir.path().join(format!("f{}.png", i));
            image::RgbImage::from_pixel(6, 4, image::Rgb([10, 20, 30])).save(&path).unwrap();
            paths.push(path);
        }

        let mut source = ImageSequenceSource::new(paths, 2_500);
        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!((first.width, first.height), (6, 4));
        assert_eq!(first.timestamp_ms, 0);
        assert_eq!(second.timestamp_ms, 2_500);
        assert_eq!(second.frame_number, 1);
        assert_eq!(source.remaining(), 0);
    }
}
