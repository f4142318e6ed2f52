// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测驱动 (Detection driver)
//!
//! 三个入口只在帧来源上不同:
//! - `detect_camera`: 摄像头循环, 直到用户停止或设备出错
//! - `detect_video`:  视频文件循环, 每帧回调进度
//! - `detect_image`:  单张图片, 直接解码, 不经过采集适配器
//!
//! 状态机: Idle → Opening → Streaming → Closing → Idle
//! 进入 Closing 的原因 (视频结束、停止请求、读帧/推理出错) 不影响资源释放。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{ImageError, RgbImage};

use crate::annotate::{Annotator, OverlayBox};
use crate::capture::Capture;
use crate::config::DetectorConfig;
use crate::detection::{DetectParams, Detector};
use crate::display::{is_quit_key, Display};
use crate::error::{Error, Result};
use crate::media::MediaBackend;
use crate::progress::Progress;
use crate::source::Source;
use crate::writer::{prepare_output_path, save_image, VideoOutput, WriterSpec};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Opening,
    Streaming,
    Closing,
}

/// 协作式停止标志, 每帧检查一次 (Ctrl-C 处理器在其他线程设置)
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 一次运行的统计
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub detections: u64,
    pub stopped_by_user: bool,
    pub output: Option<PathBuf>,
    pub elapsed: Duration,
    /// 最后一帧上绘制的框
    pub last_overlay: Vec<OverlayBox>,
}

/// 流式运行期间持有的资源; `close` 在任何退出路径上都会执行
struct Session {
    capture: Capture,
    writer: Option<VideoOutput>,
    display: Option<Box<dyn Display>>,
}

impl Session {
    fn close(&mut self) -> Result<()> {
        self.capture.release();
        let closed = match self.writer.as_mut() {
            Some(writer) => writer.close(),
            None => Ok(()),
        };
        if let Some(display) = self.display.as_mut() {
            display.close();
        }
        closed
    }
}

pub struct DetectionDriver<D: Detector> {
    detector: D,
    config: DetectorConfig,
    backend: Box<dyn MediaBackend>,
    annotator: Annotator,
    stop: StopFlag,
    state: DriverState,
}

impl<D: Detector> DetectionDriver<D> {
    pub fn new(detector: D, config: DetectorConfig, backend: Box<dyn MediaBackend>) -> Self {
        Self {
            detector,
            config,
            backend,
            annotator: Annotator::default(),
            stop: StopFlag::new(),
            state: DriverState::Idle,
        }
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    fn set_state(&mut self, state: DriverState) {
        log::debug!("driver: {:?} → {:?}", self.state, state);
        self.state = state;
    }

    /// 本次运行的阈值, 原样传给检测器
    pub fn params(&self) -> DetectParams {
        DetectParams {
            conf: self.config.conf,
            iou: self.config.iou,
        }
    }

    /// 单帧: 检测 → (SUAS 过滤) → 绘制
    pub fn process_frame(&mut self, frame: &mut RgbImage) -> Result<Vec<OverlayBox>> {
        let params = self.params();
        let mut detections = self.detector.detect(frame, &params)?;
        if self.config.suas_only {
            detections.retain(|d| self.config.keeps_label(&d.label));
        }
        log::trace!("{} detections", detections.len());
        Ok(self.annotator.annotate(frame, &detections))
    }

    /// 按输入源类型分派
    pub fn run(
        &mut self,
        source: &Source,
        on_progress: impl FnMut(Progress),
    ) -> Result<RunSummary> {
        let summary = match source {
            Source::Camera(index) => self.detect_camera(*index)?,
            Source::Video(path) => self.detect_video(path, on_progress)?,
            Source::Image(path) => self.detect_image(path)?,
        };
        log::info!(
            "✅ {} 处理完成: {} 帧, {} 个目标, 用时 {:.2?}{}",
            source,
            summary.frames,
            summary.detections,
            summary.elapsed,
            match &summary.output {
                Some(path) => format!(", 输出 {}", path.display()),
                None => String::new(),
            }
        );
        Ok(summary)
    }

    pub fn detect_camera(&mut self, index: i32) -> Result<RunSummary> {
        let source = Source::Camera(index);
        self.set_state(DriverState::Opening);
        let opened = self.backend.open_camera(index, Some(&self.config.camera));
        let inner = match opened {
            Ok(inner) => inner,
            Err(e) => {
                self.set_state(DriverState::Idle);
                return Err(e);
            }
        };
        let capture = Capture::new(inner, source.to_string());
        self.stream(&source, capture, |_| {})
    }

    pub fn detect_video(
        &mut self,
        path: &Path,
        on_progress: impl FnMut(Progress),
    ) -> Result<RunSummary> {
        if !path.is_file() {
            return Err(Error::source_unavailable(
                path.display().to_string(),
                "video file not found",
            ));
        }
        let source = Source::Video(path.to_path_buf());
        self.set_state(DriverState::Opening);
        let inner = match self.backend.open_video(path) {
            Ok(inner) => inner,
            Err(e) => {
                self.set_state(DriverState::Idle);
                return Err(e);
            }
        };
        let capture = Capture::new(inner, source.to_string());
        self.stream(&source, capture, on_progress)
    }

    pub fn detect_image(&mut self, path: &Path) -> Result<RunSummary> {
        if !path.is_file() {
            return Err(Error::source_unavailable(
                path.display().to_string(),
                "image file not found",
            ));
        }
        self.set_state(DriverState::Opening);
        let result = self.detect_image_once(path);
        self.set_state(DriverState::Closing);
        self.set_state(DriverState::Idle);
        result
    }

    fn detect_image_once(&mut self, path: &Path) -> Result<RunSummary> {
        let started = Instant::now();
        let source = Source::Image(path.to_path_buf());
        let mut frame = image::open(path)
            .map_err(|e| match e {
                ImageError::IoError(io) => {
                    Error::source_unavailable(path.display().to_string(), io.to_string())
                }
                other => Error::UnsupportedFormat(format!("{}: {}", path.display(), other)),
            })?
            .to_rgb8();

        self.set_state(DriverState::Streaming);
        let overlay = self.process_frame(&mut frame)?;
        if self.config.hud {
            self.annotator.draw_hud(&mut frame, None);
        }

        let output = if self.config.save {
            let path = source.output_path(&self.config);
            save_image(&frame, &path)?;
            Some(path)
        } else {
            None
        };

        let mut stopped_by_user = false;
        if self.config.display {
            let title = format!("{} - {}", self.config.window_name, source.kind());
            let mut display = self.backend.open_display(&title)?;
            let shown = self.hold_until_key(display.as_mut(), &frame);
            display.close();
            stopped_by_user = shown?;
        }

        Ok(RunSummary {
            frames: 1,
            detections: overlay.len() as u64,
            stopped_by_user,
            output,
            elapsed: started.elapsed(),
            last_overlay: overlay,
        })
    }

    /// 显示图片直到按键或窗口关闭; 收到停止请求时提前返回 true
    fn hold_until_key(&self, display: &mut dyn Display, frame: &RgbImage) -> Result<bool> {
        display.show(frame)?;
        let delay = self.config.display_wait_ms.max(1);
        while display.is_open() {
            if self.stop.is_stopped() {
                log::info!("🛑 收到停止请求");
                return Ok(true);
            }
            if display.wait_key(delay)?.is_some() {
                break;
            }
        }
        Ok(false)
    }

    fn stream(
        &mut self,
        source: &Source,
        capture: Capture,
        on_progress: impl FnMut(Progress),
    ) -> Result<RunSummary> {
        let mut session = Session {
            capture,
            writer: None,
            display: None,
        };
        self.set_state(DriverState::Streaming);
        let result = self.stream_frames(source, &mut session, on_progress);
        if let Err(e) = &result {
            log::error!("❌ {} 中断: {}", source, e);
        }

        self.set_state(DriverState::Closing);
        let closed = session.close();
        self.set_state(DriverState::Idle);

        let summary = result?;
        closed?;
        Ok(summary)
    }

    fn stream_frames(
        &mut self,
        source: &Source,
        session: &mut Session,
        mut on_progress: impl FnMut(Progress),
    ) -> Result<RunSummary> {
        let started = Instant::now();
        let is_video = matches!(source, Source::Video(_));
        let info = session.capture.info();
        log::info!(
            "📹 {}: {}x{} @ {:.1} fps{} [{}]",
            source,
            info.width,
            info.height,
            info.fps,
            match info.frame_count {
                Some(n) => format!(", {} frames", n),
                None => String::new(),
            },
            info.backend
        );
        let total = if is_video { info.frame_count } else { None };
        let fps = if info.fps > 0.0 {
            info.fps
        } else {
            self.config.camera.fps as f64
        };

        if self.config.display {
            let title = format!("{} - {}", self.config.window_name, source.kind());
            session.display = Some(self.backend.open_display(&title)?);
        }
        let output = if self.config.save {
            let path = source.output_path(&self.config);
            prepare_output_path(&path)?;
            Some(path)
        } else {
            None
        };

        let mut summary = RunSummary::default();
        let mut last_frame = Instant::now();
        // 上一帧的进度在读到下一帧 (或视频结束) 后才上报, 最后一帧总是 finished
        let mut pending: Option<Progress> = None;

        loop {
            if self.stop.is_stopped() {
                log::info!("🛑 收到停止请求");
                summary.stopped_by_user = true;
                break;
            }

            let mut frame = match session.capture.read()? {
                Some(frame) => frame,
                None => {
                    if is_video {
                        pending = Some(Progress {
                            processed: summary.frames,
                            total,
                            finished: true,
                        });
                    } else {
                        log::warn!("⚠️ 无法读取摄像头帧 (Failed to grab frame)");
                    }
                    break;
                }
            };
            if let Some(progress) = pending.take() {
                on_progress(progress);
            }

            let overlay = self.process_frame(&mut frame)?;
            if self.config.hud {
                let now = Instant::now();
                let dt = now.duration_since(last_frame).as_secs_f64();
                last_frame = now;
                let current_fps = if dt > 0.0 { Some(1.0 / dt) } else { None };
                self.annotator.draw_hud(&mut frame, current_fps);
            }
            summary.frames += 1;
            summary.detections += overlay.len() as u64;
            summary.last_overlay = overlay;

            if let Some(path) = &output {
                if session.writer.is_none() {
                    let spec = WriterSpec {
                        path: path.clone(),
                        width: frame.width(),
                        height: frame.height(),
                        fps,
                        codec: self.config.video_codec.clone(),
                    };
                    let sink = self.backend.open_writer(&spec)?;
                    session.writer = Some(VideoOutput::new(sink, spec));
                    summary.output = Some(path.clone());
                }
                if let Some(writer) = session.writer.as_mut() {
                    writer.write(&frame)?;
                }
            }

            let mut quit = false;
            if let Some(display) = session.display.as_mut() {
                display.show(&frame)?;
                if let Some(key) = display.wait_key(self.config.display_wait_ms)? {
                    quit = is_quit_key(key);
                }
            }

            if is_video {
                pending = Some(Progress {
                    processed: summary.frames,
                    total,
                    finished: false,
                });
            }

            if quit {
                log::info!("🛑 用户按键退出");
                summary.stopped_by_user = true;
                break;
            }
        }

        if let Some(progress) = pending.take() {
            on_progress(progress);
        }

        summary.elapsed = started.elapsed();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FrameSource, SourceInfo};
    use crate::config::CameraSettings;
    use crate::detection::{Bbox, Detection};
    use crate::writer::FrameSink;
    use image::Rgb;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct Record {
        opened: u32,
        releases: u32,
        written: u32,
        finishes: u32,
        shown: u32,
        waits: u32,
    }

    struct StubSource {
        frames: u32,
        read: u32,
        fail_at: Option<u32>,
        total: Option<u64>,
        record: Rc<RefCell<Record>>,
    }

    impl FrameSource for StubSource {
        fn read(&mut self) -> Result<Option<RgbImage>> {
            if self.fail_at == Some(self.read + 1) {
                return Err(Error::UnsupportedFormat("corrupt frame".to_string()));
            }
            if self.read >= self.frames {
                return Ok(None);
            }
            self.read += 1;
            Ok(Some(RgbImage::new(64, 48)))
        }

        fn info(&self) -> SourceInfo {
            SourceInfo {
                width: 64,
                height: 48,
                fps: 25.0,
                frame_count: self.total,
                backend: "stub".to_string(),
            }
        }

        fn release(&mut self) {
            self.record.borrow_mut().releases += 1;
        }
    }

    struct StubSink(Rc<RefCell<Record>>);

    impl FrameSink for StubSink {
        fn write(&mut self, _frame: &RgbImage) -> Result<()> {
            self.0.borrow_mut().written += 1;
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.0.borrow_mut().finishes += 1;
            Ok(())
        }
    }

    struct StubDisplay {
        keys: VecDeque<u8>,
        /// 第 n 次等待按键时设置停止标志 (模拟 Ctrl-C)
        stop_at_wait: Option<(u32, StopFlag)>,
        record: Rc<RefCell<Record>>,
    }

    impl Display for StubDisplay {
        fn show(&mut self, _frame: &RgbImage) -> Result<()> {
            self.record.borrow_mut().shown += 1;
            Ok(())
        }

        fn wait_key(&mut self, _delay_ms: i32) -> Result<Option<u8>> {
            let waits = {
                let mut record = self.record.borrow_mut();
                record.waits += 1;
                record.waits
            };
            if let Some((at, stop)) = &self.stop_at_wait {
                if waits == *at {
                    stop.request_stop();
                }
            }
            Ok(self.keys.pop_front())
        }

        fn close(&mut self) {}
    }

    #[derive(Default)]
    struct StubBackend {
        frames: u32,
        fail_at: Option<u32>,
        total: Option<u64>,
        keys: Vec<u8>,
        stop_at_wait: Option<(u32, StopFlag)>,
        record: Rc<RefCell<Record>>,
    }

    impl StubBackend {
        fn source(&self) -> Box<dyn FrameSource> {
            self.record.borrow_mut().opened += 1;
            Box::new(StubSource {
                frames: self.frames,
                read: 0,
                fail_at: self.fail_at,
                total: self.total,
                record: self.record.clone(),
            })
        }
    }

    impl MediaBackend for StubBackend {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn open_camera(
            &self,
            _index: i32,
            _settings: Option<&CameraSettings>,
        ) -> Result<Box<dyn FrameSource>> {
            Ok(self.source())
        }

        fn open_video(&self, _path: &Path) -> Result<Box<dyn FrameSource>> {
            Ok(self.source())
        }

        fn open_writer(&self, _spec: &WriterSpec) -> Result<Box<dyn FrameSink>> {
            Ok(Box::new(StubSink(self.record.clone())))
        }

        fn open_display(&self, _title: &str) -> Result<Box<dyn Display>> {
            Ok(Box::new(StubDisplay {
                keys: self.keys.iter().copied().collect(),
                stop_at_wait: self.stop_at_wait.clone(),
                record: self.record.clone(),
            }))
        }
    }

    struct StubDetector {
        detections: Vec<Detection>,
        seen: Vec<DetectParams>,
    }

    impl StubDetector {
        fn new(detections: Vec<Detection>) -> Self {
            Self {
                detections,
                seen: Vec::new(),
            }
        }
    }

    impl Detector for StubDetector {
        fn detect(&mut self, _frame: &RgbImage, params: &DetectParams) -> Result<Vec<Detection>> {
            self.seen.push(*params);
            Ok(self.detections.clone())
        }
    }

    fn person() -> Detection {
        Detection::new(0, "person", 0.9, Bbox::from_xyxy(8.0, 6.0, 30.0, 40.0))
    }

    fn headless() -> DetectorConfig {
        DetectorConfig {
            display: false,
            ..Default::default()
        }
    }

    fn video_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("sample.mp4");
        std::fs::write(&path, b"stub").unwrap();
        path
    }

    fn image_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("sample.png");
        RgbImage::new(64, 48).save(&path).unwrap();
        path
    }

    #[test]
    fn test_thresholds_passed_unmodified() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_file(&dir);
        for (conf, iou) in [(0.0, 0.0), (0.25, 0.45), (0.6, 0.3), (1.0, 1.0)] {
            let config = DetectorConfig {
                conf,
                iou,
                ..headless()
            };
            let mut driver = DetectionDriver::new(
                StubDetector::new(vec![]),
                config,
                Box::new(StubBackend::default()),
            );
            driver.detect_image(&image).unwrap();
            assert_eq!(driver.detector().seen, vec![DetectParams { conf, iou }]);
        }
    }

    #[test]
    fn test_missing_video_is_source_unavailable() {
        let backend = StubBackend::default();
        let record = backend.record.clone();
        let mut driver =
            DetectionDriver::new(StubDetector::new(vec![]), headless(), Box::new(backend));
        let err = driver
            .detect_video(Path::new("/nonexistent/clip.mp4"), |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
        assert_eq!(record.borrow().opened, 0);
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[test]
    fn test_progress_completes_when_file_overreports() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_file(&dir);
        let backend = StubBackend {
            frames: 3,
            total: Some(4),
            ..Default::default()
        };
        let mut driver =
            DetectionDriver::new(StubDetector::new(vec![]), headless(), Box::new(backend));
        let mut fractions = Vec::new();
        driver
            .detect_video(&video, |p| fractions.push(p.fraction()))
            .unwrap();
        assert_eq!(fractions, vec![0.25, 0.5, 1.0]);
    }

    #[test]
    fn test_progress_stays_below_one_when_file_underreports() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_file(&dir);
        let backend = StubBackend {
            frames: 5,
            total: Some(3),
            ..Default::default()
        };
        let mut driver =
            DetectionDriver::new(StubDetector::new(vec![]), headless(), Box::new(backend));
        let mut progress = Vec::new();
        driver.detect_video(&video, |p| progress.push(p)).unwrap();

        assert_eq!(progress.len(), 5);
        let fractions: Vec<f64> = progress.iter().map(|p| p.fraction()).collect();
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert!(fractions[..4].iter().all(|f| *f < 1.0));
        assert_eq!(fractions[2], crate::progress::UNFINISHED_MAX);
        assert!(progress[4].finished);
        assert_eq!(progress[4].processed, 5);
        assert_eq!(fractions[4], 1.0);
    }

    #[test]
    fn test_quit_key_flushes_unfinished_progress() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_file(&dir);
        let backend = StubBackend {
            frames: 10,
            total: Some(10),
            keys: vec![b'x', b'q'],
            ..Default::default()
        };
        let mut driver = DetectionDriver::new(
            StubDetector::new(vec![]),
            DetectorConfig::default(),
            Box::new(backend),
        );
        let mut progress = Vec::new();
        let summary = driver.detect_video(&video, |p| progress.push(p)).unwrap();

        assert!(summary.stopped_by_user);
        assert_eq!(progress.len(), 2);
        assert_eq!(progress[1].processed, 2);
        assert!(!progress[1].finished);
        assert_eq!(progress[1].fraction(), 0.2);
    }

    #[test]
    fn test_image_overlay_matches_stub() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_file(&dir);
        let config = DetectorConfig {
            save: true,
            output: Some(dir.path().join("annotated")),
            image_format: "png".to_string(),
            ..headless()
        };
        let mut driver = DetectionDriver::new(
            StubDetector::new(vec![person()]),
            config,
            Box::new(StubBackend::default()),
        );
        let summary = driver.detect_image(&image).unwrap();

        let b = &summary.last_overlay[0];
        assert_eq!((b.x1, b.y1, b.x2, b.y2), (8, 6, 30, 40));
        assert_eq!(b.text, "person 0.90");

        let saved_path = dir.path().join("annotated.png");
        assert_eq!(summary.output.as_deref(), Some(saved_path.as_path()));
        let saved = image::open(&saved_path).unwrap().to_rgb8();
        assert_eq!(saved.get_pixel(8, 6), &Rgb([255, 0, 0]));
        assert_eq!(saved.get_pixel(30, 40), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_image_window_waits_for_key() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_file(&dir);
        let backend = StubBackend {
            keys: vec![b'a'],
            ..Default::default()
        };
        let record = backend.record.clone();
        let mut driver = DetectionDriver::new(
            StubDetector::new(vec![]),
            DetectorConfig::default(),
            Box::new(backend),
        );
        let summary = driver.detect_image(&image).unwrap();
        assert!(!summary.stopped_by_user);
        assert_eq!(record.borrow().shown, 1);
        assert_eq!(record.borrow().waits, 1);
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[test]
    fn test_stop_flag_ends_image_window_wait() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_file(&dir);
        let stop = StopFlag::new();
        let backend = StubBackend {
            stop_at_wait: Some((3, stop.clone())),
            ..Default::default()
        };
        let record = backend.record.clone();
        let mut driver = DetectionDriver::new(
            StubDetector::new(vec![]),
            DetectorConfig::default(),
            Box::new(backend),
        )
        .with_stop_flag(stop);
        let summary = driver.detect_image(&image).unwrap();
        assert!(summary.stopped_by_user);
        assert_eq!(summary.frames, 1);
        assert_eq!(record.borrow().waits, 3);
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[test]
    fn test_camera_without_frames_reports_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StubBackend::default();
        let record = backend.record.clone();
        let config = DetectorConfig {
            save: true,
            output: Some(dir.path().join("never")),
            ..headless()
        };
        let mut driver = DetectionDriver::new(StubDetector::new(vec![]), config, Box::new(backend));
        let summary = driver.detect_camera(0).unwrap();
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.output, None);
        assert_eq!(record.borrow().written, 0);
        assert_eq!(record.borrow().finishes, 0);
        assert_eq!(record.borrow().releases, 1);
    }

    #[test]
    fn test_release_once_on_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_file(&dir);
        let backend = StubBackend {
            frames: 10,
            total: Some(10),
            fail_at: Some(3),
            ..Default::default()
        };
        let record = backend.record.clone();
        let config = DetectorConfig {
            save: true,
            output: Some(dir.path().join("partial")),
            ..headless()
        };
        let mut driver = DetectionDriver::new(StubDetector::new(vec![]), config, Box::new(backend));
        let err = driver.detect_video(&video, |_| {}).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));

        let record = record.borrow();
        assert_eq!(record.releases, 1);
        assert_eq!(record.finishes, 1);
        assert_eq!(record.written, 2);
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[test]
    fn test_quit_key_stops_camera_loop() {
        let backend = StubBackend {
            frames: 100,
            keys: vec![b'x', b'q'],
            ..Default::default()
        };
        let record = backend.record.clone();
        let mut driver = DetectionDriver::new(
            StubDetector::new(vec![person()]),
            DetectorConfig::default(),
            Box::new(backend),
        );
        let summary = driver.detect_camera(0).unwrap();
        assert!(summary.stopped_by_user);
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.detections, 2);
        assert_eq!(record.borrow().shown, 2);
        assert_eq!(record.borrow().releases, 1);
    }

    #[test]
    fn test_stop_flag_checked_before_first_frame() {
        let backend = StubBackend {
            frames: 5,
            ..Default::default()
        };
        let record = backend.record.clone();
        let mut driver =
            DetectionDriver::new(StubDetector::new(vec![]), headless(), Box::new(backend));
        driver.stop_flag().request_stop();
        let summary = driver.detect_camera(1).unwrap();
        assert!(summary.stopped_by_user);
        assert_eq!(summary.frames, 0);
        assert_eq!(record.borrow().releases, 1);
    }

    #[test]
    fn test_camera_end_of_stream_is_clean() {
        let backend = StubBackend {
            frames: 4,
            ..Default::default()
        };
        let mut driver =
            DetectionDriver::new(StubDetector::new(vec![]), headless(), Box::new(backend));
        let summary = driver.detect_camera(0).unwrap();
        assert_eq!(summary.frames, 4);
        assert!(!summary.stopped_by_user);
    }

    #[test]
    fn test_suas_only_filters_labels() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_file(&dir);
        let laptop = Detection::new(63, "laptop", 0.8, Bbox::from_xyxy(1.0, 1.0, 5.0, 5.0));
        let config = DetectorConfig {
            suas_only: true,
            ..headless()
        };
        let mut driver = DetectionDriver::new(
            StubDetector::new(vec![person(), laptop]),
            config,
            Box::new(StubBackend::default()),
        );
        let summary = driver.detect_image(&image).unwrap();
        assert_eq!(summary.detections, 1);
        assert_eq!(summary.last_overlay[0].text, "person 0.90");
    }
}
