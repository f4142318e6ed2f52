// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 媒体后端 (Media backend)
//!
//! 打开摄像头 / 视频文件 / 视频写出器 / 预览窗口的统一入口
//! - OpenCV:   `opencv` feature, 完整功能
//! - NoVideo:  未编译 OpenCV 时只支持图片模式

#[cfg(feature = "opencv")]
pub mod opencv;

use std::path::Path;

use crate::capture::{FrameSource, SourceInfo};
use crate::config::CameraSettings;
use crate::display::{Display, NullDisplay};
use crate::error::{Error, Result};
use crate::writer::{FrameSink, WriterSpec};

#[cfg(feature = "opencv")]
pub use self::opencv::OpenCvBackend;

/// 扫描到的摄像头
#[derive(Clone, Debug, PartialEq)]
pub struct CameraInfo {
    pub index: i32,
    pub info: SourceInfo,
}

pub trait MediaBackend {
    fn name(&self) -> &'static str;

    /// `settings` 为 None 时使用设备默认模式
    fn open_camera(
        &self,
        index: i32,
        settings: Option<&CameraSettings>,
    ) -> Result<Box<dyn FrameSource>>;

    fn open_video(&self, path: &Path) -> Result<Box<dyn FrameSource>>;

    fn open_writer(&self, spec: &WriterSpec) -> Result<Box<dyn FrameSink>>;

    fn open_display(&self, title: &str) -> Result<Box<dyn Display>>;

    /// 依次尝试打开 `0..max_cameras`, 读取属性后立即释放
    fn probe_cameras(&self, max_cameras: i32) -> Vec<CameraInfo> {
        let mut found = Vec::new();
        for index in 0..max_cameras {
            match self.open_camera(index, None) {
                Ok(mut source) => {
                    let info = source.info();
                    source.release();
                    found.push(CameraInfo { index, info });
                }
                Err(e) => log::debug!("摄像头 {} 不可用: {}", index, e),
            }
        }
        found
    }
}

/// 未编译视频支持时的后端
#[derive(Debug, Default)]
pub struct NoVideoBackend;

const NO_VIDEO_HINT: &str = "rebuild with `--features opencv` for camera and video support";

impl MediaBackend for NoVideoBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    fn open_camera(
        &self,
        index: i32,
        _settings: Option<&CameraSettings>,
    ) -> Result<Box<dyn FrameSource>> {
        Err(Error::source_unavailable(
            format!("camera {}", index),
            NO_VIDEO_HINT,
        ))
    }

    fn open_video(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        Err(Error::UnsupportedFormat(format!(
            "cannot decode {}: {}",
            path.display(),
            NO_VIDEO_HINT
        )))
    }

    fn open_writer(&self, spec: &WriterSpec) -> Result<Box<dyn FrameSink>> {
        Err(Error::UnsupportedFormat(format!(
            "cannot encode {} with {}: {}",
            spec.path.display(),
            spec.codec,
            NO_VIDEO_HINT
        )))
    }

    fn open_display(&self, title: &str) -> Result<Box<dyn Display>> {
        log::warn!("⚠️ 未编译预览窗口支持, 不显示 {:?}", title);
        Ok(Box::new(NullDisplay))
    }
}

/// 按编译特性选择后端
pub fn default_backend() -> Box<dyn MediaBackend> {
    #[cfg(feature = "opencv")]
    {
        Box::new(OpenCvBackend)
    }
    #[cfg(not(feature = "opencv"))]
    {
        Box::new(NoVideoBackend)
    }
}
