// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 写出适配器 (Writer adapter)

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::error::{Error, Result};

/// 打开视频写出器时声明的参数; 之后每一帧尺寸必须一致
#[derive(Clone, Debug, PartialEq)]
pub struct WriterSpec {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// fourcc, 例如 `mp4v`
    pub codec: String,
}

/// 底层编码实现 (OpenCV / 测试桩)
pub trait FrameSink {
    fn write(&mut self, frame: &RgbImage) -> Result<()>;

    /// 写入容器尾部并关闭文件
    fn finish(&mut self) -> Result<()>;
}

pub struct VideoOutput {
    inner: Box<dyn FrameSink>,
    spec: WriterSpec,
    frames_written: u64,
    closed: bool,
}

impl VideoOutput {
    pub fn new(inner: Box<dyn FrameSink>, spec: WriterSpec) -> Self {
        log::info!(
            "💾 视频写出器已打开: {} ({}x{} @ {:.1} fps, {})",
            spec.path.display(),
            spec.width,
            spec.height,
            spec.fps,
            spec.codec
        );
        Self {
            inner,
            spec,
            frames_written: 0,
            closed: false,
        }
    }

    pub fn write(&mut self, frame: &RgbImage) -> Result<()> {
        if self.closed {
            return Err(Error::output_write(&self.spec.path, "writer already closed"));
        }
        if frame.dimensions() != (self.spec.width, self.spec.height) {
            return Err(Error::FrameSizeMismatch {
                expected_width: self.spec.width,
                expected_height: self.spec.height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            });
        }
        self.inner.write(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// 幂等
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.inner.finish();
        log::info!(
            "💾 视频写出器已关闭: {} ({} 帧)",
            self.spec.path.display(),
            self.frames_written
        );
        result
    }
}

impl Drop for VideoOutput {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("❌ 关闭视频写出器失败: {}", e);
        }
    }
}

/// 创建输出目录; 已存在的文件会被覆盖 (仅警告)
pub fn prepare_output_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::output_write(path, e))?;
    }
    if path.is_dir() {
        return Err(Error::output_write(path, "path is a directory"));
    }
    if path.exists() {
        log::warn!("⚠️ 输出文件已存在, 将被覆盖: {}", path.display());
    }
    Ok(())
}

/// 保存单张标注图片, 格式由扩展名决定
pub fn save_image(frame: &RgbImage, path: &Path) -> Result<()> {
    prepare_output_path(path)?;
    frame.save(path).map_err(|e| match e {
        image::ImageError::Unsupported(_) => Error::UnsupportedFormat(format!(
            "cannot encode {}: {}",
            path.display(),
            e
        )),
        other => Error::output_write(path, other),
    })?;
    log::info!("💾 输出已保存: {}", path.display());
    Ok(())
}
