// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 采集适配器 (Capture adapter)
//!
//! 摄像头与视频文件统一为 "打开 / 读帧 / 释放"。`Capture` 持有底层句柄,
//! 无论循环如何退出 (正常结束、用户停止、读帧出错、提前返回), 都只释放一次。

use image::RgbImage;

use crate::error::Result;

/// 打开后的输入源属性
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    /// 0 表示设备未报告
    pub fps: f64,
    /// 视频文件的总帧数; 摄像头为 None
    pub frame_count: Option<u64>,
    pub backend: String,
}

/// 底层采集实现 (OpenCV / 测试桩)
pub trait FrameSource {
    /// 下一帧; 视频结束返回 `Ok(None)`
    fn read(&mut self) -> Result<Option<RgbImage>>;

    fn info(&self) -> SourceInfo;

    /// 关闭设备/文件句柄
    fn release(&mut self);
}

pub struct Capture {
    inner: Box<dyn FrameSource>,
    name: String,
    released: bool,
}

impl Capture {
    pub fn new(inner: Box<dyn FrameSource>, name: impl Into<String>) -> Self {
        let name = name.into();
        log::info!("📹 已打开输入源: {}", name);
        Self {
            inner,
            name,
            released: false,
        }
    }

    pub fn read(&mut self) -> Result<Option<RgbImage>> {
        if self.released {
            return Ok(None);
        }
        self.inner.read()
    }

    pub fn info(&self) -> SourceInfo {
        self.inner.info()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// 幂等
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.inner.release();
        log::info!("📹 已释放输入源: {}", self.name);
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.release();
    }
}
