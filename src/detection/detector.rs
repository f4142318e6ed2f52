// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测器接口 (Detector)
//! 职责: 单帧图像 → 检测结果列表

use image::RgbImage;

use super::types::{DetectParams, Detection};
use crate::error::Result;

/// 统一的目标检测接口
///
/// 推理、NMS 都在实现内部完成; 调用方只负责传入阈值并使用结果。
/// 测试中可以用固定输出的桩实现替换真实模型。
pub trait Detector {
    /// 对一帧图像执行检测, `params` 必须原样用于本次推理
    fn detect(&mut self, frame: &RgbImage, params: &DetectParams) -> Result<Vec<Detection>>;

    /// 打印模型信息
    fn summary(&self) {}
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, frame: &RgbImage, params: &DetectParams) -> Result<Vec<Detection>> {
        (**self).detect(frame, params)
    }

    fn summary(&self) {
        (**self).summary()
    }
}
