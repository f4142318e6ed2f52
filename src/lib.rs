// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod annotate; // 检测框绘制 / HUD
pub mod capture; // 采集适配器
pub mod config; // 配置与命令行参数
pub mod detection; // 检测结果与检测器接口
pub mod display; // 预览窗口
pub mod driver; // 检测驱动 (摄像头 / 视频 / 图片)
pub mod error;
pub mod media; // 媒体后端 (OpenCV)
pub mod models; // 模型加载与 YOLOv8
pub mod ort_backend;
pub mod progress;
pub mod source; // 输入源识别
pub mod writer; // 写出适配器

pub use crate::config::{Args, DetectorConfig};
pub use crate::detection::{non_max_suppression, Bbox, DetectParams, Detection, Detector};
pub use crate::driver::{DetectionDriver, DriverState, RunSummary, StopFlag};
pub use crate::error::{Error, Result};
pub use crate::models::YOLOv8;
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
pub use crate::source::Source;

/// 本地时间字符串, 例如 `gen_time_string("")` → `20240101120000`
pub fn gen_time_string(delimiter: &str) -> String {
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    chrono::Local::now().format(&fmt).to_string()
}
