// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 输入源识别: 摄像头索引 / 视频文件 / 图片文件
//!
//! 只在入口处解析一次, 帧循环内不再判断

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{DetectorConfig, IMAGE_FORMAT, VIDEO_EXTENSION};

/// 被识别为视频的文件扩展名 (小写)
pub const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "avi", "mov", "mkv", "flv", "wmv"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Camera(i32),
    Video(PathBuf),
    Image(PathBuf),
}

impl Source {
    /// 纯数字 → 摄像头; 视频扩展名 → 视频; 其余按图片处理
    pub fn parse(raw: &str) -> Self {
        if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = raw.parse::<i32>() {
                return Source::Camera(index);
            }
        }
        let path = PathBuf::from(raw);
        let is_video = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_video {
            Source::Video(path)
        } else {
            Source::Image(path)
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Source::Camera(_) => "Camera",
            Source::Video(_) => "Video",
            Source::Image(_) => "Image",
        }
    }

    /// 输出文件扩展名
    pub fn output_extension(&self, config: &DetectorConfig) -> String {
        match self {
            Source::Camera(_) | Source::Video(_) => VIDEO_EXTENSION.to_string(),
            Source::Image(_) => {
                if config.image_format.is_empty() {
                    IMAGE_FORMAT.to_string()
                } else {
                    config.image_format.clone()
                }
            }
        }
    }

    /// 默认输出主名 (不含扩展名), 由输入源名称派生
    pub fn default_output_stem(&self) -> String {
        match self {
            Source::Camera(index) => format!("camera{}_{}", index, crate::gen_time_string("")),
            Source::Video(path) | Source::Image(path) => {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .filter(|s| !s.is_empty())
                    .unwrap_or("output");
                format!("{}_detected", stem)
            }
        }
    }

    /// 最终输出路径: `--output` (加扩展名) 或 `<output_dir>/<派生名>.<ext>`
    pub fn output_path(&self, config: &DetectorConfig) -> PathBuf {
        let ext = self.output_extension(config);
        match &config.output {
            Some(stem) => with_appended_extension(stem, &ext),
            None => config
                .output_dir
                .join(format!("{}.{}", self.default_output_stem(), ext)),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Camera(index) => write!(f, "camera {}", index),
            Source::Video(path) | Source::Image(path) => write!(f, "{}", path.display()),
        }
    }
}

/// `out/run.v2` + `mp4` → `out/run.v2.mp4` (不替换已有的点号部分)
fn with_appended_extension(stem: &Path, ext: &str) -> PathBuf {
    let mut raw = stem.as_os_str().to_owned();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}
