// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 配置 (Configuration surface)
//!
//! 优先级: 内置默认值 < JSON配置文件 < 命令行参数

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::OrtEP;

// ========== 默认值 ==========

/// Nano 模型, 推理最快
pub const DEFAULT_MODEL: &str = "yolov8n";

pub const CONFIDENCE_THRESHOLD: f32 = 0.25;
pub const IOU_THRESHOLD: f32 = 0.45;
/// YOLOv8推理输入尺寸
pub const INF_SIZE: u32 = 640;

pub const CAMERA_WIDTH: u32 = 640;
pub const CAMERA_HEIGHT: u32 = 480;
pub const CAMERA_FPS: u32 = 30;

pub const DISPLAY_WINDOW_NAME: &str = "YOLO Detection";
/// 预览窗口等待按键时间 (毫秒)
pub const DISPLAY_WAIT_MS: i32 = 1;

pub const DEFAULT_OUTPUT_DIR: &str = "outputs";
pub const VIDEO_CODEC: &str = "mp4v";
pub const VIDEO_EXTENSION: &str = "mp4";
pub const IMAGE_FORMAT: &str = "jpg";

/// SUAS 比赛关注的类别
pub const SUAS_CLASSES: [&str; 24] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
];

/// 模型元数据缺少 names 时使用的 COCO 类别名
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

// ========== 命令行参数 ==========

/// YOLO Object Detection for SUAS Competition
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "YOLO Object Detection for SUAS Competition", long_about = None)]
pub struct Args {
    /// 输入源: 摄像头索引 (0), 视频文件路径, 或图片路径
    #[arg(short, long, required_unless_present = "list_cameras")]
    pub source: Option<String>,

    /// 模型标识或 ONNX 路径 [default: yolov8n]
    #[arg(short, long)]
    pub model: Option<String>,

    /// 置信度阈值 [default: 0.25]
    #[arg(long)]
    pub conf: Option<f32>,

    /// NMS 的 IOU 阈值 [default: 0.45]
    #[arg(long)]
    pub iou: Option<f32>,

    /// 推理输入尺寸 [default: 640]
    #[arg(long)]
    pub imgsz: Option<u32>,

    /// 保存带标注的输出文件
    #[arg(long)]
    pub save: bool,

    /// 输出路径 (不含扩展名), 默认由输入源名称派生
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 不显示预览窗口
    #[arg(long)]
    pub no_display: bool,

    /// JSON 配置文件
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 摄像头采集宽度 [default: 640]
    #[arg(long)]
    pub width: Option<u32>,

    /// 摄像头采集高度 [default: 480]
    #[arg(long)]
    pub height: Option<u32>,

    /// 摄像头采集帧率 [default: 30]
    #[arg(long)]
    pub fps: Option<u32>,

    /// 使用 CUDA
    #[arg(long)]
    pub cuda: bool,

    /// 使用 TensorRT
    #[arg(long)]
    pub trt: bool,

    /// GPU 设备号
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// 只保留 SUAS 类别
    #[arg(long)]
    pub suas_only: bool,

    /// 绘制准星与 FPS
    #[arg(long)]
    pub hud: bool,

    /// 输出各阶段耗时
    #[arg(long)]
    pub profile: bool,

    /// 列出可用摄像头后退出
    #[arg(long)]
    pub list_cameras: bool,

    /// 扫描的最大摄像头数量
    #[arg(long, default_value_t = 5)]
    pub max_cameras: i32,
}

impl Args {
    pub fn execution_provider(&self) -> OrtEP {
        if self.trt {
            OrtEP::Trt(self.device_id)
        } else if self.cuda {
            OrtEP::CUDA(self.device_id)
        } else {
            OrtEP::CPU
        }
    }
}

// ========== 运行配置 ==========

/// 摄像头采集参数
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: CAMERA_WIDTH,
            height: CAMERA_HEIGHT,
            fps: CAMERA_FPS,
        }
    }
}

/// 一次运行的不可变配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model: String,
    pub conf: f32,
    pub iou: f32,
    pub imgsz: u32,
    pub camera: CameraSettings,
    pub display: bool,
    pub save: bool,
    /// 输出路径 (不含扩展名)
    pub output: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub video_codec: String,
    pub image_format: String,
    pub window_name: String,
    pub display_wait_ms: i32,
    pub suas_only: bool,
    pub hud: bool,
    pub profile: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            conf: CONFIDENCE_THRESHOLD,
            iou: IOU_THRESHOLD,
            imgsz: INF_SIZE,
            camera: CameraSettings::default(),
            display: true,
            save: false,
            output: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            video_codec: VIDEO_CODEC.to_string(),
            image_format: IMAGE_FORMAT.to_string(),
            window_name: DISPLAY_WINDOW_NAME.to_string(),
            display_wait_ms: DISPLAY_WAIT_MS,
            suas_only: false,
            hud: false,
            profile: false,
        }
    }
}

impl DetectorConfig {
    /// 从JSON文件加载配置, 缺失字段取默认值
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json).map_err(|e| {
            Error::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        log::info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        fs::write(path, json).map_err(|e| Error::output_write(path, e))?;
        log::info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 命令行参数覆盖配置文件 (或默认值)
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    fn apply_args(&mut self, args: &Args) {
        if let Some(model) = &args.model {
            self.model = model.clone();
        }
        if let Some(conf) = args.conf {
            self.conf = conf;
        }
        if let Some(iou) = args.iou {
            self.iou = iou;
        }
        if let Some(imgsz) = args.imgsz {
            self.imgsz = imgsz;
        }
        if let Some(width) = args.width {
            self.camera.width = width;
        }
        if let Some(height) = args.height {
            self.camera.height = height;
        }
        if let Some(fps) = args.fps {
            self.camera.fps = fps;
        }
        if let Some(output) = &args.output {
            self.output = Some(output.clone());
        }
        // 开关参数只能打开, 不能关闭配置文件中的设置
        self.save |= args.save;
        self.display &= !args.no_display;
        self.suas_only |= args.suas_only;
        self.hud |= args.hud;
        self.profile |= args.profile;
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.conf) {
            return Err(Error::InvalidConfig(format!(
                "conf must be in [0, 1], got {}",
                self.conf
            )));
        }
        if !(0.0..=1.0).contains(&self.iou) {
            return Err(Error::InvalidConfig(format!(
                "iou must be in [0, 1], got {}",
                self.iou
            )));
        }
        if self.imgsz == 0 || self.imgsz % 32 != 0 {
            return Err(Error::InvalidConfig(format!(
                "imgsz must be a positive multiple of 32, got {}",
                self.imgsz
            )));
        }
        if self.camera.width == 0 || self.camera.height == 0 || self.camera.fps == 0 {
            return Err(Error::InvalidConfig(
                "camera width, height and fps must be non-zero".to_string(),
            ));
        }
        if self.video_codec.chars().count() != 4 {
            return Err(Error::InvalidConfig(format!(
                "video codec must be a fourcc, got {:?}",
                self.video_codec
            )));
        }
        Ok(())
    }

    /// 检测结果是否需要按 SUAS 类别过滤
    pub fn keeps_label(&self, label: &str) -> bool {
        !self.suas_only || SUAS_CLASSES.contains(&label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = DetectorConfig::default();
        assert_eq!(config.model, "yolov8n");
        assert_eq!(config.conf, 0.25);
        assert_eq!(config.iou, 0.45);
        assert_eq!(
            config.camera,
            CameraSettings {
                width: 640,
                height: 480,
                fps: 30,
            }
        );
        assert!(config.display);
        assert!(!config.save);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_threshold_range() {
        let mut config = DetectorConfig {
            conf: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        config.conf = 0.0;
        config.iou = -0.1;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        config.iou = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detector.json");
        let config = DetectorConfig {
            model: "yolov8s".to_string(),
            conf: 0.4,
            save: true,
            suas_only: true,
            output: Some(PathBuf::from("runs/flight")),
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(DetectorConfig::load(&path).unwrap(), config);

        let missing = dir.path().join("no/such/dir/detector.json");
        assert!(matches!(
            config.save(&missing),
            Err(Error::OutputWriteFailure { .. })
        ));
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detector.json");
        fs::write(&path, r#"{ "conf": 0.6, "iou": 0.3, "hud": true }"#).unwrap();

        let args = Args::parse_from([
            "somars-detect",
            "--source",
            "0",
            "--config",
            path.to_str().unwrap(),
            "--iou",
            "0.7",
            "--no-display",
        ]);
        let config = DetectorConfig::from_args(&args).unwrap();
        assert_eq!(config.conf, 0.6);
        assert_eq!(config.iou, 0.7);
        assert!(config.hud);
        assert!(!config.display);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_invalid_cli_threshold_rejected() {
        let args = Args::parse_from(["somars-detect", "--source", "0", "--conf", "2"]);
        assert!(DetectorConfig::from_args(&args).is_err());
    }

    #[test]
    fn test_source_not_required_for_listing() {
        let args = Args::try_parse_from(["somars-detect", "--list-cameras"]).unwrap();
        assert!(args.list_cameras);
        assert!(args.source.is_none());
        assert!(Args::try_parse_from(["somars-detect"]).is_err());
    }

    #[test]
    fn test_suas_filter() {
        let mut config = DetectorConfig::default();
        assert!(config.keeps_label("laptop"));
        config.suas_only = true;
        assert!(config.keeps_label("airplane"));
        assert!(!config.keeps_label("laptop"));
    }

    #[test]
    fn test_execution_provider() {
        let mut args = Args::default();
        assert!(matches!(args.execution_provider(), OrtEP::CPU));
        args.cuda = true;
        args.device_id = 1;
        assert!(matches!(args.execution_provider(), OrtEP::CUDA(1)));
        args.trt = true;
        assert!(matches!(args.execution_provider(), OrtEP::Trt(1)));
    }
}
