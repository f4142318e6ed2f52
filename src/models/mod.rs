// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 模型加载
///
/// # 模型标识解析顺序
/// 1. 已存在的 `.onnx` 文件路径
/// 2. `models/<name>.onnx`
/// 3. 用户缓存目录 `<cache>/somars-vision/models/<name>.onnx`
/// 4. 设置了 `SOMARS_MODEL_BASE_URL` 时下载到缓存目录
///
/// `yolov8n.pt` 这类 PyTorch 权重名映射到同名的 ONNX 导出文件。
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::config::DetectorConfig;
use crate::{OrtConfig, OrtEP};

pub mod yolov8;

pub use yolov8::YOLOv8;

pub const MODEL_BASE_URL_ENV: &str = "SOMARS_MODEL_BASE_URL";

/// `yolov8n`, `yolov8n.pt`, `yolov8n.onnx` → `yolov8n.onnx`
pub fn onnx_file_name(identifier: &str) -> String {
    let stem = identifier
        .strip_suffix(".onnx")
        .or_else(|| identifier.strip_suffix(".pt"))
        .unwrap_or(identifier);
    format!("{}.onnx", stem)
}

/// 模型缓存目录
pub fn cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("somars-vision").join("models"))
}

/// 按顺序返回候选路径 (不检查是否存在)
///
/// 只接受 `.onnx` 文件: `yolov8n.pt` 不会被当作模型文件加载
pub fn candidate_paths(identifier: &str, cache: Option<&Path>) -> Vec<PathBuf> {
    let file_name = onnx_file_name(identifier);
    let mut paths = vec![PathBuf::from(&file_name)];
    paths.push(Path::new("models").join(&file_name));
    if let Some(cache) = cache {
        paths.push(cache.join(&file_name));
    }
    paths
}

/// 解析模型标识为本地 ONNX 文件, 必要时下载
pub fn resolve_model(identifier: &str) -> Result<PathBuf> {
    let cache = cache_dir();
    let candidates = candidate_paths(identifier, cache.as_deref());
    if let Some(found) = candidates.iter().find(|p| p.is_file()) {
        log::debug!("模型路径: {}", found.display());
        return Ok(found.clone());
    }

    let file_name = onnx_file_name(identifier);
    match (std::env::var(MODEL_BASE_URL_ENV), cache) {
        (Ok(base), Some(cache)) => download(&base, &file_name, &cache),
        _ => Err(anyhow!(
            "model {} not found (searched: {}); export it with `yolo export model={} format=onnx` \
             or set {} to download it",
            identifier,
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            identifier.strip_suffix(".onnx").unwrap_or(identifier),
            MODEL_BASE_URL_ENV,
        )),
    }
}

fn download(base: &str, file_name: &str, cache: &Path) -> Result<PathBuf> {
    let url = format!("{}/{}", base.trim_end_matches('/'), file_name);
    log::info!("⬇️ 下载模型: {}", url);
    fs::create_dir_all(cache).with_context(|| format!("creating {}", cache.display()))?;

    let mut bytes = Vec::new();
    ureq::get(&url)
        .call()
        .with_context(|| format!("GET {}", url))?
        .into_reader()
        .read_to_end(&mut bytes)?;

    // 先写临时文件再改名, 避免中断后留下半个模型
    let target = cache.join(file_name);
    let partial = cache.join(format!("{}.part", file_name));
    fs::write(&partial, &bytes)?;
    fs::rename(&partial, &target)?;
    log::info!("✅ 模型已缓存: {}", target.display());
    Ok(target)
}

/// 按配置加载 YOLOv8 检测模型
pub fn load_yolov8(config: &DetectorConfig, ep: OrtEP) -> crate::Result<YOLOv8> {
    let path = resolve_model(&config.model).map_err(crate::Error::inference)?;
    let ort_config = OrtConfig {
        f: path,
        ep,
        image_size: (config.imgsz, config.imgsz),
    };
    let model = YOLOv8::new(ort_config, config.model.clone(), config.profile)
        .map_err(crate::Error::inference)?;
    log::info!("✅ {} 检测模型加载成功", config.model);
    Ok(model)
}
