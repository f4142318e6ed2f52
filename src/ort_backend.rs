// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ONNX Runtime 推理引擎封装

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use ndarray::{Array, IxDyn};
use ort::execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use regex::Regex;

/// 执行设备 (Execution Provider)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: PathBuf,
    pub ep: OrtEP,
    /// (height, width)
    pub image_size: (u32, u32),
}

pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    input_name: String,
    output_names: Vec<String>,
    height: u32,
    width: u32,
    names: Option<Vec<String>>,
    author: Option<String>,
    version: Option<String>,
}

fn ort_err(e: impl std::fmt::Display) -> anyhow::Error {
    anyhow!("{}", e)
}

impl OrtBackend {
    pub fn build(config: OrtConfig) -> Result<Self> {
        let mut builder = Session::builder()
            .map_err(ort_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort_err)?;

        // 注册失败时 onnxruntime 会回退到 CPU
        builder = match config.ep {
            OrtEP::CPU => builder,
            OrtEP::CUDA(device_id) => builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build()])
                .map_err(ort_err)?,
            OrtEP::Trt(device_id) => builder
                .with_execution_providers([
                    TensorRTExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                    CUDAExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                ])
                .map_err(ort_err)?,
        };

        let session = builder
            .commit_from_file(&config.f)
            .map_err(ort_err)
            .with_context(|| format!("failed to load model {}", config.f.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| anyhow!("model has no inputs"))?;
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        if output_names.is_empty() {
            return Err(anyhow!("model has no outputs"));
        }

        let (names, author, version) = match session.metadata() {
            Ok(metadata) => (
                metadata
                    .custom("names")
                    .ok()
                    .flatten()
                    .map(|raw| parse_names(&raw))
                    .filter(|names| !names.is_empty()),
                metadata.custom("author").ok().flatten(),
                metadata.custom("version").ok().flatten(),
            ),
            Err(e) => {
                log::warn!("⚠️ 读取模型元数据失败: {}", e);
                (None, None, None)
            }
        };

        let (height, width) = config.image_size;
        Ok(Self {
            session,
            ep: config.ep,
            input_name,
            output_names,
            height,
            width,
            names,
            author,
            version,
        })
    }

    /// 执行一次前向推理, 返回所有输出张量
    pub fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        let t = Instant::now();
        let input = TensorRef::from_array_view(xs.view()).map_err(ort_err)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(ort_err)?;

        let mut ys = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let y = outputs[name.as_str()]
                .try_extract_array::<f32>()
                .map_err(ort_err)
                .with_context(|| format!("output {} is not a f32 tensor", name))?;
            ys.push(y.into_owned());
        }
        if profile {
            log::debug!("[ORT Run]: {:?}", t.elapsed());
        }
        Ok(ys)
    }

    pub fn ep(&self) -> &OrtEP {
        &self.ep
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn names(&self) -> Option<Vec<String>> {
        self.names.clone()
    }

    pub fn author(&self) -> Option<&String> {
        self.author.as_ref()
    }

    pub fn version(&self) -> Option<&String> {
        self.version.as_ref()
    }
}

/// 解析 Ultralytics 导出时写入的 names 元数据: `{0: 'person', 1: 'bicycle'}`
pub fn parse_names(raw: &str) -> Vec<String> {
    let re = match Regex::new(r#"(\d+)\s*:\s*['"]([^'"]*)['"]"#) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    let mut pairs: Vec<(usize, String)> = re
        .captures_iter(raw)
        .filter_map(|cap| {
            let id = cap.get(1)?.as_str().parse::<usize>().ok()?;
            Some((id, cap.get(2)?.as_str().to_string()))
        })
        .collect();
    pairs.sort_by_key(|(id, _)| *id);
    pairs.into_iter().map(|(_, name)| name).collect()
}
