// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型实现
// 包含: 模型加载、预处理、推理、后处理

use std::time::Instant;

use anyhow::{anyhow, Result};
use image::{imageops, RgbImage};
use ndarray::{s, Array, ArrayView, Axis, Ix2, IxDyn};

use crate::config::COCO_CLASSES;
use crate::detection::{non_max_suppression, Bbox, DetectParams, Detection, Detector};
use crate::{OrtBackend, OrtConfig, OrtEP};

/// 前 4 个通道为 cx, cy, w, h
const CXYWH_OFFSET: usize = 4;
/// letterbox 填充灰度
const PAD_VALUE: f32 = 144.0 / 255.0;

pub struct YOLOv8 {
    engine: OrtBackend,
    model_id: String,
    height: u32,
    width: u32,
    names: Vec<String>,
    profile: bool,
}

impl YOLOv8 {
    pub fn new(config: OrtConfig, model_id: impl Into<String>, profile: bool) -> Result<Self> {
        let engine = OrtBackend::build(config)?;
        let (height, width) = (engine.height(), engine.width());

        // class names
        let names = engine
            .names()
            .unwrap_or_else(|| COCO_CLASSES.iter().map(|s| s.to_string()).collect());

        Ok(Self {
            engine,
            model_id: model_id.into(),
            height,
            width,
            names,
            profile,
        })
    }

    fn scale_wh(&self, w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
        let r = (w1 / w0).min(h1 / h0);
        (r, (w0 * r).round(), (h0 * r).round())
    }

    /// 等比缩放到推理尺寸, 左上对齐, 其余部分填充
    pub fn preprocess(&self, x: &RgbImage) -> Result<Array<f32, IxDyn>> {
        let (w0, h0) = x.dimensions();
        if w0 == 0 || h0 == 0 {
            return Err(anyhow!("empty frame"));
        }
        let mut ys = Array::ones((1, 3, self.height as usize, self.width as usize)).into_dyn();
        ys.fill(PAD_VALUE);

        let (_, w_new, h_new) =
            self.scale_wh(w0 as f32, h0 as f32, self.width as f32, self.height as f32);
        let img = imageops::resize(
            x,
            (w_new as u32).max(1),
            (h_new as u32).max(1),
            imageops::FilterType::Triangle,
        );

        for (x, y, rgb) in img.enumerate_pixels() {
            let x = x as usize;
            let y = y as usize;
            let [r, g, b] = rgb.0;
            ys[[0, 0, y, x]] = (r as f32) / 255.0;
            ys[[0, 1, y, x]] = (g as f32) / 255.0;
            ys[[0, 2, y, x]] = (b as f32) / 255.0;
        }

        Ok(ys)
    }

    pub fn run(&mut self, x: &RgbImage, params: &DetectParams) -> Result<Vec<Detection>> {
        let t_pre = Instant::now();
        let xs = self.preprocess(x)?;
        if self.profile {
            log::debug!("[Model Preprocess]: {:?}", t_pre.elapsed());
        }

        let t_run = Instant::now();
        let ys = self.engine.run(xs, self.profile)?;
        if self.profile {
            log::debug!("[Model Inference]: {:?}", t_run.elapsed());
        }

        let t_post = Instant::now();
        let preds = ys
            .first()
            .ok_or_else(|| anyhow!("model produced no output"))?;
        let ratio =
            (self.width as f32 / x.width() as f32).min(self.height as f32 / x.height() as f32);
        let detections = postprocess(
            preds.view(),
            ratio,
            (x.width() as f32, x.height() as f32),
            params,
            &self.names,
        )?;
        if self.profile {
            log::debug!("[Model Postprocess]: {:?}", t_post.elapsed());
        }

        Ok(detections)
    }

    pub fn summary(&self) {
        log::info!(
            "\nSummary:\n\
            > Model: {}{}\n\
            > EP: {:?} {}\n\
            > Height: {}, Width: {}\n\
            > nc: {}",
            self.model_id,
            match self.engine.author().zip(self.engine.version()) {
                Some((author, ver)) => format!(" ({} {})", author, ver),
                None => String::from(""),
            },
            self.engine.ep(),
            if let OrtEP::CPU = self.engine.ep() {
                ""
            } else {
                "(May still fall back to CPU)"
            },
            self.height,
            self.width,
            self.names.len(),
        );
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Detector for YOLOv8 {
    fn detect(
        &mut self,
        frame: &RgbImage,
        params: &DetectParams,
    ) -> crate::Result<Vec<Detection>> {
        self.run(frame, params).map_err(|e| {
            crate::Error::inference(e.context(format!("running {}", self.model_id)))
        })
    }

    fn summary(&self) {
        YOLOv8::summary(self)
    }
}

/// 解码 YOLOv8 检测头输出 `[1, 4 + nc, anchors]`
///
/// 坐标从推理尺寸还原到原图 (除以缩放比例), 过滤低置信度后按类别做 NMS。
pub fn postprocess(
    preds: ArrayView<f32, IxDyn>,
    ratio: f32,
    original_size: (f32, f32),
    params: &DetectParams,
    names: &[String],
) -> Result<Vec<Detection>> {
    let preds = match preds.ndim() {
        3 => preds.index_axis_move(Axis(0), 0),
        2 => preds,
        n => return Err(anyhow!("unexpected output rank {}", n)),
    };
    let preds = preds.into_dimensionality::<Ix2>()?;
    let channels = preds.shape()[0];
    if channels <= CXYWH_OFFSET {
        return Err(anyhow!("output has {} channels, expected > 4", channels));
    }
    let nc = channels - CXYWH_OFFSET;
    let (width_original, height_original) = original_size;

    let mut data: Vec<Detection> = Vec::new();
    for pred in preds.axis_iter(Axis(1)) {
        let bbox = pred.slice(s![0..CXYWH_OFFSET]);
        let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + nc]);

        let (id, &confidence) = match clss
            .into_iter()
            .enumerate()
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
        {
            Some(best) => best,
            None => continue,
        };

        if confidence < params.conf {
            continue;
        }

        let cx = bbox[0] / ratio;
        let cy = bbox[1] / ratio;
        let w = bbox[2] / ratio;
        let h = bbox[3] / ratio;
        let x = cx - w / 2.;
        let y = cy - h / 2.;
        let y_bbox = Bbox::new(x, y, w, h).clamp_to(width_original, height_original);

        let label = names
            .get(id)
            .cloned()
            .unwrap_or_else(|| format!("class{}", id));
        data.push(Detection::new(id, label, confidence, y_bbox));
    }

    non_max_suppression(&mut data, params.iou);
    Ok(data)
}
