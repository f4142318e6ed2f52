// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测结果叠加绘制 (Annotation)
//!
//! 每个检测框: 类别颜色的矩形 + `"{label} {conf:.2}"` 标签。
//! 没有字体时只画框, 不画文字。

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;

use crate::detection::Detection;

pub const FONT_URL: &str = "https://ultralytics.com/assets/Arial.ttf";
pub const FONT_FILE: &str = "Arial.ttf";

/// 线宽 (像素)
const LINE_WIDTH: i32 = 2;
const FONT_SIZE: f32 = 16.0;

// color palette (与YOLOv8保持一致)
const BRIGHT_COLORS: [(u8, u8, u8); 12] = [
    (255, 0, 0),     // 红色
    (0, 255, 0),     // 绿色
    (0, 0, 255),     // 蓝色
    (255, 255, 0),   // 黄色
    (255, 0, 255),   // 品红
    (0, 255, 255),   // 青色
    (255, 128, 0),   // 橙色
    (255, 0, 128),   // 粉红
    (128, 255, 0),   // 黄绿
    (0, 128, 255),   // 天蓝
    (128, 0, 255),   // 紫色
    (255, 128, 128), // 浅红
];

pub fn class_color(class_id: usize) -> Rgb<u8> {
    let (r, g, b) = BRIGHT_COLORS[class_id % BRIGHT_COLORS.len()];
    Rgb([r, g, b])
}

/// 实际绘制到帧上的框 (像素坐标, 含端点)
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub text: String,
    pub color: Rgb<u8>,
}

pub struct Annotator {
    font: Option<FontArc>,
    scale: PxScale,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Annotator {
    pub fn new(font: Option<FontArc>) -> Self {
        Self {
            font,
            scale: PxScale::from(FONT_SIZE),
        }
    }

    /// 在帧上绘制所有检测框, 返回绘制记录
    pub fn annotate(&self, frame: &mut RgbImage, detections: &[Detection]) -> Vec<OverlayBox> {
        detections
            .iter()
            .map(|d| self.draw_detection(frame, d))
            .collect()
    }

    fn draw_detection(&self, frame: &mut RgbImage, det: &Detection) -> OverlayBox {
        let color = class_color(det.class_id);
        let x1 = det.bbox.xmin().round() as i32;
        let y1 = det.bbox.ymin().round() as i32;
        let x2 = (det.bbox.xmax().round() as i32).max(x1);
        let y2 = (det.bbox.ymax().round() as i32).max(y1);

        for t in 0..LINE_WIDTH {
            let w = x2 - x1 + 1 - 2 * t;
            let h = y2 - y1 + 1 - 2 * t;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x1 + t, y1 + t).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(frame, rect, color);
        }

        let text = format!("{} {:.2}", det.label, det.confidence);
        if let Some(font) = &self.font {
            let (tw, th) = text_size(self.scale, font, &text);
            let (bw, bh) = (tw as i32 + 4, th as i32 + 4);
            // 框上方放不下时画在框内
            let ty = if y1 - bh >= 0 { y1 - bh } else { y1 };
            let bg = Rect::at(x1, ty).of_size(bw.max(1) as u32, bh.max(1) as u32);
            draw_filled_rect_mut(frame, bg, color);
            draw_text_mut(
                frame,
                Rgb([255, 255, 255]),
                x1 + 2,
                ty + 2,
                self.scale,
                font,
                &text,
            );
        }

        OverlayBox {
            x1,
            y1,
            x2,
            y2,
            text,
            color,
        }
    }

    /// 准星 + FPS
    pub fn draw_hud(&self, frame: &mut RgbImage, fps: Option<f64>) {
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        let (cx, cy) = (w / 2.0, h / 2.0);
        let arm = (w.min(h) * 0.05).max(5.0);
        let green = Rgb([0, 255, 0]);
        draw_line_segment_mut(frame, (cx - arm, cy), (cx + arm, cy), green);
        draw_line_segment_mut(frame, (cx, cy - arm), (cx, cy + arm), green);

        if let (Some(fps), Some(font)) = (fps, &self.font) {
            draw_text_mut(
                frame,
                green,
                10,
                10,
                self.scale,
                font,
                &format!("FPS: {:.1}", fps),
            );
        }
    }
}

fn font_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("somars-vision").join(FONT_FILE))
}

/// 加载标签字体, 缓存中没有则下载一次; 失败只告警
pub fn load_font() -> Option<FontArc> {
    let path = font_path()?;
    if !path.is_file() {
        if let Err(e) = download_font(&path) {
            log::warn!("⚠️ 字体下载失败, 标签将不显示文字: {:#}", e);
            return None;
        }
    }
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("⚠️ 读取字体 {} 失败: {}", path.display(), e);
            return None;
        }
    };
    match FontArc::try_from_vec(bytes) {
        Ok(font) => Some(font),
        Err(e) => {
            log::warn!("⚠️ 字体 {} 无效: {}", path.display(), e);
            None
        }
    }
}

fn download_font(path: &Path) -> anyhow::Result<()> {
    use anyhow::Context;

    log::info!("⬇️ 下载字体: {}", FONT_URL);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut bytes = Vec::new();
    ureq::get(FONT_URL)
        .call()
        .with_context(|| format!("GET {}", FONT_URL))?
        .into_reader()
        .read_to_end(&mut bytes)?;
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Bbox;

    #[test]
    fn test_annotate_records_boxes() {
        let mut frame = RgbImage::new(100, 80);
        let det = Detection::new(0, "person", 0.87, Bbox::from_xyxy(10.0, 20.0, 50.0, 60.0));
        let overlay = Annotator::default().annotate(&mut frame, &[det]);

        assert_eq!(overlay.len(), 1);
        let b = &overlay[0];
        assert_eq!((b.x1, b.y1, b.x2, b.y2), (10, 20, 50, 60));
        assert_eq!(b.text, "person 0.87");
        assert_eq!(b.color, Rgb([255, 0, 0]));

        assert_eq!(frame.get_pixel(10, 20), &Rgb([255, 0, 0]));
        assert_eq!(frame.get_pixel(50, 60), &Rgb([255, 0, 0]));
        assert_eq!(frame.get_pixel(11, 40), &Rgb([255, 0, 0]));
        // 框内部不填充
        assert_eq!(frame.get_pixel(30, 40), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_class_color_wraps() {
        assert_eq!(class_color(1), Rgb([0, 255, 0]));
        assert_eq!(class_color(12), class_color(0));
    }

    #[test]
    fn test_empty_detections_leave_frame_untouched() {
        let mut frame = RgbImage::new(16, 16);
        assert!(Annotator::default().annotate(&mut frame, &[]).is_empty());
        assert!(frame.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_degenerate_box_is_drawn() {
        let mut frame = RgbImage::new(16, 16);
        let det = Detection::new(2, "car", 0.5, Bbox::new(4.0, 4.0, 0.0, 0.0));
        let overlay = Annotator::default().annotate(&mut frame, &[det]);
        assert_eq!((overlay[0].x1, overlay[0].x2), (4, 4));
        assert_eq!(frame.get_pixel(4, 4), &Rgb([0, 0, 255]));
    }

    #[test]
    fn test_hud_crosshair() {
        let mut frame = RgbImage::new(40, 40);
        Annotator::default().draw_hud(&mut frame, Some(30.0));
        assert_eq!(frame.get_pixel(20, 20), &Rgb([0, 255, 0]));
    }
}
