// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! OpenCV 采集 / 编码 / 预览窗口
//!
//! OpenCV 帧为 BGR, 库内部统一使用 RGB (`image::RgbImage`), 在这里转换。

use std::path::Path;

use image::RgbImage;
use opencv::core::{Mat, Size};
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture, VideoWriter};
use opencv::{highgui, imgproc};

use super::MediaBackend;
use crate::capture::{FrameSource, SourceInfo};
use crate::config::CameraSettings;
use crate::display::Display;
use crate::error::{Error, Result};
use crate::writer::{FrameSink, WriterSpec};

#[derive(Debug, Default)]
pub struct OpenCvBackend;

/// BGR Mat → RgbImage
fn mat_to_rgb(frame: &Mat) -> Result<RgbImage> {
    let mut rgb = Mat::default();
    imgproc::cvt_color_def(frame, &mut rgb, imgproc::COLOR_BGR2RGB)?;
    let width = rgb.cols() as u32;
    let height = rgb.rows() as u32;
    let data = rgb.data_bytes()?.to_vec();
    RgbImage::from_raw(width, height, data).ok_or_else(|| {
        Error::UnsupportedFormat(format!(
            "decoded frame {}x{} has unexpected layout",
            width, height
        ))
    })
}

/// RgbImage → BGR Mat
fn rgb_to_mat(frame: &RgbImage) -> Result<Mat> {
    let flat = Mat::from_slice(frame.as_raw())?;
    let rgb = flat.reshape(3, frame.height() as i32)?.try_clone()?;
    let mut bgr = Mat::default();
    imgproc::cvt_color_def(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR)?;
    Ok(bgr)
}

struct OpenCvSource {
    cap: VideoCapture,
    is_file: bool,
}

impl OpenCvSource {
    fn prop(&self, id: i32) -> f64 {
        self.cap.get(id).unwrap_or(0.0)
    }
}

impl FrameSource for OpenCvSource {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        let mut frame = Mat::default();
        if !self.cap.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        mat_to_rgb(&frame).map(Some)
    }

    fn info(&self) -> SourceInfo {
        let frame_count = self.prop(videoio::CAP_PROP_FRAME_COUNT);
        SourceInfo {
            width: self.prop(videoio::CAP_PROP_FRAME_WIDTH) as u32,
            height: self.prop(videoio::CAP_PROP_FRAME_HEIGHT) as u32,
            fps: self.prop(videoio::CAP_PROP_FPS),
            frame_count: if self.is_file && frame_count > 0.0 {
                Some(frame_count as u64)
            } else {
                None
            },
            backend: self.cap.get_backend_name().unwrap_or_default(),
        }
    }

    fn release(&mut self) {
        if let Err(e) = self.cap.release() {
            log::warn!("⚠️ 释放 VideoCapture 失败: {}", e);
        }
    }
}

struct OpenCvSink {
    writer: VideoWriter,
}

impl FrameSink for OpenCvSink {
    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        let mat = rgb_to_mat(frame)?;
        self.writer.write(&mat)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.release()?;
        Ok(())
    }
}

struct HighGuiWindow {
    title: String,
    created: bool,
}

impl Display for HighGuiWindow {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        if !self.created {
            highgui::named_window(&self.title, highgui::WINDOW_NORMAL)?;
            highgui::resize_window(
                &self.title,
                frame.width() as i32,
                frame.height() as i32,
            )?;
            self.created = true;
        }
        let mat = rgb_to_mat(frame)?;
        highgui::imshow(&self.title, &mat)?;
        Ok(())
    }

    fn wait_key(&mut self, delay_ms: i32) -> Result<Option<u8>> {
        if !self.created {
            return Ok(None);
        }
        let key = highgui::wait_key(delay_ms)?;
        Ok(if key < 0 { None } else { Some((key & 0xFF) as u8) })
    }

    fn is_open(&self) -> bool {
        self.created
            && highgui::get_window_property(&self.title, highgui::WND_PROP_VISIBLE)
                .map(|visible| visible >= 1.0)
                .unwrap_or(false)
    }

    fn close(&mut self) {
        if self.created {
            self.created = false;
            if let Err(e) = highgui::destroy_window(&self.title) {
                log::debug!("destroy_window({}) 失败: {}", self.title, e);
            }
        }
    }
}

impl Drop for HighGuiWindow {
    fn drop(&mut self) {
        self.close();
    }
}

impl MediaBackend for OpenCvBackend {
    fn name(&self) -> &'static str {
        "opencv"
    }

    fn open_camera(
        &self,
        index: i32,
        settings: Option<&CameraSettings>,
    ) -> Result<Box<dyn FrameSource>> {
        let name = format!("camera {}", index);
        let mut cap = VideoCapture::new(index, videoio::CAP_ANY)
            .map_err(|e| Error::source_unavailable(&name, e.to_string()))?;
        if !cap.is_opened()? {
            return Err(Error::source_unavailable(name, "could not open camera"));
        }

        if let Some(settings) = settings {
            cap.set(videoio::CAP_PROP_FRAME_WIDTH, settings.width as f64)?;
            cap.set(videoio::CAP_PROP_FRAME_HEIGHT, settings.height as f64)?;
            cap.set(videoio::CAP_PROP_FPS, settings.fps as f64)?;
            let actual_width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
            let actual_height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
            if (actual_width, actual_height) != (settings.width, settings.height) {
                log::warn!(
                    "⚠️ 请求分辨率 {}x{}, 实际 {}x{}",
                    settings.width,
                    settings.height,
                    actual_width,
                    actual_height
                );
            }
        }

        Ok(Box::new(OpenCvSource { cap, is_file: false }))
    }

    fn open_video(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        if !path.is_file() {
            return Err(Error::source_unavailable(
                path.display().to_string(),
                "video file not found",
            ));
        }
        let path_str = path.to_string_lossy();
        let cap = VideoCapture::from_file(&path_str, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            return Err(Error::UnsupportedFormat(format!(
                "could not open video {}",
                path.display()
            )));
        }
        Ok(Box::new(OpenCvSource { cap, is_file: true }))
    }

    fn open_writer(&self, spec: &WriterSpec) -> Result<Box<dyn FrameSink>> {
        let c: Vec<char> = spec.codec.chars().collect();
        if c.len() != 4 {
            return Err(Error::UnsupportedFormat(format!(
                "codec {:?} is not a fourcc",
                spec.codec
            )));
        }
        let fourcc = VideoWriter::fourcc(c[0], c[1], c[2], c[3])?;
        let writer = VideoWriter::new(
            &spec.path.to_string_lossy(),
            fourcc,
            spec.fps,
            Size::new(spec.width as i32, spec.height as i32),
            true,
        )
        .map_err(|e| Error::output_write(&spec.path, e))?;
        if !writer.is_opened()? {
            return Err(Error::UnsupportedFormat(format!(
                "codec {} cannot write {}",
                spec.codec,
                spec.path.display()
            )));
        }
        Ok(Box::new(OpenCvSink { writer }))
    }

    fn open_display(&self, title: &str) -> Result<Box<dyn Display>> {
        Ok(Box::new(HighGuiWindow {
            title: title.to_string(),
            created: false,
        }))
    }
}
