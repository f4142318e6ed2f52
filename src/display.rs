// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 预览窗口 (display surface)

use image::RgbImage;

use crate::error::Result;

pub const KEY_ESC: u8 = 27;

/// `q` 或 `Esc` 结束循环
pub fn is_quit_key(key: u8) -> bool {
    key == b'q' || key == b'Q' || key == KEY_ESC
}

pub trait Display {
    fn show(&mut self, frame: &RgbImage) -> Result<()>;

    /// 等待按键 `delay_ms` 毫秒, `0` 表示一直等待
    fn wait_key(&mut self, delay_ms: i32) -> Result<Option<u8>>;

    /// 窗口仍可接收按键; 用户关掉窗口后为 false
    fn is_open(&self) -> bool {
        true
    }

    fn close(&mut self);
}

/// 不显示窗口 (`--no-display` 或未编译 OpenCV)
#[derive(Debug, Default)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn show(&mut self, _frame: &RgbImage) -> Result<()> {
        Ok(())
    }

    fn wait_key(&mut self, _delay_ms: i32) -> Result<Option<u8>> {
        Ok(None)
    }

    fn is_open(&self) -> bool {
        false
    }

    fn close(&mut self) {}
}
