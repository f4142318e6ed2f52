// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 视频处理进度

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// 非终端环境下每隔多少帧输出一次进度日志
pub const LOG_EVERY_FRAMES: u64 = 30;

/// 未结束时的进度上限; 只有视频真正读完才到 1.0
pub const UNFINISHED_MAX: f64 = 0.999;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub processed: u64,
    /// 文件报告的总帧数; 摄像头或未知时为 None
    pub total: Option<u64>,
    /// 已到达视频末尾
    pub finished: bool,
}

impl Progress {
    /// [0, 1]; 结束时恒为 1.0, 否则不超过 [`UNFINISHED_MAX`], 总帧数未知时为 0.0
    pub fn fraction(&self) -> f64 {
        if self.finished {
            return 1.0;
        }
        match self.total {
            Some(total) if total > 0 => {
                (self.processed as f64 / total as f64).min(UNFINISHED_MAX)
            }
            _ => 0.0,
        }
    }
}

/// 终端上显示 indicatif 进度条, 否则定期打印日志
pub struct ProgressReporter {
    is_tty: bool,
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    pub fn new(is_tty: bool) -> Self {
        Self { is_tty, bar: None }
    }

    pub fn update(&mut self, progress: Progress) {
        if self.is_tty {
            let bar = self.bar.get_or_insert_with(|| new_bar(progress.total));
            if let Some(total) = progress.total {
                // 文件实际帧数多于报告值
                bar.set_length(total.max(progress.processed));
            }
            bar.set_position(progress.processed);
            if progress.finished {
                bar.finish_with_message("done");
            }
            return;
        }

        let due = progress.processed % LOG_EVERY_FRAMES == 0 || progress.finished;
        if due && progress.processed > 0 {
            match progress.total {
                Some(total) => log::info!(
                    "Progress: {}/{} ({:.1}%)",
                    progress.processed,
                    total,
                    progress.fraction() * 100.0
                ),
                None => log::info!("Progress: {} frames", progress.processed),
            }
        }
    }

    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.finish();
    }
}

fn new_bar(total: Option<u64>) -> ProgressBar {
    let bar = match total {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::new_spinner(),
    };
    bar.set_draw_target(ProgressDrawTarget::stderr());
    let style = ProgressStyle::with_template(
        "{spinner} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({per_sec}) {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(processed: u64, total: Option<u64>, finished: bool) -> Progress {
        Progress {
            processed,
            total,
            finished,
        }
    }

    #[test]
    fn test_fraction() {
        assert_eq!(progress(5, Some(10), false).fraction(), 0.5);
        assert_eq!(progress(7, None, false).fraction(), 0.0);
        assert_eq!(progress(7, Some(0), true).fraction(), 1.0);
        assert_eq!(progress(3, Some(10), true).fraction(), 1.0);
    }

    #[test]
    fn test_fraction_held_below_one_until_finished() {
        // 文件少报了帧数: 已处理 10/10 甚至 12/10 仍未结束
        assert_eq!(progress(10, Some(10), false).fraction(), UNFINISHED_MAX);
        assert_eq!(progress(12, Some(10), false).fraction(), UNFINISHED_MAX);
        assert!(progress(12, Some(10), false).fraction() < 1.0);
        assert_eq!(progress(12, Some(10), true).fraction(), 1.0);
    }

    #[test]
    fn test_reporter_without_tty() {
        let mut reporter = ProgressReporter::new(false);
        for i in 1..=60 {
            reporter.update(progress(i, Some(60), false));
        }
        reporter.update(progress(60, Some(60), true));
        reporter.finish();
        assert!(reporter.bar.is_none());
    }
}
