// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! YOLO 目标检测 (SUAS)
//!
//! cargo run --release --features opencv --bin somars-detect -- --source 0
//! cargo run --release --features opencv --bin somars-detect -- --source video.mp4 --save
//! cargo run --release --bin somars-detect -- --source image.jpg --save --no-display

use std::io::IsTerminal;
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::Parser;

use somars_vision::annotate::{load_font, Annotator};
use somars_vision::media::default_backend;
use somars_vision::models::load_yolov8;
use somars_vision::progress::ProgressReporter;
use somars_vision::{Args, DetectionDriver, DetectorConfig, Source, StopFlag};

/// 第二次 Ctrl-C 强制退出 (128 + SIGINT)
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn list_cameras(max_cameras: i32) {
    println!("🔍 开始扫描摄像头 (0..{})...\n", max_cameras);
    let cameras = default_backend().probe_cameras(max_cameras);
    if cameras.is_empty() {
        println!("⚠️  未找到任何摄像头");
    } else {
        println!("✅ 找到 {} 个摄像头:\n", cameras.len());
        for camera in &cameras {
            println!(
                "  📹 [{}] {}x{} @ {:.1} fps ({})",
                camera.index,
                camera.info.width,
                camera.info.height,
                camera.info.fps,
                camera.info.backend
            );
        }
    }
    println!("\n✅ 扫描完成");
}

fn run(args: &Args) -> Result<()> {
    if args.list_cameras {
        list_cameras(args.max_cameras);
        return Ok(());
    }

    let raw = args
        .source
        .as_deref()
        .ok_or_else(|| anyhow!("--source is required"))?;
    let config = DetectorConfig::from_args(args)?;
    let source = Source::parse(raw);
    log::info!("🎯 输入源: {} ({})", source, source.kind());

    let model = load_yolov8(&config, args.execution_provider())?;
    model.summary();

    let font = if config.display || config.save {
        load_font()
    } else {
        None
    };
    let backend = default_backend();
    log::debug!("media backend: {}", backend.name());

    // 模型/字体加载期间保持默认的 Ctrl-C 行为 (直接退出)
    let stop = StopFlag::new();
    let handle = stop.clone();
    let installed = ctrlc::set_handler(move || {
        if handle.is_stopped() {
            log::warn!("⚠️ 再次收到 Ctrl-C, 立即退出");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
        log::info!("🛑 Ctrl-C: 当前帧结束后停止 (再按一次立即退出)");
        handle.request_stop();
    });
    if let Err(e) = installed {
        log::warn!("⚠️ 无法注册 Ctrl-C 处理器: {}", e);
    }

    let mut driver = DetectionDriver::new(model, config, backend)
        .with_annotator(Annotator::new(font))
        .with_stop_flag(stop);
    let mut reporter = ProgressReporter::new(std::io::stderr().is_terminal());
    let summary = driver.run(&source, |p| reporter.update(p))?;
    reporter.finish();

    if summary.stopped_by_user {
        log::info!("👋 已按用户请求停止");
    }
    Ok(())
}
