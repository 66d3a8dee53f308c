use multianim::cli::Args;
use multianim::core::memory_cache::MemoryAnimationCache;
use multianim::entities::{
    AnimationCache, Disposable, EmptyDisposable, FetchFn, ItemWriter, PixelSize, RenderTarget, TargetIdSequence,
    TargetView,
};
use multianim::{CacheConfig, MainQueue, MultiAnimationRenderer, RendererConfig};

use anyhow::Context;
use clap::Parser;
use image::{Rgba, RgbaImage};
use log::{debug, info};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// View counting what it receives instead of drawing it
#[derive(Default)]
struct CountingView {
    frames: AtomicUsize,
    placeholders: AtomicUsize,
}

impl TargetView for CountingView {
    fn receive_frame(&self, _image: &Arc<RgbaImage>) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    fn receive_placeholder_state(&self, show_placeholder: bool) {
        if show_placeholder {
            self.placeholders.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Fetch producing a moving gradient, written synchronously
fn synthetic_fetch(seed: u8, frame_count: u32) -> FetchFn {
    Arc::new(move |size: PixelSize, mut writer: Box<dyn ItemWriter>| {
        for frame in 0..frame_count {
            let shift = (frame * 255 / frame_count.max(1)) as u8;
            let image = RgbaImage::from_fn(size.width, size.height, |x, y| {
                Rgba([(x as u8).wrapping_add(shift), (y as u8).wrapping_add(seed), seed, 255])
            });
            writer.add_frame(image, 1.0 / 24.0);
        }
        writer.finish();
        Box::new(EmptyDisposable) as Box<dyn Disposable>
    })
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt.clone().unwrap_or_else(|| PathBuf::from("multianim.log"));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging, RUST_LOG wins if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    debug!("Command-line args: {:?}", args);

    let mut config = match &args.config {
        Some(path) => RendererConfig::load(path)?,
        None => RendererConfig::default(),
    };
    config.low_power_mode |= args.low_power;

    let main_queue = MainQueue::new();
    let renderer = MultiAnimationRenderer::new(&config, &main_queue);
    let cache: Arc<dyn AnimationCache> = Arc::new(MemoryAnimationCache::from_config(&CacheConfig::default()));
    let size = PixelSize::new(args.size, args.size);
    let ids = TargetIdSequence::new();

    info!(
        "Demo: {} items x {} targets, {}x{} px, frame_skip={}",
        args.items,
        args.targets_per_item,
        size.width,
        size.height,
        renderer.frame_skip()
    );

    let mut views: Vec<Vec<Arc<CountingView>>> = Vec::with_capacity(args.items);
    let mut targets: Vec<Vec<Arc<RenderTarget>>> = Vec::with_capacity(args.items);
    let mut handles: Vec<Box<dyn Disposable>> = Vec::new();

    for item in 0..args.items {
        let item_id = format!("synthetic_{}", item);
        let fetch = synthetic_fetch((item * 37) as u8, args.frames);
        let mut item_views = Vec::new();
        let mut item_targets = Vec::new();
        for _ in 0..args.targets_per_item {
            let view = Arc::new(CountingView::default());
            let target = RenderTarget::new(&ids, view.clone());
            target.set_should_be_animating(true);
            handles.push(renderer.add(&target, &cache, &item_id, size, Arc::clone(&fetch)));
            item_views.push(view);
            item_targets.push(target);
        }
        views.push(item_views);
        targets.push(item_targets);
    }

    let run_for = Duration::from_secs_f64(args.seconds.max(0.0));
    let start = Instant::now();
    let mut hidden = false;
    while start.elapsed() < run_for {
        if !hidden && start.elapsed() >= run_for / 2 {
            // Scroll odd items off screen
            for item_targets in targets.iter().skip(1).step_by(2) {
                for target in item_targets {
                    target.set_should_be_animating(false);
                }
            }
            hidden = true;
            info!("Halfway: odd items hidden, playing={}", renderer.is_playing());
        }
        main_queue.run_next_timeout(Duration::from_millis(16));
    }

    for (item, item_views) in views.iter().enumerate() {
        let counts: Vec<usize> = item_views.iter().map(|v| v.frames.load(Ordering::Relaxed)).collect();
        let placeholders: usize = item_views.iter().map(|v| v.placeholders.load(Ordering::Relaxed)).sum();
        println!(
            "synthetic_{}: frames per target {:?}, placeholders {}, timestamp {:.3}s",
            item,
            counts,
            placeholders,
            renderer.playback_timestamp(&format!("synthetic_{}", item), size).unwrap_or(0.0)
        );
    }

    for handle in handles {
        handle.dispose();
    }
    drop(targets);
    main_queue.run_pending();
    info!("Done: {} contexts left, ticker active={}", renderer.context_count(), renderer.ticker_active());
    Ok(())
}
