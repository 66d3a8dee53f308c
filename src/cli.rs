use clap::Parser;
use std::path::PathBuf;

/// Headless demo: many views sharing a handful of synthetic animations
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Number of distinct animations
    #[arg(short = 'i', long = "items", value_name = "N", default_value_t = 4)]
    pub items: usize,

    /// Views attached to each animation
    #[arg(short = 't', long = "targets-per-item", value_name = "N", default_value_t = 3)]
    pub targets_per_item: usize,

    /// How long to run the UI loop (seconds)
    #[arg(short = 's', long = "seconds", value_name = "SECS", default_value_t = 2.0)]
    pub seconds: f64,

    /// Frames per synthetic animation
    #[arg(long = "frames", value_name = "N", default_value_t = 24)]
    pub frames: u32,

    /// Pixel size (width and height) of every animation
    #[arg(long = "size", value_name = "PX", default_value_t = 64)]
    pub size: u32,

    /// Force low-power mode (frame skip 2 under auto policy)
    #[arg(long = "low-power")]
    pub low_power: bool,

    /// Renderer config JSON (missing fields use defaults)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging to file (default: multianim.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["multianim"]);
        assert_eq!(args.items, 4);
        assert_eq!(args.targets_per_item, 3);
        assert_eq!(args.verbosity, 0);
        assert!(args.log_file.is_none());
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from(["multianim", "-vv", "--items", "2", "--log", "--low-power"]);
        assert_eq!(args.items, 2);
        assert_eq!(args.verbosity, 2);
        assert!(args.low_power);
        assert_eq!(args.log_file, Some(None));
    }
}
