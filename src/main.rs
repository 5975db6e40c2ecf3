use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use shrimp_thc::cli::{self, Cli, Command};
use shrimp_thc::detector::{YoloDetector, YoloParams};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Analyze(args) => {
            let cfg = args.to_config()?;
            // モデルを読み込む前に入力を確認する
            args.check_images()?;
            let detector = YoloDetector::new(YoloParams::from(&cfg))?;
            cli::run_analyze(&args, cfg, detector)?;
            Ok(())
        }
        Command::Ranges => {
            print!("{}", cli::ranges_text());
            Ok(())
        }
    }
}
