pub mod toml_config;

pub use toml_config::TrackerConfig;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "hvac-tracker")]
#[command(about = "Weekly report of large Boston construction projects relevant to HVAC/pipefitting")]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "tracker.toml")]
    pub config: String,

    /// Override output.output_dir
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// Override output.seen_file
    #[arg(long)]
    pub seen_file: Option<String>,

    /// Fetch and score but write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit JSON log lines (for CI)
    #[arg(long)]
    pub log_json: bool,
}

#[cfg(feature = "cli")]
impl CliArgs {
    /// 套用命令列覆蓋設定
    pub fn apply_overrides(&self, config: &mut TrackerConfig) {
        if let Some(dir) = &self.output_dir {
            tracing::info!("🔧 Output directory overridden to: {}", dir);
            config.output.output_dir = dir.clone();
        }
        if let Some(seen) = &self.seen_file {
            tracing::info!("🔧 Seen file overridden to: {}", seen);
            config.output.seen_file = seen.clone();
        }
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let args = CliArgs::parse_from(["hvac-tracker"]);
        assert_eq!(args.config, "tracker.toml");
        assert!(!args.dry_run);
        assert!(args.output_dir.is_none());
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = CliArgs::parse_from([
            "hvac-tracker",
            "--output-dir",
            "public",
            "--seen-file",
            "state/seen.json",
            "--dry-run",
        ]);
        let mut config = TrackerConfig::default();
        args.apply_overrides(&mut config);

        assert!(args.dry_run);
        assert_eq!(config.output.output_dir, "public");
        assert_eq!(config.output.seen_file, "state/seen.json");
    }
}
