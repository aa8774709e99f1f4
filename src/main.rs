use anyhow::Context;
use clap::Parser;
use hvac_tracker::utils::error::ErrorSeverity;
use hvac_tracker::utils::{logger, validation::Validate};
use hvac_tracker::{CliArgs, EtlEngine, LocalStorage, TrackerConfig, TrackerPipeline};

fn load_config(args: &CliArgs) -> anyhow::Result<TrackerConfig> {
    let mut config = TrackerConfig::from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config))?;
    args.apply_overrides(&mut config);
    config.validate().context("configuration validation failed")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // 初始化日誌 (CI 使用 JSON)
    if args.log_json {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("Starting hvac-tracker");
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
    }

    // 載入並驗證配置
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ {:#}", e);
            if let Some(etl) = e.downcast_ref::<hvac_tracker::EtlError>() {
                tracing::error!("💡 Suggestion: {}", etl.recovery_suggestion());
            }
            eprintln!("❌ {:#}", e);
            std::process::exit(1);
        }
    };

    if args.dry_run {
        tracing::info!("🧪 Dry run enabled: nothing will be written");
    }

    // 建立存儲和管道
    let storage = LocalStorage::new(".");
    let pipeline = TrackerPipeline::new(storage, config)
        .context("failed to build HTTP client")?
        .dry_run(args.dry_run);

    let engine = EtlEngine::new(pipeline);

    match engine.run().await {
        Ok(report_path) => {
            tracing::info!("✅ Tracker run completed");
            tracing::info!("📁 Report: {}", report_path);
            println!("✅ Tracker run completed");
            println!("📁 Report: {}", report_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ Tracker run failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                ErrorSeverity::Medium => 2, // 網路錯誤，可重試
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3, // 無法寫入輸出
            };
            std::process::exit(exit_code);
        }
    }

    Ok(())
}
