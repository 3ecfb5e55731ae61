use clap::Parser;
use order_bridge::config::LogFormat;
use order_bridge::domain::ports::ConfigProvider;
use order_bridge::utils::error::{BridgeError, ErrorSeverity};
use order_bridge::utils::{logger, validation::Validate};
use order_bridge::{
    BridgeConfig, CliArgs, DispatchCoordinator, DispatchEngine, DispatchSettings,
    HttpKernelClient, HttpOrderSource, LocalStorage,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn exit_code(severity: ErrorSeverity) -> i32 {
    match severity {
        ErrorSeverity::Low => 0,      // 警告，但成功
        ErrorSeverity::Medium => 2,   // 可重試
        ErrorSeverity::High => 1,     // 資料錯誤
        ErrorSeverity::Critical => 3, // 系統或設定錯誤
    }
}

fn fail(e: &BridgeError) -> ! {
    tracing::error!(
        "❌ order-bridge failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());
    std::process::exit(exit_code(e.severity()).max(1));
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let config = match BridgeConfig::from_file(&args.config) {
        Ok(config) => config.with_interval_override(args.interval_seconds),
        Err(e) => {
            logger::init_cli_logger(args.verbose);
            fail(&e);
        }
    };

    match config.log_format() {
        LogFormat::Json => logger::init_json_logger(args.verbose),
        LogFormat::Compact => logger::init_cli_logger(args.verbose),
    }

    tracing::info!("Starting order-bridge");
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
        tracing::debug!("Config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        fail(&e);
    }

    let monitor_enabled = args.monitor || config.system_stats_enabled();
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let source = match HttpOrderSource::from_config(&config) {
        Ok(source) => source.with_access_key(config.source_access_key().map(str::to_string)),
        Err(e) => fail(&e),
    };
    let kernel = match HttpKernelClient::from_config(&config) {
        Ok(kernel) => kernel,
        Err(e) => fail(&e),
    };
    let storage = LocalStorage::new(config.state_dir());

    let coordinator = match DispatchCoordinator::new(
        Arc::new(source),
        Arc::new(kernel),
        storage,
        DispatchSettings::from_config(&config),
    )
    .await
    {
        Ok(coordinator) => Arc::new(coordinator),
        Err(e) => fail(&e),
    };
    let engine = DispatchEngine::new_with_monitoring(coordinator, monitor_enabled);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("🛑 Shutdown requested, finishing current pass");
                cancel.cancel();
            }
        });
    }

    if args.once {
        let summary = engine.run_once(&cancel).await;
        println!("{}", summary);
        if summary.fetch_error.is_some() {
            std::process::exit(exit_code(ErrorSeverity::Medium));
        }
        if summary.has_problems() {
            std::process::exit(exit_code(ErrorSeverity::High));
        }
        return;
    }

    engine.run(config.poll_interval(), cancel).await;
    tracing::info!("✅ order-bridge stopped");
}
