use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "order-bridge")]
#[command(about = "Bridges external order systems to an openTCS kernel")]
pub struct CliArgs {
    #[arg(long, short = 'c', default_value = "order-bridge.toml")]
    pub config: PathBuf,

    #[arg(long, help = "Run a single dispatch pass and exit")]
    pub once: bool,

    #[arg(long, short = 'v', help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log process CPU and memory after each tick")]
    pub monitor: bool,

    #[arg(long, help = "Override dispatch.interval_seconds")]
    pub interval_seconds: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["order-bridge"]);
        assert_eq!(args.config, PathBuf::from("order-bridge.toml"));
        assert!(!args.once);
        assert!(!args.verbose);
        assert_eq!(args.interval_seconds, None);
    }

    #[test]
    fn test_flags() {
        let args = CliArgs::parse_from([
            "order-bridge",
            "--config",
            "/etc/order-bridge.toml",
            "--once",
            "--verbose",
            "--monitor",
            "--interval-seconds",
            "30",
        ]);
        assert_eq!(args.config, PathBuf::from("/etc/order-bridge.toml"));
        assert!(args.once);
        assert!(args.verbose);
        assert!(args.monitor);
        assert_eq!(args.interval_seconds, Some(30));
    }
}
