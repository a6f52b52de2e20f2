use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "livefork")]
#[command(version)]
#[command(about = "Data source plugin host that forks live queries onto a push channel")]
pub struct Args {
    /// Path to a TOML config file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Data source uid; namespaces the live channel (ds/<uid>/stream)
    #[arg(long)]
    pub uid: Option<String>,

    /// Address the HTTP host listens on (e.g. 127.0.0.1:10001)
    #[arg(long)]
    pub listen: Option<String>,

    /// Milliseconds between frames on the live channel
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Consecutive values emitted per live frame
    #[arg(long)]
    pub batch_size: Option<u32>,

    /// Rows in each frame answered by a one-shot query
    #[arg(long)]
    pub rows: Option<usize>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long)]
    pub log_level: Option<String>,
}
