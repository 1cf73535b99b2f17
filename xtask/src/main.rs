mod show;

#[macro_use]
extern crate clap;
use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;

fn main() {
    use Commands::*;
    match Cli::parse().command {
        Show(args) => args.show(),
    }
}

#[derive(Parser)]
#[clap(name = "gguf-probe")]
#[clap(version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a gguf file and report alignment of its tensors
    Show(show::ShowArgs),
}

#[derive(Args, Default)]
struct LogArgs {
    /// Log level, may be "off", "error", "warn", "info", "debug" or "trace"
    #[clap(long)]
    log: Option<String>,
}

impl LogArgs {
    fn init(self) {
        let level = self
            .log
            .as_deref()
            .and_then(|level| level.parse().ok())
            .unwrap_or(LevelFilter::Warn);
        SimpleLogger::new().with_level(level).init().unwrap();
    }
}

const YES: &str = "✔️  ";
const WARN: &str = "⚠️  ";
const ERR: &str = "❌  ";
