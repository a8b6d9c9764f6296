use clap::Parser;
use clipsearch::Opts;
use clipsearch::cli::SubCommandExtend;
use clipsearch::config::SubCommand;
use env_logger::Env;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

fn init_logger() {
    // RUST_LOG 优先，其次是 LOG_LEVEL
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level.to_lowercase())).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Scan(config) => config.run(&opts).await,
        SubCommand::Embed(config) => config.run(&opts).await,
        SubCommand::Load(config) => config.run(&opts).await,
        SubCommand::Generate(config) => config.run(&opts).await,
        SubCommand::Relativize(config) => config.run(&opts).await,
        SubCommand::Search(config) => config.run(&opts).await,
        SubCommand::Export(config) => config.run(&opts).await,
        SubCommand::Server(config) => config.run(&opts).await,
    }
}
