use clap::Parser;
use tracing_subscriber::EnvFilter;
use tubetest_tracker::daemon;
use tubetest_tracker::error::Result;

#[derive(Parser, Debug)]
#[command(name = "tubetestd")]
#[command(about = "TubeTest Tracker daemon")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 7979)]
    port: u16,

    #[arg(long, env = "TUBETEST_DB", default_value = "./data/tubetest.db")]
    db: String,

    #[arg(long, env = "TUBETEST_TOKEN", default_value = "")]
    token: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tubetest_tracker=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    daemon::run(&cli.host, cli.port, &cli.db, &cli.token).await
}
