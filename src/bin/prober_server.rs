use clap::Parser;
use cassprober::{
    server::{config::Config, Server},
    telemetry::init_subscriber,
};

#[derive(Debug, Parser)]
#[command(name = "cassprober-server")]
#[command(about = "Cassandra cluster readiness prober", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_subscriber(
        args.config.log_format,
        &args.config.log_level,
        args.config.otlp_endpoint.as_deref(),
    )?;

    let server = Server::from_config(args.config).await?;
    server.run(tokio::signal::ctrl_c()).await?;

    Ok(())
}
