use clap::Parser;
use log::{error, info};
use meshtrace::configuration::config::{Args, Config};
use meshtrace::controller::controller_handler::Controller;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // RUST_LOG, when set, wins over the default level
    env_logger::Builder::new()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .format_target(false)
        .init();

    info!("Importing configuration");

    let config = match Config::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration imported successfully, {} hosts",
        config.hosts.len()
    );

    match Controller::new(&config).run().await {
        Ok((_, summary)) => info!(
            "Done: {} edges written to {}",
            summary.edges,
            config.graph.output.display()
        ),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
