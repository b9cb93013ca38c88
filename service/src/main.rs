use clap::Parser;
use log::{error, info};
use service::config::{Args, DiscoveryBackend};
use service::discovery::{DiscoveryError, MasterServerDiscovery, WebApiDiscovery};
use service::pipeline::QueryPipeline;
use service::report::ErrorDocument;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let filter = args.command.filter();
    let pipeline = QueryPipeline::new(args.pipeline_config());

    info!("Querying servers matching {}", filter);
    info!(
        "Timeout {}ms, up to {} concurrent queries",
        args.timeout_ms, args.jobs
    );

    let outcome = match args.discovery {
        DiscoveryBackend::Web => match WebApiDiscovery::new(args.api_key()) {
            Ok(discovery) => pipeline.run(&discovery, &filter).await,
            Err(e) => Err(e),
        },
        DiscoveryBackend::Master => {
            info!("Using master server {}", args.master);
            let discovery = MasterServerDiscovery::new(&args.master, args.timeout());
            pipeline.run(&discovery, &filter).await
        }
    };

    match outcome {
        Ok(report) => {
            println!("{}", report.to_json(args.pretty)?);
            Ok(())
        }
        Err(e) => {
            error!("Failed to query server list: {}", e);
            if matches!(
                e,
                DiscoveryError::MissingCredential | DiscoveryError::InvalidCredential(_)
            ) {
                error!("Set STEAM_API_KEY or pass --api-key");
                error!("Get a key from: https://steamcommunity.com/dev/apikey");
            }
            println!("{}", serde_json::to_string(&ErrorDocument::from(&e))?);
            std::process::exit(1);
        }
    }
}
