mod collectors;
mod config;
mod host;
mod runner;
mod snapshot;
mod store;

use clap::Parser;
use config::Config;
use reqwest::Client;
use store::{Gateway, MongoStore};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostsnap")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    info!(
        database = %cfg.database_name,
        interface = %cfg.interface,
        "starting hostsnap cycle"
    );

    let store = match MongoStore::connect(&cfg.mongo_uri, &cfg.database_name).await {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "failed to connect to the document store");
            std::process::exit(1);
        }
    };
    let gateway = Gateway::new(store);

    let client = Client::builder()
        .user_agent("hostsnap/0.1.0")
        .build()
        .unwrap_or_else(|_| Client::new());
    let taxonomy = snapshot::taxonomy(&cfg, &client);

    match runner::execute_cycle(&cfg, &gateway, &taxonomy).await {
        Ok(report) => {
            info!(
                elapsed_secs = report.elapsed.as_secs_f64(),
                "system information and charts stored"
            );
        }
        Err(err) => {
            error!(
                error = %err,
                elapsed_secs = err.elapsed.as_secs_f64(),
                "cycle failed"
            );
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
