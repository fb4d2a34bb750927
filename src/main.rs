use log::{error, info, warn};
use service::{config::Config, logging::Logger};

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config as &Config) {
        eprintln!("Failed to start logger: {e}");
    }

    let manager = match service::init_manager(&config) {
        Ok(manager) => manager,
        Err(e) => {
            error!("Failed to initialize OAuth manager: {e}");
            std::process::exit(1);
        }
    };

    let providers = match &config.provider {
        Some(name) => vec![name.clone()],
        None => manager.list_providers(),
    };
    info!("Starting OAuth flows for {} provider(s)", providers.len());

    let mut failed = false;
    for name in providers {
        match manager
            .initiate_flow(&name, config.return_to.as_deref(), None)
            .await
        {
            Ok(start) => println!("{}\t{}", start.provider, start.authorization_url),
            Err(e) => {
                warn!("Could not start a flow for {name}: {e}");
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}
