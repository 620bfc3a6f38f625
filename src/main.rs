use env_logger::Env;
use eventshare::{Config, app};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::load();

    // Start the web application
    app::run(config).await?;

    Ok(())
}
