use dotenvy::dotenv;

use usagi::error::ApplicationError;
use usagi::stats::StatsRepository;
use usagi::{api, config, logger, store};

#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    dotenv().ok();

    let config = config::load()?;

    let _guard = logger::init(&config)?;

    let store = store::connect(&config).await;
    let app = api::create_app(StatsRepository::new(store));

    api::serve(&config, app).await
}
