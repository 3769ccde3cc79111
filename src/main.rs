use actix_web::{App, HttpServer, web};
use anyhow::Result;
use log::info;

use api::ApiSettings;
use config::Settings;
use open_exchange::RateProviderClient;
use pipeline::IngestPipeline;
use warehouse::WarehouseClient;

mod api;
mod config;
mod error;
mod exchange_rate;
mod open_exchange;
mod pipeline;
mod queries;
mod warehouse;

#[cfg(test)]
mod testing;

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env()?;

    let warehouse = WarehouseClient::new(&settings.warehouse)?;
    if settings.warehouse.create_tables {
        warehouse.ensure_tables().await?;
    }

    let pipeline = web::Data::new(IngestPipeline::new(
        RateProviderClient::new(settings.provider.clone()),
        warehouse,
    ));
    let api_settings = web::Data::new(ApiSettings {
        default_days: settings.server.default_ingest_days,
        failure_status: settings.server.failure_status,
    });

    info!(
        "Serving exchange rate ingestion on {} (base {})",
        settings.server.bind_addr, settings.provider.base_currency
    );

    HttpServer::new(move || {
        App::new()
            .app_data(pipeline.clone())
            .app_data(api_settings.clone())
            .configure(api::configure::<RateProviderClient, WarehouseClient>)
    })
    .bind(&settings.server.bind_addr)?
    .run()
    .await?;

    Ok(())
}
