use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, web};
use log::error;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::open_exchange::RateSource;
use crate::pipeline::IngestPipeline;
use crate::warehouse::Warehouse;

pub const MAX_INGEST_DAYS: u32 = 31;

const GENERIC_FAILURE: &str = "An unexpected error occurred while ingesting exchange rates";

/// Boundary settings shared with every handler.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub default_days: u32,
    pub failure_status: StatusCode,
}

#[derive(Debug, Deserialize)]
pub struct IngestParams {
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.detail)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status).json(ErrorBody {
            detail: self.detail.clone(),
        })
    }
}

/// Status for each kind of ingestion failure.
pub fn status_for(err: &IngestError, failure_status: StatusCode) -> StatusCode {
    match err {
        IngestError::AlreadyRunning => StatusCode::CONFLICT,
        IngestError::Provider(_) => failure_status,
        IngestError::Load(_) => failure_status,
    }
}

fn to_api_error(err: IngestError, settings: &ApiSettings) -> ApiError {
    let status = status_for(&err, settings.failure_status);
    match err {
        IngestError::AlreadyRunning => ApiError {
            status,
            detail: IngestError::AlreadyRunning.to_string(),
        },
        other => {
            error!("Error while ingesting exchange rates: {}", other);
            ApiError {
                status,
                detail: GENERIC_FAILURE.to_string(),
            }
        }
    }
}

async fn ingest<S, W>(
    pipeline: web::Data<IngestPipeline<S, W>>,
    settings: web::Data<ApiSettings>,
    params: web::Query<IngestParams>,
) -> Result<HttpResponse, ApiError>
where
    S: RateSource + 'static,
    W: Warehouse + 'static,
{
    let days = params.days.unwrap_or(settings.default_days);
    if days > MAX_INGEST_DAYS {
        return Err(ApiError {
            status: StatusCode::BAD_REQUEST,
            detail: format!("days must be between 0 and {}", MAX_INGEST_DAYS),
        });
    }

    let result = pipeline
        .ingest_historical_rates(days)
        .await
        .map_err(|e| to_api_error(e, &settings))?;
    Ok(HttpResponse::Ok().json(result))
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Registers the ingestion routes for a pipeline of the given type.
pub fn configure<S, W>(cfg: &mut web::ServiceConfig)
where
    S: RateSource + 'static,
    W: Warehouse + 'static,
{
    cfg.route("/exchange_rates/ingest", web::post().to(ingest::<S, W>))
        .route("/health", web::get().to(health))
        .app_data(web::QueryConfig::default().error_handler(|err, _| {
            ApiError {
                status: StatusCode::BAD_REQUEST,
                detail: err.to_string(),
            }
            .into()
        }));
}
