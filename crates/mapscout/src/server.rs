/// MCP server exposing the lead search.
///
/// Tools:
/// - `search_businesses`: grounded Gemini search, parsed into business records
/// - `extract_businesses`: parse model output the caller already has
use std::sync::Arc;

use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::extractor::extract_records;
use crate::model::{BusinessRecord, LocationBias, SearchResult};
use crate::search::SearchOrchestrator;

#[derive(Clone)]
pub struct MapScoutServer {
    orchestrator: Arc<SearchOrchestrator>,
    default_location: Option<LocationBias>,
    tool_router: ToolRouter<MapScoutServer>,
}

impl MapScoutServer {
    pub fn new(orchestrator: Arc<SearchOrchestrator>, default_location: Option<LocationBias>) -> Self {
        Self {
            orchestrator,
            default_location,
            tool_router: Self::tool_router(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchBusinessesParams {
    /// Business category and place, e.g. "Event Planners in New York".
    query: String,
    /// Latitude to bias results toward. Give together with `longitude`;
    /// omit both to use the server's session location.
    latitude: Option<f64>,
    /// Longitude to bias results toward.
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExtractBusinessesParams {
    /// Model output using `NAME:` / `PHONE:` / ... lines separated by `---`.
    raw_text: String,
}

#[derive(Debug, Serialize, JsonSchema)]
struct ExtractBusinessesResponse {
    businesses: Vec<BusinessRecord>,
}

#[tool_router]
impl MapScoutServer {
    #[tool(description = "Find businesses matching a free-text query using Gemini grounded with Google Maps and Google Search. Returns parsed business records (name, phone, email, address, website, rating), the raw model answer, and the grounding sources. Missing phone/email read \"Not found\"; a missing address reads \"Address not found\".")]
    async fn search_businesses(
        &self,
        Parameters(params): Parameters<SearchBusinessesParams>,
    ) -> Result<Json<SearchResult>, String> {
        let query = params.query.trim().to_string();
        if query.is_empty() {
            return Err("query must not be empty".to_string());
        }

        let location = resolve_location(params.latitude, params.longitude, self.default_location)?;

        let result = self
            .orchestrator
            .search(&query, location)
            .await
            .map_err(|e| format!("search failed: {e}"))?;
        Ok(Json(result))
    }

    #[tool(description = "Parse business records out of text already produced by a model, without calling Gemini. Uses the same rules as search_businesses.")]
    async fn extract_businesses(
        &self,
        Parameters(params): Parameters<ExtractBusinessesParams>,
    ) -> Result<Json<ExtractBusinessesResponse>, String> {
        Ok(Json(ExtractBusinessesResponse {
            businesses: extract_records(&params.raw_text),
        }))
    }
}

/// Per-call coordinates win over the session location.
fn resolve_location(
    latitude: Option<f64>,
    longitude: Option<f64>,
    session: Option<LocationBias>,
) -> Result<Option<LocationBias>, String> {
    match (latitude, longitude) {
        (Some(lat), Some(lng)) => Ok(Some(LocationBias::new(lat, lng))),
        (None, None) => Ok(session),
        _ => Err("latitude and longitude must be given together".to_string()),
    }
}

#[tool_handler]
impl ServerHandler for MapScoutServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mapscout".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Lead generation MCP server. Use search_businesses with a query like \
'Dentists in Austin, TX' to get businesses with contact details and their sources. \
An empty businesses list means nothing was found; an error means the upstream call failed. \
Use extract_businesses to parse model output you already have."
                    .to_string(),
            ),
        }
    }
}
