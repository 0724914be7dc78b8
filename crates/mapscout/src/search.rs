use std::sync::Arc;

use tracing::{error, info};

use crate::error::AppError;
use crate::extractor::extract_records;
use crate::model::{CitationLink, LocationBias, SearchResult};
use mapscout_common::gemini::{
    Content, GeminiClient, GenerateContentRequest, GenerateContentResponse, GroundingChunk,
    LatLng, RetrievalConfig, Tool, ToolConfig,
};

pub const MAPS_SOURCE_TITLE: &str = "Google Maps Source";
pub const WEB_SOURCE_TITLE: &str = "Web Source";

// Must describe exactly the line format `extractor` parses.
const PROMPT_HEAD: &str = "Act as an expert Lead Generation specialist. Your task is to extract \
a high-quality list of businesses and their contact details for the query: \"";

const PROMPT_TAIL: &str = concat!(
    "\".\n",
    "\n",
    "For EVERY business found via Google Maps or Google Search, provide the details in this specific format. \n",
    "You MUST prioritize finding the EMAIL and PHONE NUMBER. \n",
    "If an email is not directly listed, check for common patterns based on the domain or look for it in the snippets.\n",
    "\n",
    "Use the following structure for each entry:\n",
    "\n",
    "NAME: [Business Name]\n",
    "PHONE: [Full Phone Number]\n",
    "EMAIL: [Email Address or \"Not found\"]\n",
    "ADDRESS: [Complete Address]\n",
    "WEBSITE: [URL]\n",
    "RATING: [X.X/5]\n",
    "---\n",
    "(Repeat for at least 10-15 businesses if possible)\n",
    "\n",
    "IMPORTANT: Use both Google Maps and Google Search to find emails. Often emails are found on \
the website's contact page or directory listings found via search.",
);

/// Runs a grounded business search against Gemini and parses the answer.
///
/// Holds no per-search state: each call issues exactly one upstream request
/// and either returns a complete [`SearchResult`] or the upstream error.
pub struct SearchOrchestrator {
    gemini: Arc<GeminiClient>,
    model: String,
}

impl SearchOrchestrator {
    pub fn new(gemini: Arc<GeminiClient>, model: impl Into<String>) -> Self {
        Self {
            gemini,
            model: model.into(),
        }
    }

    pub async fn search(
        &self,
        query: &str,
        location: Option<LocationBias>,
    ) -> Result<SearchResult, AppError> {
        let request = build_request(query, location);
        info!(
            query,
            model = %self.model,
            location_bias = request.tool_config.is_some(),
            "searching businesses"
        );

        let response = self
            .gemini
            .generate_content(&self.model, &request)
            .await
            .inspect_err(|e| error!(error = %e, query, "business search failed"))?;

        let result = assemble_result(&response);
        let usage = response.usage_metadata.as_ref();
        info!(
            businesses = result.businesses.len(),
            sources = result.sources.len(),
            raw_text_len = result.raw_text.len(),
            model_version = response.model_version.as_deref(),
            finish_reason = response.finish_reason(),
            prompt_tokens = usage.and_then(|u| u.prompt_token_count),
            candidates_tokens = usage.and_then(|u| u.candidates_token_count),
            total_tokens = usage.and_then(|u| u.total_token_count),
            "business search complete"
        );
        Ok(result)
    }
}

pub fn build_prompt(query: &str) -> String {
    format!("{PROMPT_HEAD}{query}{PROMPT_TAIL}")
}

/// Both retrieval tools are always enabled; the model picks per entry. The
/// location is attached only when it is usable.
pub fn build_request(query: &str, location: Option<LocationBias>) -> GenerateContentRequest {
    let tool_config = location
        .filter(LocationBias::is_usable)
        .map(|loc| ToolConfig {
            retrieval_config: RetrievalConfig {
                lat_lng: LatLng {
                    latitude: loc.latitude,
                    longitude: loc.longitude,
                },
            },
        });

    GenerateContentRequest {
        contents: vec![Content::user_text(build_prompt(query))],
        tools: vec![Tool::google_maps(), Tool::google_search()],
        tool_config,
    }
}

/// Map grounding chunks to citation links, in order. Chunks from neither
/// Maps nor Search are skipped; duplicates are kept.
pub fn collect_citations(chunks: &[GroundingChunk]) -> Vec<CitationLink> {
    chunks
        .iter()
        .filter_map(|chunk| {
            if let Some(maps) = &chunk.maps {
                Some(citation(&maps.uri, &maps.title, MAPS_SOURCE_TITLE))
            } else {
                chunk
                    .web
                    .as_ref()
                    .map(|web| citation(&web.uri, &web.title, WEB_SOURCE_TITLE))
            }
        })
        .collect()
}

fn citation(uri: &Option<String>, title: &Option<String>, default_title: &str) -> CitationLink {
    CitationLink {
        uri: uri.clone().unwrap_or_default(),
        title: title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(default_title)
            .to_string(),
    }
}

fn assemble_result(response: &GenerateContentResponse) -> SearchResult {
    let raw_text = response.text();
    let sources = collect_citations(response.grounding_chunks());
    let businesses = extract_records(&raw_text);
    SearchResult {
        raw_text,
        businesses,
        sources,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use mapscout_common::gemini::{GeminiClientConfig, GeminiClientError, MapsChunk, WebChunk};

    #[test]
    fn prompt_names_query_and_format() {
        let prompt = build_prompt("Event Planners in New York");
        assert!(prompt.starts_with(
            "Act as an expert Lead Generation specialist. Your task is to extract a high-quality \
list of businesses and their contact details for the query: \"Event Planners in New York\".\n\n"
        ));
        assert!(prompt.contains("\nNAME: [Business Name]\nPHONE: [Full Phone Number]\n"));
        assert!(prompt.contains("EMAIL: [Email Address or \"Not found\"]\n"));
        assert!(prompt.contains("RATING: [X.X/5]\n---\n"));
        assert!(prompt.contains("at least 10-15 businesses"));
        assert!(prompt.contains("provide the details in this specific format. \nYou MUST prioritize"));
        assert!(prompt.ends_with("directory listings found via search."));
    }

    #[test]
    fn request_enables_both_tools_without_location() {
        let value = serde_json::to_value(build_request("florists", None)).unwrap();
        assert_eq!(value["tools"], json!([{"googleMaps": {}}, {"googleSearch": {}}]));
        assert!(value.get("toolConfig").is_none());
        assert_eq!(value["contents"][0]["role"], "user");
        assert!(value["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("\"florists\""));
    }

    #[test]
    fn request_carries_usable_location() {
        let request = build_request("florists", Some(LocationBias::new(51.5072, -0.1276)));
        let value = serde_json::to_value(request).unwrap();
        assert_eq!(
            value["toolConfig"],
            json!({"retrievalConfig": {"latLng": {"latitude": 51.5072, "longitude": -0.1276}}})
        );
    }

    #[test]
    fn request_drops_zero_location() {
        let request = build_request("florists", Some(LocationBias::new(0.0, 0.0)));
        assert!(request.tool_config.is_none());
        let request = build_request("florists", Some(LocationBias::new(51.5, 0.0)));
        assert!(request.tool_config.is_none());
    }

    #[test]
    fn untitled_chunks_get_default_titles_in_order() {
        let chunks = vec![
            GroundingChunk {
                maps: Some(MapsChunk {
                    uri: Some("https://maps.google.com/?cid=42".to_string()),
                    ..MapsChunk::default()
                }),
                web: None,
            },
            GroundingChunk {
                maps: None,
                web: Some(WebChunk {
                    uri: Some("https://example.com/contact".to_string()),
                    title: None,
                }),
            },
        ];
        let links = collect_citations(&chunks);
        assert_eq!(
            links,
            vec![
                CitationLink {
                    uri: "https://maps.google.com/?cid=42".to_string(),
                    title: "Google Maps Source".to_string(),
                },
                CitationLink {
                    uri: "https://example.com/contact".to_string(),
                    title: "Web Source".to_string(),
                },
            ]
        );
    }

    #[test]
    fn citations_keep_titles_duplicates_and_skip_unknown() {
        let chunk = |title: &str| GroundingChunk {
            maps: None,
            web: Some(WebChunk {
                uri: Some("https://dup.example".to_string()),
                title: Some(title.to_string()),
            }),
        };
        let chunks = vec![chunk("Dup"), GroundingChunk::default(), chunk("Dup"), chunk("")];
        let links = collect_citations(&chunks);
        assert_eq!(links.len(), 3);
        assert_eq!(links[0].title, "Dup");
        assert_eq!(links[1], links[0]);
        assert_eq!(links[2].title, "Web Source");
    }

    #[test]
    fn result_combines_text_records_and_sources() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{
                    "text": "NAME: Lakeside Dental\nPHONE: 612-555-0150\nEMAIL: Not found\n---\nNAME: Uptown Dental\nWEBSITE: https://uptown.example\n---"
                }]},
                "groundingMetadata": {"groundingChunks": [
                    {"maps": {"uri": "https://maps.google.com/?cid=7", "title": "Lakeside Dental"}},
                    {"web": {"uri": "https://uptown.example"}}
                ]}
            }]
        }))
        .unwrap();

        let result = assemble_result(&response);
        assert!(result.raw_text.starts_with("NAME: Lakeside Dental"));
        assert_eq!(result.businesses.len(), 2);
        assert_eq!(result.businesses[0].phone, "612-555-0150");
        assert_eq!(result.businesses[0].email, "Not found");
        assert_eq!(result.businesses[1].address, "Address not found");
        assert_eq!(result.sources.len(), 2);
        assert_eq!(result.sources[0].title, "Lakeside Dental");
        assert_eq!(result.sources[1].title, "Web Source");
    }

    #[test]
    fn empty_response_yields_empty_result() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({"candidates": []})).unwrap();
        let result = assemble_result(&response);
        assert_eq!(result.raw_text, "");
        assert!(result.businesses.is_empty());
        assert!(result.sources.is_empty());
    }

    /// Local stand-in for the Gemini endpoint. Answers every request with the
    /// given status line and body, and records each request head it saw.
    async fn stub_gemini(
        status: &'static str,
        body: &'static str,
    ) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/v1beta", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let head_end = loop {
                    let n = stream.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                };
                let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
                let content_length = head
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while buf.len() < head_end + content_length {
                    let n = stream.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                seen.lock().unwrap().push(head);

                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                let _ = stream.shutdown().await;
            }
        });

        (base_url, requests)
    }

    fn orchestrator_for(base_url: &str) -> SearchOrchestrator {
        let config = GeminiClientConfig::from_vars(|key| match key {
            "GEMINI_API_KEY" => Some("test-key".to_string()),
            "GEMINI_BASE_URL" => Some(base_url.to_string()),
            "GEMINI_TIMEOUT_SECS" => Some("10".to_string()),
            _ => None,
        })
        .unwrap();
        SearchOrchestrator::new(Arc::new(GeminiClient::new(config).unwrap()), "gemini-2.5-flash")
    }

    fn assert_single_generate_call(requests: &Mutex<Vec<String>>) {
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1, "expected exactly one upstream call");
        let head = requests[0].to_lowercase();
        assert!(
            head.starts_with("post /v1beta/models/gemini-2.5-flash:generatecontent http/1.1"),
            "unexpected request: {head}"
        );
        assert!(head.contains("x-goog-api-key: test-key"));
    }

    #[tokio::test]
    async fn upstream_failure_is_returned_after_one_call() {
        let (base_url, requests) = stub_gemini(
            "503 Service Unavailable",
            r#"{"error":{"code":503,"message":"overloaded","status":"UNAVAILABLE"}}"#,
        )
        .await;

        let result = orchestrator_for(&base_url)
            .search("bakeries in Minneapolis", None)
            .await;

        match result {
            Err(AppError::Upstream(GeminiClientError::Upstream { status, message })) => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_single_generate_call(&requests);
    }

    #[tokio::test]
    async fn malformed_success_body_is_an_error() {
        let (base_url, requests) = stub_gemini("200 OK", "not json").await;

        let result = orchestrator_for(&base_url).search("florists", None).await;

        assert!(matches!(
            result,
            Err(AppError::Upstream(GeminiClientError::InvalidJson(_)))
        ));
        assert_single_generate_call(&requests);
    }

    #[tokio::test]
    async fn successful_call_is_assembled_into_result() {
        let (base_url, requests) = stub_gemini(
            "200 OK",
            r#"{
                "candidates": [{
                    "content": {"role": "model", "parts": [
                        {"text": "NAME: Harbor Florist\nPHONE: 206-555-0170\nEMAIL: n/a\n---\n"}
                    ]},
                    "finishReason": "STOP",
                    "groundingMetadata": {"groundingChunks": [
                        {"web": {"uri": "https://harborflorist.example"}},
                        {"maps": {"uri": "https://maps.google.com/?cid=9"}}
                    ]}
                }],
                "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 40, "totalTokenCount": 160},
                "modelVersion": "gemini-2.5-flash"
            }"#,
        )
        .await;

        let result = orchestrator_for(&base_url)
            .search("florists in Seattle", Some(LocationBias::new(47.6062, -122.3321)))
            .await
            .unwrap();

        assert_eq!(result.businesses.len(), 1);
        assert_eq!(result.businesses[0].name, "Harbor Florist");
        assert_eq!(result.businesses[0].phone, "206-555-0170");
        assert_eq!(result.businesses[0].email, "Not found");
        let titles: Vec<&str> = result.sources.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, ["Web Source", "Google Maps Source"]);
        assert_eq!(result.sources[1].uri, "https://maps.google.com/?cid=9");
        assert_single_generate_call(&requests);
    }
}
