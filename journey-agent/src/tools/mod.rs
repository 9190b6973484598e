use serde::{Deserialize, Serialize};
use serde_with::{DefaultOnNull, serde_as};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ToolsConfig;

/// Keyword arguments captured from an action such as `get_weather(city="Paris")`.
pub type ToolArgs = BTreeMap<String, String>;

pub type ToolFuture = Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send>>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("Network problem encountered when querying weather - {0}")]
    WeatherNetwork(String),
    #[error("Failed to parse weather data, city name may be invalid - {0}")]
    WeatherPayload(String),
    #[error("{0} environment variable not configured.")]
    NotConfigured(&'static str),
    #[error("Problem occurred when executing Tavily search - {0}")]
    Search(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Vec<String>,
}

impl ToolInfo {
    /// Call signature as shown to the model, e.g. `get_weather(city: str)`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| format!("{}: str", p))
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

pub trait ToolTrait: Send + Sync {
    fn info(&self) -> ToolInfo;
    fn execute(&self, arguments: ToolArgs) -> ToolFuture;
}

fn required(arguments: &ToolArgs, key: &str) -> Result<String, ToolError> {
    arguments
        .get(key)
        .cloned()
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing argument '{}'", key)))
}

#[derive(Debug, Deserialize)]
struct WttrReport {
    current_condition: Vec<WttrCondition>,
}

#[derive(Debug, Deserialize)]
struct WttrCondition {
    #[serde(rename = "weatherDesc")]
    weather_desc: Vec<WttrText>,
    /// Echoed as sent; wttr.in reports it as a string.
    #[serde(rename = "temp_C")]
    temp_c: String,
}

#[derive(Debug, Deserialize)]
struct WttrText {
    value: String,
}

/// Turn a wttr.in `format=j1` payload into the sentence handed back to the model.
pub fn describe_weather(city: &str, body: &str) -> Result<String, ToolError> {
    let report: WttrReport =
        serde_json::from_str(body).map_err(|e| ToolError::WeatherPayload(e.to_string()))?;

    let current = report
        .current_condition
        .first()
        .ok_or_else(|| ToolError::WeatherPayload("current_condition is empty".to_string()))?;
    let desc = current
        .weather_desc
        .first()
        .ok_or_else(|| ToolError::WeatherPayload("weatherDesc is empty".to_string()))?;

    Ok(format!(
        "{} current weather: {}, temperature {} degrees Celsius",
        city, desc.value, current.temp_c
    ))
}

pub struct WeatherTool {
    client: reqwest::Client,
    base_url: String,
}

impl WeatherTool {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    fn url_for(base_url: &str, city: &str) -> Result<reqwest::Url, ToolError> {
        let mut url = reqwest::Url::parse(base_url)
            .map_err(|e| ToolError::WeatherNetwork(format!("invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ToolError::WeatherNetwork(format!("invalid base URL: {}", base_url)))?
            .pop_if_empty()
            .push(city);
        url.query_pairs_mut().append_pair("format", "j1");
        Ok(url)
    }
}

impl ToolTrait for WeatherTool {
    fn info(&self) -> ToolInfo {
        ToolInfo {
            name: "get_weather".to_string(),
            description: "Query real-time weather for a specified city.".to_string(),
            parameters: vec!["city".to_string()],
        }
    }

    fn execute(&self, arguments: ToolArgs) -> ToolFuture {
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        Box::pin(async move {
            let city = required(&arguments, "city")?;
            let url = Self::url_for(&base_url, &city)?;
            debug!(%url, "querying weather");

            let response = client
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| ToolError::WeatherNetwork(e.to_string()))?;
            let body = response
                .text()
                .await
                .map_err(|e| ToolError::WeatherNetwork(e.to_string()))?;

            describe_weather(&city, &body)
        })
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    include_answer: bool,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull")]
    pub results: Vec<SearchResult>,
}

/// Tavily may send `null` for either field; those render as empty text.
#[serde_as]
#[derive(Debug, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull")]
    pub title: String,
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull")]
    pub content: String,
}

pub fn attraction_query(city: &str, weather: &str) -> String {
    format!(
        "'{}' most worthwhile tourist attractions and reasons in '{}' weather",
        city, weather
    )
}

/// Prefer the synthesized answer; fall back to a bulleted list of hits.
pub fn format_attractions(response: &SearchResponse) -> String {
    if let Some(answer) = response.answer.as_deref().filter(|a| !a.is_empty()) {
        return answer.to_string();
    }

    if response.results.is_empty() {
        return "Sorry, no relevant tourist attraction recommendations found.".to_string();
    }

    let lines: Vec<String> = response
        .results
        .iter()
        .map(|r| format!("- {}: {}", r.title, r.content))
        .collect();
    format!(
        "Based on search, found the following information for you:\n{}",
        lines.join("\n")
    )
}

pub struct AttractionTool {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AttractionTool {
    pub fn new(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

impl ToolTrait for AttractionTool {
    fn info(&self) -> ToolInfo {
        ToolInfo {
            name: "get_attraction".to_string(),
            description: "Search for recommended tourist attractions based on city and weather."
                .to_string(),
            parameters: vec!["city".to_string(), "weather".to_string()],
        }
    }

    fn execute(&self, arguments: ToolArgs) -> ToolFuture {
        let client = self.client.clone();
        let endpoint = format!("{}/search", self.base_url.trim_end_matches('/'));
        let api_key = self.api_key.clone();
        Box::pin(async move {
            let api_key = api_key.ok_or(ToolError::NotConfigured("TAVILY_API_KEY"))?;
            let city = required(&arguments, "city")?;
            let weather = required(&arguments, "weather")?;
            let query = attraction_query(&city, &weather);
            debug!(%query, "searching attractions");

            let request = SearchRequest {
                api_key: &api_key,
                query: &query,
                search_depth: "basic",
                include_answer: true,
            };

            let response: SearchResponse = client
                .post(&endpoint)
                .bearer_auth(&api_key)
                .json(&request)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| ToolError::Search(e.to_string()))?
                .json()
                .await
                .map_err(|e| ToolError::Search(e.to_string()))?;

            Ok(format_attractions(&response))
        })
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn ToolTrait>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Box<dyn ToolTrait>) {
        self.tools.insert(tool.info().name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn ToolTrait> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn definitions(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self.tools.values().map(|tool| tool.info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Run the named tool. Unknown names and tool failures come back as
    /// `Error: ...` observations instead of errors.
    pub async fn dispatch(&self, name: &str, arguments: ToolArgs) -> String {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "model requested an undefined tool");
            return format!("Error: Undefined tool '{}'", name);
        };

        match tool.execute(arguments).await {
            Ok(observation) => observation,
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                format!("Error: {}", e)
            }
        }
    }
}

pub fn default_tools(config: &ToolsConfig) -> ToolRegistry {
    let client = reqwest::Client::new();
    let mut registry = ToolRegistry::new();

    registry.register(Box::new(WeatherTool::new(
        client.clone(),
        config.weather_base_url.clone(),
    )));
    registry.register(Box::new(AttractionTool::new(
        client,
        config.tavily_base_url.clone(),
        config.tavily_api_key.clone(),
    )));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::Path, routing::{get, post}};

    const WTTR_FIXTURE: &str = r#"{
        "current_condition": [
            {"temp_C": "12", "weatherDesc": [{"value": "Partly cloudy"}], "humidity": "40"}
        ],
        "nearest_area": []
    }"#;

    async fn spawn_upstream(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn closed_port_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    fn args(pairs: &[(&str, &str)]) -> ToolArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn tools_config(weather: String, search: String, key: Option<&str>) -> ToolsConfig {
        ToolsConfig {
            weather_base_url: weather,
            tavily_base_url: search,
            tavily_api_key: key.map(str::to_string),
        }
    }

    #[test]
    fn test_describe_weather() {
        let text = describe_weather("Beijing", WTTR_FIXTURE).unwrap();
        assert_eq!(
            text,
            "Beijing current weather: Partly cloudy, temperature 12 degrees Celsius"
        );
    }

    #[test]
    fn test_describe_weather_rejects_empty_condition() {
        let err = describe_weather("Nowhere", r#"{"current_condition": []}"#).unwrap_err();
        assert!(matches!(err, ToolError::WeatherPayload(_)));
        assert!(err
            .to_string()
            .starts_with("Failed to parse weather data, city name may be invalid - "));
    }

    #[test]
    fn test_describe_weather_echoes_temperature_text() {
        let body = r#"{"current_condition": [{"temp_C": "-3.5", "weatherDesc": [{"value": "Light snow"}]}]}"#;
        assert_eq!(
            describe_weather("Harbin", body).unwrap(),
            "Harbin current weather: Light snow, temperature -3.5 degrees Celsius"
        );
    }

    #[test]
    fn test_search_response_tolerates_nulls() {
        let response: SearchResponse = serde_json::from_str(
            r#"{"answer": null, "results": [{"title": "Temple of Heaven", "content": null}]}"#,
        )
        .unwrap();
        assert_eq!(
            format_attractions(&response),
            "Based on search, found the following information for you:\n- Temple of Heaven: "
        );

        let response: SearchResponse = serde_json::from_str(r#"{"results": null}"#).unwrap();
        assert!(response.results.is_empty());
    }

    #[test]
    fn test_weather_url_encodes_city() {
        let url = WeatherTool::url_for("https://wttr.in", "New York").unwrap();
        assert_eq!(url.as_str(), "https://wttr.in/New%20York?format=j1");
    }

    #[test]
    fn test_format_attractions_prefers_answer() {
        let response = SearchResponse {
            answer: Some("Visit the Summer Palace.".to_string()),
            results: vec![SearchResult {
                title: "ignored".to_string(),
                content: "ignored".to_string(),
            }],
        };
        assert_eq!(format_attractions(&response), "Visit the Summer Palace.");
    }

    #[test]
    fn test_format_attractions_fallbacks() {
        let response = SearchResponse {
            answer: Some(String::new()),
            results: vec![
                SearchResult {
                    title: "Forbidden City".to_string(),
                    content: "Indoor halls".to_string(),
                },
                SearchResult {
                    title: "798 Art District".to_string(),
                    content: "Galleries".to_string(),
                },
            ],
        };
        assert_eq!(
            format_attractions(&response),
            "Based on search, found the following information for you:\n- Forbidden City: Indoor halls\n- 798 Art District: Galleries"
        );
        assert_eq!(
            format_attractions(&SearchResponse::default()),
            "Sorry, no relevant tourist attraction recommendations found."
        );
    }

    #[test]
    fn test_registry_lists_default_tools() {
        let registry = default_tools(&crate::config::Config::default().tools);
        assert_eq!(registry.list(), vec!["get_attraction", "get_weather"]);
        assert_eq!(
            registry.definitions()[0].signature(),
            "get_attraction(city: str, weather: str)"
        );
    }

    #[tokio::test]
    async fn test_dispatch_undefined_tool() {
        let registry = ToolRegistry::new();
        let observation = registry.dispatch("book_flight", ToolArgs::new()).await;
        assert_eq!(observation, "Error: Undefined tool 'book_flight'");
    }

    #[tokio::test]
    async fn test_dispatch_weather_against_upstream() {
        let router = Router::new().route(
            "/:city",
            get(|Path(city): Path<String>| async move {
                assert_eq!(city, "Beijing");
                WTTR_FIXTURE
            }),
        );
        let weather_url = spawn_upstream(router).await;
        let registry = default_tools(&tools_config(weather_url, closed_port_url().await, None));

        let observation = registry
            .dispatch("get_weather", args(&[("city", "Beijing")]))
            .await;
        assert_eq!(
            observation,
            "Beijing current weather: Partly cloudy, temperature 12 degrees Celsius"
        );
    }

    #[tokio::test]
    async fn test_dispatch_weather_network_failure() {
        let registry = default_tools(&tools_config(
            closed_port_url().await,
            closed_port_url().await,
            None,
        ));

        let observation = registry
            .dispatch("get_weather", args(&[("city", "Beijing")]))
            .await;
        assert!(observation.starts_with("Error: Network problem encountered when querying weather - "));
    }

    #[tokio::test]
    async fn test_dispatch_missing_argument() {
        let registry = default_tools(&crate::config::Config::default().tools);
        let observation = registry.dispatch("get_weather", ToolArgs::new()).await;
        assert_eq!(observation, "Error: Invalid arguments: missing argument 'city'");
    }

    #[tokio::test]
    async fn test_dispatch_attraction_without_key() {
        let registry = default_tools(&crate::config::Config::default().tools);
        let observation = registry
            .dispatch(
                "get_attraction",
                args(&[("city", "Beijing"), ("weather", "Sunny")]),
            )
            .await;
        assert_eq!(
            observation,
            "Error: TAVILY_API_KEY environment variable not configured."
        );
    }

    #[tokio::test]
    async fn test_dispatch_attraction_against_upstream() {
        let router = Router::new().route(
            "/search",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["api_key"], "tvly-test");
                assert_eq!(body["include_answer"], true);
                assert_eq!(
                    body["query"],
                    "'Beijing' most worthwhile tourist attractions and reasons in 'Sunny' weather"
                );
                Json(serde_json::json!({
                    "answer": null,
                    "results": [{"title": "Temple of Heaven", "content": "Best on clear days", "url": "x"}]
                }))
            }),
        );
        let search_url = spawn_upstream(router).await;
        let registry = default_tools(&tools_config(
            closed_port_url().await,
            search_url,
            Some("tvly-test"),
        ));

        let observation = registry
            .dispatch(
                "get_attraction",
                args(&[("city", "Beijing"), ("weather", "Sunny")]),
            )
            .await;
        assert_eq!(
            observation,
            "Based on search, found the following information for you:\n- Temple of Heaven: Best on clear days"
        );
    }
}
