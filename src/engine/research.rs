// Kilo Engine — Web Research Flow
// Search → fetch → analyze → propose. Turns "learn how to use Canva"
// into a validated API description plus 1–5 proposed skills bound to the
// new integration. Every stage appends a progress entry; any stage
// failure surfaces as a `web_research` error naming the stage.
//
// The web side (search API + page fetching) sits behind the `WebSource`
// trait so the pipeline can be driven hermetically in tests; the real
// implementation rides reqwest with the same SSRF rules as the tool
// executor and a 1 MB streamed body cap.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::{info, warn};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::atoms::constants::*;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::ChatGateway;
use crate::atoms::types::{
    Attribution, AuthKind, ChatMessage, LlmRequest, OutputFormat, TaskType, ToolEndpoint,
    ToolSpec,
};
use crate::engine::tool_http::validate_outbound_url;

// ── Web source port ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// How strongly this looks like API documentation (pattern count).
    pub api_doc_score: u32,
}

#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub url: String,
    pub title: String,
    pub text: String,
    pub code_blocks: Vec<String>,
}

#[async_trait]
pub trait WebSource: Send + Sync {
    async fn search(&self, query: &str) -> EngineResult<Vec<SearchHit>>;
    async fn fetch_page(&self, url: &str) -> EngineResult<FetchedPage>;
}

// ── API-doc scoring ─────────────────────────────────────────────────────

const API_DOC_PATTERNS: &[&str] = &[
    "docs.", "/docs", "developer.", "/developers", "/api", "api.",
    "/reference", "swagger", "openapi", "rest-api", "api-docs",
];

pub fn api_doc_score(url: &str, title: &str) -> u32 {
    let haystack = format!("{} {}", url.to_lowercase(), title.to_lowercase());
    API_DOC_PATTERNS
        .iter()
        .filter(|p| haystack.contains(*p))
        .count() as u32
}

// ── Real web source ─────────────────────────────────────────────────────

pub struct HttpWebSource {
    client: Client,
    search_base_url: String,
    search_api_key: String,
}

impl HttpWebSource {
    pub fn new(search_base_url: String, search_api_key: String) -> Self {
        Self {
            client: Client::new(),
            search_base_url,
            search_api_key,
        }
    }
}

#[async_trait]
impl WebSource for HttpWebSource {
    async fn search(&self, query: &str) -> EngineResult<Vec<SearchHit>> {
        let url = format!(
            "{}?q={}",
            self.search_base_url,
            urlencoding::encode(query)
        );
        let resp = self
            .client
            .get(&url)
            .timeout(SEARCH_TIMEOUT)
            .header("x-subscription-token", &self.search_api_key)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| EngineError::research("search", e.to_string()))?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| EngineError::research("search", e.to_string()))?;

        let results = body["web"]["results"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        Ok(results
            .iter()
            .filter_map(|r| {
                let url = r["url"].as_str()?.to_string();
                let title = r["title"].as_str().unwrap_or_default().to_string();
                Some(SearchHit {
                    api_doc_score: api_doc_score(&url, &title),
                    snippet: r["description"].as_str().unwrap_or_default().to_string(),
                    title,
                    url,
                })
            })
            .collect())
    }

    async fn fetch_page(&self, url: &str) -> EngineResult<FetchedPage> {
        validate_outbound_url(url)?;
        let resp = self
            .client
            .get(url)
            .timeout(PAGE_FETCH_TIMEOUT)
            .header("user-agent", HTTP_USER_AGENT)
            .send()
            .await
            .map_err(|e| EngineError::research("fetch", e.to_string()))?;

        let mut bytes: Vec<u8> = Vec::new();
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| EngineError::research("fetch", e.to_string()))?;
            if bytes.len() + chunk.len() > PAGE_BODY_CAP_BYTES {
                bytes.extend_from_slice(&chunk[..PAGE_BODY_CAP_BYTES - bytes.len()]);
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(extract_page_content(url, &String::from_utf8_lossy(&bytes)))
    }
}

// ── HTML extraction ─────────────────────────────────────────────────────

const STRIPPED_TAGS: &[&str] = &["script", "style", "nav", "footer", "header", "noscript", "svg"];

/// Strip chrome tags, harvest readable text plus `<pre>` and large
/// standalone `<code>` blocks.
pub fn extract_page_content(url: &str, html: &str) -> FetchedPage {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .map(|t| t.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default();

    // Text: every text node whose ancestors avoid the stripped tags.
    let mut text = String::new();
    for node in document.tree.nodes() {
        if let Some(fragment) = node.value().as_text() {
            let excluded = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .map(|e| STRIPPED_TAGS.contains(&e.name()))
                    .unwrap_or(false)
            });
            if !excluded {
                let trimmed = fragment.trim();
                if !trimmed.is_empty() {
                    text.push_str(trimmed);
                    text.push(' ');
                }
            }
        }
    }
    if text.chars().count() > PAGE_TEXT_CAP_CHARS {
        text = text.chars().take(PAGE_TEXT_CAP_CHARS).collect();
    }

    let mut code_blocks: Vec<String> = Vec::new();
    if let Ok(pre) = Selector::parse("pre") {
        for element in document.select(&pre) {
            let code = element.text().collect::<String>().trim().to_string();
            if !code.is_empty() {
                code_blocks.push(code);
            }
        }
    }
    if let Ok(code_sel) = Selector::parse("code") {
        for element in document.select(&code_sel) {
            let inside_pre = element
                .ancestors()
                .any(|a| a.value().as_element().map(|e| e.name() == "pre").unwrap_or(false));
            if inside_pre {
                continue;
            }
            let code = element.text().collect::<String>().trim().to_string();
            // Inline one-liners are noise; keep substantial blocks only.
            if code.chars().count() > 120 {
                code_blocks.push(code);
            }
        }
    }

    FetchedPage {
        url: url.to_string(),
        title,
        text: text.trim().to_string(),
        code_blocks,
    }
}

// ── Analysis output types ───────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ApiInfo {
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    #[serde(rename = "authType", default)]
    pub auth_type_raw: Option<String>,
    #[serde(skip)]
    pub auth_kind: AuthKind,
    #[serde(rename = "authInstructions", default)]
    pub auth_instructions: String,
    #[serde(default)]
    pub endpoints: Vec<ToolEndpoint>,
    #[serde(rename = "rateLimits", default)]
    pub rate_limits: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct LearnedSkillRaw {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "triggerPatterns", default)]
    trigger_patterns: Vec<String>,
    #[serde(rename = "behaviorPrompt", default)]
    behavior_prompt: String,
    #[serde(rename = "outputFormat", default)]
    output_format: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LearnedSkill {
    pub name: String,
    pub description: String,
    pub trigger_patterns: Vec<String>,
    pub behavior_prompt: String,
    pub output_format: OutputFormat,
    pub required_integrations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub service: String,
    pub slug: String,
    pub api_info: ApiInfo,
    pub skills: Vec<LearnedSkill>,
    /// One entry per completed stage, for surfacing progress.
    pub progress: Vec<String>,
}

impl ResearchOutcome {
    /// User-facing summary: base URL, endpoint count, auth instructions,
    /// and the proposed skills.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "I researched **{}** and found its API.\n\n\
             - Base URL: {}\n\
             - Endpoints: {}\n\
             - Auth: {}\n",
            self.service,
            self.api_info.base_url,
            self.api_info.endpoints.len(),
            if self.api_info.auth_instructions.is_empty() {
                "see provider documentation".to_string()
            } else {
                self.api_info.auth_instructions.clone()
            },
        );
        if let Some(limits) = &self.api_info.rate_limits {
            out.push_str(&format!("- Rate limits: {}\n", limits));
        }
        out.push_str("\nProposed skills:\n");
        for skill in &self.skills {
            out.push_str(&format!("- **{}** — {}\n", skill.name, skill.description));
        }
        out.push_str("\nSay the word and I'll set these up once you add credentials.");
        out
    }
}

/// Slug a service name: lowercase alphanumeric runs joined by `_`.
pub fn service_slug(service: &str) -> String {
    service
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<&str>>()
        .join("_")
}

// ── Validation ──────────────────────────────────────────────────────────

/// Normalize and validate the analysis output. Rejects an empty base URL
/// or endpoint list; repairs everything else.
pub fn validate_api_info(mut info: ApiInfo) -> EngineResult<ApiInfo> {
    if info.base_url.trim().is_empty() {
        return Err(EngineError::research("analyze", "empty base URL"));
    }
    if info.endpoints.is_empty() {
        return Err(EngineError::research("analyze", "no endpoints extracted"));
    }
    info.base_url = info.base_url.trim().trim_end_matches('/').to_string();
    for endpoint in &mut info.endpoints {
        endpoint.method = endpoint.method.to_uppercase();
    }
    info.confidence = info.confidence.clamp(0.0, 1.0);
    info.auth_kind = match info.auth_type_raw.as_deref() {
        Some("api_key") => AuthKind::ApiKey,
        Some("bearer") => AuthKind::Bearer,
        Some("oauth2") => AuthKind::Oauth2,
        Some("custom_header") => AuthKind::CustomHeader,
        // Unknown auth schemes degrade to bearer.
        _ => AuthKind::Bearer,
    };
    Ok(info)
}

// ── Flow ────────────────────────────────────────────────────────────────

pub struct ResearchFlow {
    web: Arc<dyn WebSource>,
    gateway: Arc<dyn ChatGateway>,
}

impl ResearchFlow {
    pub fn new(web: Arc<dyn WebSource>, gateway: Arc<dyn ChatGateway>) -> Self {
        Self { web, gateway }
    }

    /// Run the four stages for a service. `query` is the search text
    /// (usually "<service> API"); `service` is the display name.
    pub async fn run(
        &self,
        service: &str,
        query: &str,
        attribution: &Attribution,
    ) -> EngineResult<ResearchOutcome> {
        let mut progress: Vec<String> = Vec::new();

        // Stage 1 — search.
        let mut hits = self.web.search(query).await?;
        if hits.is_empty() {
            return Err(EngineError::research("search", "no results"));
        }
        // API-doc-scored hits first, preserving engine order within ties.
        hits.sort_by(|a, b| b.api_doc_score.cmp(&a.api_doc_score));
        progress.push(format!("search: {} results", hits.len()));
        info!("[research] search '{}' → {} hits", query, hits.len());

        // Stage 2 — fetch top pages, ≤3 in flight.
        let top: Vec<SearchHit> = hits.into_iter().take(RESEARCH_MAX_PAGES).collect();
        let web = Arc::clone(&self.web);
        let pages: Vec<FetchedPage> = stream::iter(top)
            .map(|hit| {
                let web = Arc::clone(&web);
                async move {
                    match web.fetch_page(&hit.url).await {
                        Ok(page) => Some(page),
                        Err(e) => {
                            warn!("[research] fetch {} failed: {}", hit.url, e);
                            None
                        }
                    }
                }
            })
            .buffer_unordered(RESEARCH_FETCH_CONCURRENCY)
            .collect::<Vec<Option<FetchedPage>>>()
            .await
            .into_iter()
            .flatten()
            .filter(|p| !p.text.is_empty())
            .collect();
        if pages.is_empty() {
            return Err(EngineError::research("fetch", "no pages fetched"));
        }
        progress.push(format!("fetch: {} pages", pages.len()));

        // Stage 3 — analyze.
        let api_info = self.analyze(service, &pages, attribution).await?;
        progress.push(format!("analyze: {} endpoints", api_info.endpoints.len()));

        // Stage 4 — propose skills.
        let slug = service_slug(service);
        let skills = self.propose_skills(service, &slug, &api_info, attribution).await?;
        progress.push(format!("propose: {} skills", skills.len()));

        Ok(ResearchOutcome {
            service: service.to_string(),
            slug,
            api_info,
            skills,
            progress,
        })
    }

    async fn analyze(
        &self,
        service: &str,
        pages: &[FetchedPage],
        attribution: &Attribution,
    ) -> EngineResult<ApiInfo> {
        let mut corpus = String::new();
        for page in pages {
            let header = if page.title.is_empty() { &page.url } else { &page.title };
            let section = format!("## {}\n{}\n\n", header, page.text);
            let remaining = ANALYSIS_TEXT_CAP_CHARS.saturating_sub(corpus.chars().count());
            if remaining == 0 {
                break;
            }
            corpus.extend(section.chars().take(remaining));
        }
        let code_blocks: Vec<&String> = pages
            .iter()
            .flat_map(|p| p.code_blocks.iter())
            .take(RESEARCH_MAX_CODE_BLOCKS)
            .collect();
        let mut prompt = format!(
            "Documentation gathered for the {} API follows. Extract its base URL, \
             authentication scheme, and endpoint catalog.\n\n{}",
            service, corpus
        );
        if !code_blocks.is_empty() {
            prompt.push_str("\n\n## Code Examples\n");
            for block in code_blocks {
                prompt.push_str("```\n");
                prompt.push_str(block);
                prompt.push_str("\n```\n");
            }
        }

        let request = LlmRequest {
            task_type: TaskType::DocExtraction,
            system: "You extract structured API descriptions from documentation. \
                     Use the output_api_info tool exactly once."
                .into(),
            messages: vec![ChatMessage::user(prompt)],
            tools: vec![output_api_info_tool()],
            max_tokens: None,
            temperature: None,
        };
        let response = self
            .gateway
            .complete(request, attribution)
            .await
            .map_err(|e| EngineError::research("analyze", e.to_string()))?;

        let call = response
            .tool_calls
            .iter()
            .find(|c| c.name == "output_api_info")
            .ok_or_else(|| EngineError::research("analyze", "model returned no api info"))?;
        let info: ApiInfo = serde_json::from_value(call.arguments.clone())
            .map_err(|e| EngineError::research("analyze", format!("bad api info: {}", e)))?;
        validate_api_info(info)
    }

    async fn propose_skills(
        &self,
        service: &str,
        slug: &str,
        api_info: &ApiInfo,
        attribution: &Attribution,
    ) -> EngineResult<Vec<LearnedSkill>> {
        let catalog: Vec<String> = api_info
            .endpoints
            .iter()
            .map(|e| format!("{} {} — {}", e.method, e.path, e.description))
            .collect();
        let request = LlmRequest {
            task_type: TaskType::SkillGeneration,
            system: "You design assistant skills around a newly learned API. \
                     Use the output_skills tool exactly once with 1 to 5 skills."
                .into(),
            messages: vec![ChatMessage::user(format!(
                "Service: {}\nBase URL: {}\nEndpoints:\n{}",
                service,
                api_info.base_url,
                catalog.join("\n")
            ))],
            tools: vec![output_skills_tool()],
            max_tokens: None,
            temperature: None,
        };
        let response = self
            .gateway
            .complete(request, attribution)
            .await
            .map_err(|e| EngineError::research("propose", e.to_string()))?;

        let call = response
            .tool_calls
            .iter()
            .find(|c| c.name == "output_skills")
            .ok_or_else(|| EngineError::research("propose", "model returned no skills"))?;
        let raw: Vec<LearnedSkillRaw> =
            serde_json::from_value(call.arguments["skills"].clone())
                .map_err(|e| EngineError::research("propose", format!("bad skills: {}", e)))?;
        if raw.is_empty() {
            return Err(EngineError::research("propose", "empty skill list"));
        }

        Ok(raw
            .into_iter()
            .take(5)
            .map(|skill| LearnedSkill {
                name: skill.name,
                description: skill.description,
                trigger_patterns: skill.trigger_patterns,
                behavior_prompt: skill.behavior_prompt,
                output_format: match skill.output_format.as_deref() {
                    Some("structured_card") => OutputFormat::StructuredCard,
                    Some("notification") => OutputFormat::Notification,
                    Some("action") => OutputFormat::Action,
                    _ => OutputFormat::Text,
                },
                required_integrations: vec![slug.to_string()],
            })
            .collect())
    }
}

// ── Tool schemas ────────────────────────────────────────────────────────

fn output_api_info_tool() -> ToolSpec {
    ToolSpec {
        name: "output_api_info".into(),
        description: "Report the extracted API description".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "baseUrl": { "type": "string" },
                "authType": { "type": "string", "enum": ["api_key", "bearer", "oauth2", "custom_header"] },
                "authInstructions": { "type": "string" },
                "endpoints": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "path": { "type": "string" },
                            "method": { "type": "string" },
                            "description": { "type": "string" },
                            "parameters": { "type": "object" }
                        },
                        "required": ["path", "method", "description"]
                    }
                },
                "rateLimits": { "type": "string" },
                "confidence": { "type": "number", "minimum": 0, "maximum": 1 }
            },
            "required": ["baseUrl", "authType", "endpoints", "confidence"]
        }),
    }
}

fn output_skills_tool() -> ToolSpec {
    ToolSpec {
        name: "output_skills".into(),
        description: "Report 1-5 proposed skills for the learned API".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "skills": {
                    "type": "array",
                    "minItems": 1,
                    "maxItems": 5,
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "description": { "type": "string" },
                            "triggerPatterns": { "type": "array", "items": { "type": "string" } },
                            "behaviorPrompt": { "type": "string" },
                            "outputFormat": { "type": "string", "enum": ["text", "structured_card", "notification", "action"] }
                        },
                        "required": ["name", "description", "triggerPatterns", "behaviorPrompt"]
                    }
                }
            },
            "required": ["skills"]
        }),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::LlmResponse;
    use parking_lot::Mutex;

    #[test]
    fn slug_normalizes() {
        assert_eq!(service_slug("Canva"), "canva");
        assert_eq!(service_slug("Google Sheets v4!"), "google_sheets_v4");
    }

    #[test]
    fn api_doc_scoring_prefers_doc_urls() {
        assert!(api_doc_score("https://docs.stripe.com/api", "API Reference") > 0);
        assert!(api_doc_score("https://developer.spotify.com/reference", "Web API") > 0);
        assert_eq!(api_doc_score("https://example.com/blog", "A blog post"), 0);
    }

    #[test]
    fn html_extraction_strips_chrome_and_harvests_code() {
        let html = r#"
            <html><head><title>Canva API Docs</title>
            <script>var tracking = "secret";</script>
            <style>.x { color: red }</style></head>
            <body>
              <nav>Home | Pricing</nav>
              <h1>Getting started</h1>
              <p>Authenticate with a bearer token.</p>
              <pre>curl https://api.canva.com/v1/designs -H "Authorization: Bearer TOKEN"</pre>
              <footer>© Canva</footer>
            </body></html>"#;
        let page = extract_page_content("https://docs.canva.com", html);
        assert_eq!(page.title, "Canva API Docs");
        assert!(page.text.contains("Authenticate with a bearer token."));
        assert!(!page.text.contains("tracking"));
        assert!(!page.text.contains("Pricing"));
        assert!(!page.text.contains("© Canva"));
        assert_eq!(page.code_blocks.len(), 1);
        assert!(page.code_blocks[0].contains("curl"));
    }

    #[test]
    fn api_info_validation_normalizes() {
        let info = ApiInfo {
            base_url: "https://api.canva.com/".into(),
            auth_type_raw: Some("magic_beans".into()),
            auth_kind: AuthKind::Bearer,
            auth_instructions: "Create a token in settings".into(),
            endpoints: vec![ToolEndpoint {
                path: "/v1/designs".into(),
                method: "get".into(),
                description: "List designs".into(),
                parameters: json!({}),
                response_schema: None,
            }],
            rate_limits: None,
            confidence: 3.2,
        };
        let info = validate_api_info(info).unwrap();
        assert_eq!(info.base_url, "https://api.canva.com");
        assert_eq!(info.endpoints[0].method, "GET");
        assert_eq!(info.confidence, 1.0);
        assert_eq!(info.auth_kind, AuthKind::Bearer);
    }

    #[test]
    fn api_info_validation_rejects_empty() {
        let empty_url = ApiInfo {
            base_url: "  ".into(),
            auth_type_raw: None,
            auth_kind: AuthKind::Bearer,
            auth_instructions: String::new(),
            endpoints: vec![],
            rate_limits: None,
            confidence: 0.5,
        };
        assert!(validate_api_info(empty_url).is_err());
    }

    // ── Hermetic flow test ──────────────────────────────────────────────

    struct FakeWeb;

    #[async_trait]
    impl WebSource for FakeWeb {
        async fn search(&self, _query: &str) -> EngineResult<Vec<SearchHit>> {
            Ok(vec![
                SearchHit {
                    title: "Canva Blog".into(),
                    url: "https://canva.com/blog".into(),
                    snippet: String::new(),
                    api_doc_score: api_doc_score("https://canva.com/blog", "Canva Blog"),
                },
                SearchHit {
                    title: "Canva API Reference".into(),
                    url: "https://docs.canva.com/api".into(),
                    snippet: String::new(),
                    api_doc_score: api_doc_score("https://docs.canva.com/api", "Canva API Reference"),
                },
            ])
        }

        async fn fetch_page(&self, url: &str) -> EngineResult<FetchedPage> {
            Ok(FetchedPage {
                url: url.to_string(),
                title: "Canva API Reference".into(),
                text: "Use bearer tokens. GET /v1/designs lists designs.".into(),
                code_blocks: vec!["curl https://api.canva.com/v1/designs".into()],
            })
        }
    }

    struct ScriptedGateway {
        calls: Mutex<Vec<TaskType>>,
    }

    #[async_trait]
    impl ChatGateway for ScriptedGateway {
        async fn complete(
            &self,
            request: LlmRequest,
            _attribution: &Attribution,
        ) -> EngineResult<LlmResponse> {
            self.calls.lock().push(request.task_type);
            let tool_call = match request.task_type {
                TaskType::DocExtraction => crate::atoms::types::LlmToolCall {
                    name: "output_api_info".into(),
                    arguments: json!({
                        "baseUrl": "https://api.canva.com/",
                        "authType": "bearer",
                        "authInstructions": "Create a token under Settings → API",
                        "endpoints": [
                            {"path": "/v1/designs", "method": "get", "description": "List designs"},
                            {"path": "/v1/designs", "method": "post", "description": "Create a design"}
                        ],
                        "confidence": 0.8
                    }),
                },
                _ => crate::atoms::types::LlmToolCall {
                    name: "output_skills".into(),
                    arguments: json!({
                        "skills": [{
                            "name": "Design Browser",
                            "description": "Browse Canva designs",
                            "triggerPatterns": ["show my designs", "list canva designs"],
                            "behaviorPrompt": "Fetch and summarize the user's designs."
                        }]
                    }),
                },
            };
            Ok(LlmResponse {
                content: String::new(),
                tool_calls: vec![tool_call],
                model: "claude-sonnet-4".into(),
                provider: "anthropic".into(),
                prompt_tokens: 10,
                completion_tokens: 10,
                latency_ms: 1,
                thinking_summary: None,
            })
        }
    }

    #[tokio::test]
    async fn full_flow_produces_outcome() {
        let gateway = Arc::new(ScriptedGateway { calls: Mutex::new(vec![]) });
        let flow = ResearchFlow::new(Arc::new(FakeWeb), Arc::clone(&gateway) as Arc<dyn ChatGateway>);
        let outcome = flow
            .run("Canva", "Canva API", &Attribution::default())
            .await
            .unwrap();

        assert_eq!(outcome.slug, "canva");
        assert_eq!(outcome.api_info.base_url, "https://api.canva.com");
        assert_eq!(outcome.api_info.endpoints.len(), 2);
        assert_eq!(outcome.api_info.endpoints[0].method, "GET");
        assert_eq!(outcome.skills.len(), 1);
        assert_eq!(outcome.skills[0].required_integrations, vec!["canva"]);
        assert_eq!(outcome.progress.len(), 4);

        let summary = outcome.summary();
        assert!(summary.contains("https://api.canva.com"));
        assert!(summary.contains("Endpoints: 2"));
        assert!(summary.contains("Settings → API"));

        // doc_extraction then skill_generation, one call each.
        let calls = gateway.calls.lock();
        assert_eq!(*calls, vec![TaskType::DocExtraction, TaskType::SkillGeneration]);
    }
}
