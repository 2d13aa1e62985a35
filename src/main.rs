use std::path::Path;
use std::sync::Arc;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters,
    model::*, tool, tool_handler, tool_router,
    transport::stdio, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

mod analysis;
mod config;
mod criteria;
mod detect;
mod extract;
mod page;
mod present;
mod prompt;
mod settings;

use analysis::Analyzer;
use config::Config;
use extract::PaperContent;
use page::{Page, PageContext, PageFetcher};

// ── Parameter structs ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
struct PageParams {
    #[schemars(description = "URL of the paper's page")]
    url: String,
    #[schemars(description = "Page HTML as currently rendered. Fetched from the URL when omitted.")]
    html: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SaveSettingsParams {
    #[schemars(description = "Gemini API key (starts with AIza)")]
    api_key: String,
    #[schemars(description = "Relevance criteria as free text")]
    criteria: Option<String>,
    #[schemars(description = "Path to a .txt or .pdf file to read the criteria from instead")]
    criteria_file: Option<String>,
}

// ── Server ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PaperTriageServer {
    tool_router: ToolRouter<Self>,
    config: Arc<Config>,
    fetcher: Arc<PageFetcher>,
    analyzer: Arc<Analyzer>,
}

#[tool_router]
impl PaperTriageServer {
    pub fn create() -> anyhow::Result<Self> {
        let config = Config::from_env();
        let analyzer = config.build_analyzer()?;
        let fetcher = PageFetcher::new()?;

        tracing::info!(
            "Initialized with {} candidate models, data_dir={}",
            analyzer.models().len(),
            config.data_dir.display()
        );

        Ok(Self {
            tool_router: Self::tool_router(),
            config: Arc::new(config),
            fetcher: Arc::new(fetcher),
            analyzer: Arc::new(analyzer),
        })
    }

    #[tool(description = "Show the current configuration: API key status (masked), criteria source, and model fallback order")]
    async fn get_settings(&self) -> Result<CallToolResult, McpError> {
        let status = self.config.status()
            .map_err(|e| McpError::internal_error(format!("Failed to read settings: {}", e), None))?;
        let json = serde_json::to_string_pretty(&status)
            .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Save the Gemini API key and relevance criteria. Criteria can be given inline or read from a text/PDF file.")]
    async fn save_settings(
        &self,
        Parameters(params): Parameters<SaveSettingsParams>,
    ) -> Result<CallToolResult, McpError> {
        let criteria = match params.criteria_file.as_deref() {
            Some(path) => criteria::load_criteria_file(Path::new(path))
                .map_err(|e| McpError::invalid_params(format!("Failed to read criteria: {}", e), None))?,
            None => params.criteria.unwrap_or_default(),
        };

        let saved = self.config.settings_store().save(&params.api_key, &criteria)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "Settings saved successfully! ({} characters of criteria)",
            saved.criteria.chars().count()
        ))]))
    }

    #[tool(description = "Detect the DOI of a paper page from its URL, citation meta tags, or body text")]
    async fn detect_doi(
        &self,
        Parameters(params): Parameters<PageParams>,
    ) -> Result<CallToolResult, McpError> {
        let html = self.page_html(&params).await?;
        let context = Page::parse(&params.url, &html).context();
        let json = serde_json::to_string_pretty(&serde_json::json!({ "doi": context.doi }))
            .map_err(|e| McpError::internal_error(format!("{}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Extract title, abstract, authors, year and full text from a paper page")]
    async fn extract_content(
        &self,
        Parameters(params): Parameters<PageParams>,
    ) -> Result<CallToolResult, McpError> {
        let html = self.page_html(&params).await?;
        let (_, content) = inspect(&params.url, &html);
        let json = serde_json::to_string_pretty(&serde_json::json!({ "content": content }))
            .map_err(|e| McpError::internal_error(format!("{}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Analyze a paper page against the saved criteria with Gemini and return the verdict, confidence, and per-criterion assessment")]
    async fn analyze_paper(
        &self,
        Parameters(params): Parameters<PageParams>,
    ) -> Result<CallToolResult, McpError> {
        let settings = self.config.effective_settings()
            .map_err(|e| McpError::internal_error(format!("Failed to read settings: {}", e), None))?;
        let html = self.page_html(&params).await?;
        let (context, content) = inspect(&params.url, &html);

        match self.analyzer.analyze_paper(&context, &content, &settings).await {
            Ok(verdict) => {
                let rendered = present::present(&verdict);
                let json = serde_json::to_string_pretty(&serde_json::json!({
                    "doi": context.doi,
                    "result": rendered,
                }))
                .map_err(|e| McpError::internal_error(format!("{}", e), None))?;
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Err(e) => {
                tracing::error!("Analysis error for {}: {:?}", context.url, e);
                Ok(CallToolResult::error(vec![Content::text(format!("Error: {}", e))]))
            }
        }
    }
}

impl PaperTriageServer {
    /// Use the caller's HTML when given, otherwise fetch the page.
    async fn page_html(&self, params: &PageParams) -> Result<String, McpError> {
        if let Some(ref html) = params.html {
            return Ok(html.clone());
        }
        self.fetcher.fetch(&params.url).await
            .map_err(|e| McpError::internal_error(format!("Failed to fetch page: {}", e), None))
    }
}

/// Detection and extraction over one parsed page.
fn inspect(url: &str, html: &str) -> (PageContext, PaperContent) {
    let page = Page::parse(url, html);
    let context = page.context();
    let content = extract::extract(page.document());
    (context, content)
}

#[tool_handler]
impl ServerHandler for PaperTriageServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Detect the DOI of a research paper page, extract its bibliographic \
                 content, and score it against your relevance criteria with Google \
                 Gemini. Configure the API key and criteria with save_settings first."
                    .into(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting paper-triage MCP server");

    let server = PaperTriageServer::create()?;
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
