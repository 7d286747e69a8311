//! Chat page and question API.
//!
//! - `GET  /`            question form with the sidebar metric and info panels
//! - `POST /consultar`   form submit; renders the outcome inline
//! - `POST /api/v1/ask`  same request as JSON, answers with the full request report

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use estoque_agent::{AgentRuntime, RequestOutcome, RequestReport};
use estoque_core::config::AppConfig;
use estoque_core::errors::{ApplicationError, InterfaceError};
use pulldown_cmark::{html, Event, Options, Parser};
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

const PAGE_TEMPLATE: &str = "chat/index.html";

pub const EXAMPLE_QUESTIONS: [&str; 3] = [
    "Qual produto vende mais?",
    "Quais produtos estão em estoque?",
    "Quantas unidades de caneta azul temos?",
];

#[derive(Clone)]
pub struct ChatState {
    runtime: Arc<AgentRuntime>,
    templates: Arc<Tera>,
    page: PageInfo,
    last_elapsed_secs: Arc<RwLock<Option<f64>>>,
}

/// Static sidebar content.
#[derive(Clone, Debug, Serialize)]
pub struct PageInfo {
    pub title: &'static str,
    pub provider: &'static str,
    pub model: String,
    pub max_iterations: Option<u32>,
    pub max_execution_secs: Option<u64>,
    pub fallback_enabled: bool,
    pub examples: Vec<&'static str>,
}

impl PageInfo {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            title: "Consulta de Estoque",
            provider: config.llm.provider.as_str(),
            model: config.llm.model.clone(),
            max_iterations: config.agent.max_iterations,
            max_execution_secs: config.agent.max_execution_secs,
            fallback_enabled: config.agent.fallback_enabled,
            examples: EXAMPLE_QUESTIONS.to_vec(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AskForm {
    #[serde(default)]
    pub pergunta: String,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

/// API failure that happens before a request report exists.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.0.to_string(),
            message: self.0.user_message().to_string(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status_for(&self.0), Json(body)).into_response()
    }
}

impl ChatState {
    pub fn new(runtime: Arc<AgentRuntime>, templates: Arc<Tera>, page: PageInfo) -> Self {
        Self { runtime, templates, page, last_elapsed_secs: Arc::new(RwLock::new(None)) }
    }

    async fn record(&self, report: &RequestReport) {
        *self.last_elapsed_secs.write().await = Some(report.elapsed_secs());
    }

    async fn render(
        &self,
        question: &str,
        report: Option<&RequestReport>,
    ) -> Result<Html<String>, (StatusCode, Html<String>)> {
        let mut page = serde_json::to_value(&self.page).unwrap_or_default();
        let last_elapsed_secs = *self.last_elapsed_secs.read().await;
        page["last_elapsed_secs"] = last_elapsed_secs.into();

        let mut context = Context::new();
        context.insert("page", &page);
        context.insert("question", question);
        if let Some(report) = report {
            context.insert("outcome", &report.outcome);
            context.insert("correlation_id", &report.correlation_id);
            if let RequestOutcome::Answer { text } = &report.outcome {
                context.insert("answer_html", &render_markdown(text));
            }
        }

        self.templates.render(PAGE_TEMPLATE, &context).map(Html).map_err(|render_error| {
            let correlation_id = report.map_or("page", |report| report.correlation_id.as_str());
            let interface = ApplicationError::Configuration(render_error.to_string())
                .into_interface(correlation_id);
            error!(
                event_name = "chat.page.render_failed",
                correlation_id = %interface.correlation_id(),
                error = %render_error,
                "chat page could not be rendered"
            );
            error_page(&interface)
        })
    }
}

pub fn init_templates() -> Arc<Tera> {
    let mut tera = Tera::default();
    if let Err(template_error) =
        tera.add_raw_template(PAGE_TEMPLATE, include_str!("../../../templates/chat/index.html"))
    {
        error!(error = %template_error, "embedded chat template failed to parse");
    }
    Arc::new(tera)
}

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/consultar", post(consultar))
        .route("/api/v1/ask", post(ask))
        .with_state(state)
}

pub async fn index(
    State(state): State<ChatState>,
) -> Result<Html<String>, (StatusCode, Html<String>)> {
    state.render("", None).await
}

pub async fn consultar(
    State(state): State<ChatState>,
    form: Result<Form<AskForm>, FormRejection>,
) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let Form(form) = form.map_err(|rejection| {
        let interface = rejected(rejection.body_text(), "chat.form.rejected");
        error_page(&interface)
    })?;
    let report = state.runtime.handle(&form.pergunta).await;
    state.record(&report).await;
    info!(
        event_name = "chat.form.answered",
        correlation_id = %report.correlation_id,
        outcome = report.outcome.kind(),
        "form question answered"
    );
    state.render(&form.pergunta, Some(&report)).await
}

/// Every request outcome, warnings and errors included, is a 200 with the report body.
pub async fn ask(
    State(state): State<ChatState>,
    request: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<RequestReport>, ApiError> {
    let Json(request) = request
        .map_err(|rejection| ApiError(rejected(rejection.body_text(), "chat.api.rejected")))?;
    let report = state.runtime.handle(&request.question).await;
    state.record(&report).await;
    info!(
        event_name = "chat.api.answered",
        correlation_id = %report.correlation_id,
        outcome = report.outcome.kind(),
        "api question answered"
    );
    Ok(Json(report))
}

fn rejected(detail: String, event_name: &'static str) -> InterfaceError {
    let interface =
        ApplicationError::InvalidRequest(detail).into_interface(Uuid::new_v4().to_string());
    warn!(
        event_name = event_name,
        correlation_id = %interface.correlation_id(),
        error = %interface,
        "request body rejected"
    );
    interface
}

/// CommonMark to HTML. Raw HTML in the model output is escaped, not passed through.
pub fn render_markdown(text: &str) -> String {
    let parser = Parser::new_ext(text, Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES)
        .map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            other => other,
        });
    let mut rendered = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut rendered, parser);
    rendered
}

fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_page(error: &InterfaceError) -> (StatusCode, Html<String>) {
    let status = status_for(error);
    let body = format!(
        "<h1>Erro</h1><p>{}</p><p><small>id: {}</small></p>",
        error.user_message(),
        error.correlation_id()
    );
    (status, Html(body))
}
