//! # API REST
//!
//! REST surface of MedSim.
//!
//! Handles:
//! - the analyst service (virtual patient interviews)
//! - the evaluation service (scoring recorded conversations)
//! - OpenAPI/Swagger documentation and CORS
//!
//! Both services share one [`AppContext`]; each can be served on its own address or merged into
//! a single router.

#![warn(rust_2018_idioms)]

pub mod analyst;
pub mod env;
pub mod evaluation;
mod error;

pub use error::{ApiError, ApiResult};

use analyst::AnalystApiDoc;
use axum::Router;
use evaluation::EvaluationApiDoc;
use medsim_core::AppContext;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const SWAGGER_PATH: &str = "/swagger-ui";
const OPENAPI_PATH: &str = "/api-docs/openapi.json";

fn finish(
    routes: Router<Arc<AppContext>>,
    doc: utoipa::openapi::OpenApi,
    ctx: Arc<AppContext>,
) -> Router {
    routes
        .merge(SwaggerUi::new(SWAGGER_PATH).url(OPENAPI_PATH, doc))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Router of the analyst service.
pub fn analyst_app(ctx: Arc<AppContext>) -> Router {
    finish(analyst::routes(), AnalystApiDoc::openapi(), ctx)
}

/// Router of the evaluation service.
pub fn evaluation_app(ctx: Arc<AppContext>) -> Router {
    finish(evaluation::routes(), EvaluationApiDoc::openapi(), ctx)
}

/// Both services on one router, with a single merged OpenAPI document.
pub fn combined_app(ctx: Arc<AppContext>) -> Router {
    let mut doc = AnalystApiDoc::openapi();
    doc.merge(EvaluationApiDoc::openapi());
    finish(analyst::routes().merge(evaluation::routes()), doc, ctx)
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use medsim_core::{AppContext, ChatMessage, CoreConfig, ReplyError, ReplyGenerator};
    use serde_json::{json, Value};
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    /// Reply generator returning a fixed answer, or failing every call.
    pub struct ScriptedReplies {
        reply: Option<String>,
    }

    impl ScriptedReplies {
        pub fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_owned()),
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self { reply: None })
        }
    }

    #[async_trait]
    impl ReplyGenerator for ScriptedReplies {
        async fn generate_reply(&self, _messages: &[ChatMessage]) -> Result<String, ReplyError> {
            self.reply
                .clone()
                .ok_or_else(|| ReplyError::Request("connection refused".into()))
        }
    }

    /// Write `case1..caseN` under `<root>/conversations`, one per main complaint.
    pub fn seed_cases(root: &Path, complaints: &[&str]) {
        for (i, complaint) in complaints.iter().enumerate() {
            let name = format!("case{}", i + 1);
            let dir = root.join("conversations").join(&name);
            fs::create_dir_all(&dir).unwrap();
            let doc = json!({
                "prompt1": "You are a patient.",
                "prompt2": format!("Narrative {}", i + 1),
                "prompt3": {"BP": "120/80"},
                "personal_message": "Female, 40",
                "main_suit": complaint,
                "Reference_Diagnostic": format!("Diagnosis {}", i + 1),
                "Reference_Treatment": format!("Treatment {}", i + 1),
            });
            fs::write(dir.join(format!("{name}.json")), doc.to_string()).unwrap();
        }
    }

    pub fn context(root: &Path, replies: Arc<ScriptedReplies>) -> Arc<AppContext> {
        let cfg = Arc::new(CoreConfig::new(
            root.join("conversations"),
            root.join("evaluators"),
        ));
        Arc::new(AppContext::new(cfg, replies))
    }

    pub fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub async fn body_json(res: Response) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }
}
