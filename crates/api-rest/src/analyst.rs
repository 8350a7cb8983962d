//! Analyst service endpoints.

use crate::error::{require_username, ApiError, ApiResult};
use api_shared::analyst::{
    ChatReq, ChatRes, ClassifyReq, ClassifyRes, CurrentCaseRes, InitUserReq, InitUserRes,
    MainComplaintRes, NextStepRes, PreviousStepRes, SaveConversationReq, SaveConversationRes,
    SavedConversationQuery, SavedConversationRes, StepReq,
};
use api_shared::{ErrorRes, HealthRes, HealthService, UserQuery, STATUS_SUCCESS};
use axum::{
    extract::{Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use medsim_core::{AppContext, ConversationRecord, CurrentCase, InitOutcome};
use std::sync::Arc;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        get_ai_response,
        next_step,
        previous_step,
        current_case,
        get_main_suit,
        init_user,
        get_saved_conversation,
        save_conversation,
        classify_message,
    ),
    components(schemas(
        ErrorRes,
        HealthRes,
        UserQuery,
        ChatReq,
        ChatRes,
        StepReq,
        NextStepRes,
        PreviousStepRes,
        CurrentCaseRes,
        MainComplaintRes,
        InitUserReq,
        InitUserRes,
        SavedConversationQuery,
        SavedConversationRes,
        SaveConversationReq,
        SaveConversationRes,
        ClassifyReq,
        ClassifyRes,
    ))
)]
pub struct AnalystApiDoc;

pub fn routes() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/health", get(health))
        .route("/get-ai-response", post(get_ai_response))
        .route("/api/next-step", post(next_step))
        .route("/api/previous-step", post(previous_step))
        .route("/current-case", get(current_case))
        .route("/api/get-main-suit", get(get_main_suit))
        .route("/api/init-user", post(init_user))
        .route("/api/get-saved-conversation", get(get_saved_conversation))
        .route("/api/save-conversation", post(save_conversation))
        .route("/classify-message", post(classify_message))
}

pub(crate) fn current_case_res(current: CurrentCase) -> CurrentCaseRes {
    CurrentCaseRes {
        status: STATUS_SUCCESS.into(),
        case_index: current.case_index,
        case_folder: current.case_folder,
        total_cases: current.total_cases,
        case_folders: current.case_folders,
        formatted_data: current.formatted_data,
    }
}

pub(crate) fn init_user_res(outcome: InitOutcome) -> InitUserRes {
    InitUserRes {
        status: STATUS_SUCCESS.into(),
        user_id: outcome.user_id,
        username: outcome.username,
        next_case_index: outcome.next.index,
        total_cases: outcome.total_cases,
        all_complete: outcome.next.all_complete,
        case_folder: outcome.case_folder,
        main_suit: outcome.main_complaint,
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the analyst service
#[axum::debug_handler]
async fn health(State(_ctx): State<Arc<AppContext>>) -> Json<HealthRes> {
    Json(HealthService::check_health(HealthService::ANALYST))
}

#[utoipa::path(
    post,
    path = "/get-ai-response",
    request_body = ChatReq,
    responses(
        (status = 200, description = "Virtual patient reply", body = ChatRes),
        (status = 400, description = "Bad request", body = ErrorRes)
    )
)]
/// Send one analyst message to the virtual patient
///
/// A failing chat service does not fail the request: the reply is a placeholder text and
/// `degraded` is set.
#[axum::debug_handler]
async fn get_ai_response(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<ChatReq>,
) -> ApiResult<ChatRes> {
    let username = require_username(&req.username)?;
    if req.message.trim().is_empty() {
        return Err(ApiError::bad_request("message cannot be empty"));
    }

    let reply = ctx.analyst().chat(&username, req.message).await;
    Ok(Json(ChatRes {
        status: STATUS_SUCCESS.into(),
        reply: reply.reply,
        degraded: reply.degraded,
    }))
}

#[utoipa::path(
    post,
    path = "/api/next-step",
    request_body = StepReq,
    responses(
        (status = 200, description = "Moved to the first unsaved case", body = NextStepRes),
        (status = 400, description = "Bad request", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn next_step(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<StepReq>,
) -> ApiResult<NextStepRes> {
    let username = require_username(&req.username)?;
    let step = ctx.analyst().next_step(&username);

    Ok(Json(NextStepRes {
        status: STATUS_SUCCESS.into(),
        message: "Next step processed successfully".into(),
        next_case_index: step.next.index,
        total_cases: step.total_cases,
        all_complete: step.next.all_complete,
    }))
}

#[utoipa::path(
    post,
    path = "/api/previous-step",
    request_body = StepReq,
    responses(
        (status = 200, description = "Moved back one case", body = PreviousStepRes),
        (status = 400, description = "Already at the first case", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn previous_step(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<StepReq>,
) -> ApiResult<PreviousStepRes> {
    let username = require_username(&req.username)?;
    let index = ctx.analyst().previous_step(&username)?;

    Ok(Json(PreviousStepRes {
        status: STATUS_SUCCESS.into(),
        message: "Previous step processed successfully".into(),
        current_case_index: index,
    }))
}

#[utoipa::path(
    get,
    path = "/current-case",
    params(
        ("username" = String, Query, description = "Analyst username")
    ),
    responses(
        (status = 200, description = "Current case of the session", body = CurrentCaseRes),
        (status = 400, description = "Bad request", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn current_case(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<UserQuery>,
) -> ApiResult<CurrentCaseRes> {
    let username = require_username(&query.username)?;
    Ok(Json(current_case_res(ctx.analyst().current_case(&username))))
}

#[utoipa::path(
    get,
    path = "/api/get-main-suit",
    params(
        ("username" = String, Query, description = "Analyst username")
    ),
    responses(
        (status = 200, description = "Main complaint of the current case", body = MainComplaintRes),
        (status = 404, description = "Case unavailable", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_main_suit(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<UserQuery>,
) -> ApiResult<MainComplaintRes> {
    let username = require_username(&query.username)?;
    let main_suit = ctx.analyst().main_complaint(&username)?;
    Ok(Json(MainComplaintRes {
        status: STATUS_SUCCESS.into(),
        main_suit,
    }))
}

#[utoipa::path(
    post,
    path = "/api/init-user",
    request_body = InitUserReq,
    responses(
        (status = 200, description = "Session placed on the first unsaved case", body = InitUserRes),
        (status = 400, description = "Bad request", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn init_user(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<InitUserReq>,
) -> ApiResult<InitUserRes> {
    let username = require_username(&req.username)?;
    let outcome = ctx.analyst().init_user(&username, req.user_id);
    Ok(Json(init_user_res(outcome)))
}

#[utoipa::path(
    get,
    path = "/api/get-saved-conversation",
    params(
        ("username" = String, Query, description = "Analyst username"),
        ("case_index" = usize, Query, description = "Zero-based case index")
    ),
    responses(
        (status = 200, description = "Saved conversation", body = SavedConversationRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 404, description = "Nothing saved for this case", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_saved_conversation(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<SavedConversationQuery>,
) -> ApiResult<SavedConversationRes> {
    let username = require_username(&query.username)?;
    let case_index = query
        .case_index
        .ok_or_else(|| ApiError::bad_request("case_index is required"))?;

    let saved = ctx.analyst().saved_conversation(&username, case_index)?;
    Ok(Json(SavedConversationRes {
        status: STATUS_SUCCESS.into(),
        conversation: saved.record.conversation,
        diagnosis: saved.record.diagnosis,
        treatment: saved.record.treatment,
        file: saved.file,
    }))
}

#[utoipa::path(
    post,
    path = "/api/save-conversation",
    request_body = SaveConversationReq,
    responses(
        (status = 200, description = "Conversation saved", body = SaveConversationRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 500, description = "Write failed", body = ErrorRes)
    )
)]
/// Save a transcript with its diagnosis and treatment
///
/// Always writes, even for an empty transcript; the saved file marks the case as done.
#[axum::debug_handler]
async fn save_conversation(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<SaveConversationReq>,
) -> ApiResult<SaveConversationRes> {
    let username = require_username(&req.username)?;
    let record = ConversationRecord {
        conversation: req.conversation,
        diagnosis: req.diagnosis,
        treatment: req.treatment,
    };

    let outcome = ctx
        .analyst()
        .save_conversation(&username, req.case_index, &record)?;

    Ok(Json(SaveConversationRes {
        status: STATUS_SUCCESS.into(),
        file: outcome.file,
        case_dir: outcome
            .path
            .parent()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default(),
        case_index: outcome.case_index,
        content_mismatch: outcome.content_mismatch,
    }))
}

#[utoipa::path(
    post,
    path = "/classify-message",
    request_body = ClassifyReq,
    responses(
        (status = 200, description = "Category of the message", body = ClassifyRes),
        (status = 400, description = "Empty message", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn classify_message(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<ClassifyReq>,
) -> ApiResult<ClassifyRes> {
    if req.message.trim().is_empty() {
        return Err(ApiError::bad_request("message cannot be empty"));
    }

    let category = ctx.analyst().classify(&req.message).await;
    Ok(Json(ClassifyRes {
        status: STATUS_SUCCESS.into(),
        category: category.to_string(),
        message: format!("Message classified as: {category}"),
    }))
}
