//! Evaluation service endpoints, all under `/api/evaluation`.

use crate::analyst::{current_case_res, init_user_res};
use crate::error::{require_username, to_json, ApiError, ApiResult};
use api_shared::analyst::{CurrentCaseRes, InitUserReq, InitUserRes, MainComplaintRes};
use api_shared::evaluation::{
    AnswerQuery, AnswerRes, CaseEvaluatorsRes, CaseFilterQuery, CaseReq, CaseStateQuery,
    CaseStateRes, CreateEvaluatorRes, DimensionRes, DimensionScoreReq, EligibilityRes,
    EvaluationHealthRes, EvaluatorDataRes, EvaluatorUserReq, FeedbackReq, FeedbackRes,
    NavigateReq, NavigateRes, RankingPair, RankingRes, RecordedConversationRes, ResultsRes,
    SaveCaseStateReq, SaveCaseStateRes, SaveRankingReq, ScoresRes, SubmitReq,
};
use api_shared::{ErrorRes, HealthService, MessageRes, UserQuery, STATUS_SUCCESS};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use medsim_core::{AppContext, CaseEvaluation, Direction, EvaluatorScores, Username};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        create_user,
        init_user,
        navigate,
        current_case,
        get_main_suit,
        get_answer,
        submit,
        feedback,
        user_results,
        health,
        evaluator_data,
        dimensions,
        save_dimension_score,
        get_user_scores,
        initialize_case,
        save_ranking,
        get_ranking,
        save_case_state,
        check_submission_eligibility,
        get_case_state,
        case_evaluators,
    ),
    components(schemas(
        ErrorRes,
        MessageRes,
        EvaluatorUserReq,
        CreateEvaluatorRes,
        NavigateReq,
        NavigateRes,
        AnswerQuery,
        AnswerRes,
        SubmitReq,
        FeedbackReq,
        FeedbackRes,
        ResultsRes,
        DimensionScoreReq,
        CaseFilterQuery,
        ScoresRes,
        CaseReq,
        SaveRankingReq,
        RankingPair,
        RankingRes,
        SaveCaseStateReq,
        SaveCaseStateRes,
        EligibilityRes,
        CaseStateQuery,
        CaseStateRes,
        EvaluatorDataRes,
        RecordedConversationRes,
        CaseEvaluatorsRes,
        DimensionRes,
        EvaluationHealthRes,
    ))
)]
pub struct EvaluationApiDoc;

pub fn routes() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/api/evaluation/create-user", post(create_user))
        .route("/api/evaluation/init-user", post(init_user))
        .route("/api/evaluation/navigate", post(navigate))
        .route("/api/evaluation/current-case", get(current_case))
        .route("/api/evaluation/get-main-suit", get(get_main_suit))
        .route("/api/evaluation/get-answer", get(get_answer))
        .route("/api/evaluation/submit", post(submit))
        .route("/api/evaluation/feedback", post(feedback))
        .route("/api/evaluation/user/:username/results", get(user_results))
        .route("/api/evaluation/health", get(health))
        .route(
            "/api/evaluation/case/:case_id/evaluator/:evaluator_id",
            get(evaluator_data),
        )
        .route("/api/evaluation/dimensions", get(dimensions))
        .route("/api/evaluation/save-dimension-score", post(save_dimension_score))
        .route("/api/evaluation/get-user-scores", get(get_user_scores))
        .route("/api/evaluation/initialize-case", post(initialize_case))
        .route("/api/evaluation/save-ranking", post(save_ranking))
        .route("/api/evaluation/get-ranking", get(get_ranking))
        .route("/api/evaluation/save-case-state", post(save_case_state))
        .route(
            "/api/evaluation/check-submission-eligibility",
            get(check_submission_eligibility),
        )
        .route("/api/evaluation/get-case-state", get(get_case_state))
        .route("/api/evaluation/case/:case_id/evaluators", get(case_evaluators))
}

/// Decode each entry of a JSON object into `T`, naming the key that failed.
fn decode_entries<T: DeserializeOwned>(
    entries: Map<String, Value>,
    what: &str,
) -> Result<BTreeMap<String, T>, ApiError> {
    entries
        .into_iter()
        .map(|(key, value)| {
            serde_json::from_value(value)
                .map(|decoded| (key.clone(), decoded))
                .map_err(|e| ApiError::bad_request(format!("invalid {what} for '{key}': {e}")))
        })
        .collect()
}

fn require_case_id(raw: &str) -> Result<&str, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request("case_id is required"));
    }
    Ok(trimmed)
}

#[utoipa::path(
    post,
    path = "/api/evaluation/create-user",
    request_body = EvaluatorUserReq,
    responses(
        (status = 200, description = "Record created or refreshed", body = CreateEvaluatorRes),
        (status = 400, description = "Bad request", body = ErrorRes)
    )
)]
/// Create an evaluator record, or refresh it when it already exists
#[axum::debug_handler]
async fn create_user(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<EvaluatorUserReq>,
) -> ApiResult<CreateEvaluatorRes> {
    let username = require_username(&req.username)?;
    let outcome = ctx.evaluator().create_user(&username)?;

    Ok(Json(CreateEvaluatorRes {
        status: STATUS_SUCCESS.into(),
        message: if outcome.created {
            "evaluator record created".into()
        } else {
            "evaluator record already existed; updated".into()
        },
        username: username.to_string(),
        created: outcome.created,
        user_file: outcome.path.display().to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/evaluation/init-user",
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
    let outcome = ctx.evaluator().init_user(&username, req.user_id)?;
    Ok(Json(init_user_res(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/evaluation/navigate",
    request_body = NavigateReq,
    responses(
        (status = 200, description = "Moved one case", body = NavigateRes),
        (status = 400, description = "At a boundary or invalid direction", body = ErrorRes),
        (status = 404, description = "No cases or target case unavailable", body = ErrorRes)
    )
)]
/// Step one case forwards or backwards
#[axum::debug_handler]
async fn navigate(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<NavigateReq>,
) -> ApiResult<NavigateRes> {
    let username = require_username(&req.username)?;
    let direction = Direction::parse(req.direction.trim())
        .ok_or_else(|| ApiError::bad_request(format!("invalid direction '{}'", req.direction)))?;

    let moved = ctx.evaluator().navigate(&username, direction)?;
    Ok(Json(NavigateRes {
        status: STATUS_SUCCESS.into(),
        message: format!("moved to case {}", moved.current_index + 1),
        direction: req.direction.trim().to_owned(),
        previous_index: moved.previous_index,
        current_index: moved.current_index,
        total_cases: moved.total_cases,
        case_name: moved.case_name,
    }))
}

#[utoipa::path(
    get,
    path = "/api/evaluation/current-case",
    params(
        ("username" = String, Query, description = "Evaluator username")
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
    Ok(Json(current_case_res(ctx.evaluator().current_case(&username))))
}

#[utoipa::path(
    get,
    path = "/api/evaluation/get-main-suit",
    params(
        ("username" = String, Query, description = "Evaluator username")
    ),
    responses(
        (status = 200, description = "Main complaint of the current case", body = MainComplaintRes),
        (status = 404, description = "No main complaint", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_main_suit(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<UserQuery>,
) -> ApiResult<MainComplaintRes> {
    let username = require_username(&query.username)?;
    let main_suit = ctx.evaluator().main_complaint(&username)?;
    Ok(Json(MainComplaintRes {
        status: STATUS_SUCCESS.into(),
        main_suit,
    }))
}

#[utoipa::path(
    get,
    path = "/api/evaluation/get-answer",
    params(
        ("username" = String, Query, description = "Evaluator username"),
        ("force_refresh" = Option<bool>, Query, description = "Re-read the case document first")
    ),
    responses(
        (status = 200, description = "Reference answer", body = AnswerRes),
        (status = 404, description = "Case unavailable", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_answer(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<AnswerQuery>,
) -> ApiResult<AnswerRes> {
    let username = require_username(&query.username)?;
    let answer = ctx
        .evaluator()
        .reference_answer(&username, query.force_refresh)?;

    Ok(Json(AnswerRes {
        status: STATUS_SUCCESS.into(),
        diagnostic: answer.diagnosis,
        treatment: answer.treatment,
        original_case: answer.original_case,
    }))
}

#[utoipa::path(
    post,
    path = "/api/evaluation/submit",
    request_body = SubmitReq,
    responses(
        (status = 200, description = "Submission merged", body = MessageRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 404, description = "Unknown evaluator", body = ErrorRes)
    )
)]
/// Merge the final submission into the evaluator's record
#[axum::debug_handler]
async fn submit(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<SubmitReq>,
) -> ApiResult<MessageRes> {
    let username = require_username(&req.username)?;
    let results: BTreeMap<String, CaseEvaluation> =
        decode_entries(req.evaluation_results, "case evaluation")?;

    ctx.evaluator().submit(&username, results)?;
    Ok(Json(MessageRes::success("evaluation submitted")))
}

#[utoipa::path(
    post,
    path = "/api/evaluation/feedback",
    request_body = FeedbackReq,
    responses(
        (status = 200, description = "Feedback saved", body = FeedbackRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 404, description = "Unknown evaluator", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn feedback(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<FeedbackReq>,
) -> ApiResult<FeedbackRes> {
    let username = require_username(&req.username)?;
    let case_id = req.case_id.as_text();
    let case = medsim_core::parse_case_id(require_case_id(&case_id)?)?;

    ctx.evaluator()
        .save_feedback(&username, case.name(), &req.evaluator_id, req.feedback)?;

    Ok(Json(FeedbackRes {
        status: STATUS_SUCCESS.into(),
        message: "feedback saved".into(),
        username: username.to_string(),
        case_id: case.name().to_owned(),
        evaluator_id: req.evaluator_id,
    }))
}

#[utoipa::path(
    get,
    path = "/api/evaluation/user/{username}/results",
    params(
        ("username" = String, Path, description = "Evaluator username")
    ),
    responses(
        (status = 200, description = "Whole evaluation record", body = ResultsRes),
        (status = 404, description = "Unknown evaluator", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn user_results(
    State(ctx): State<Arc<AppContext>>,
    Path(username): Path<String>,
) -> ApiResult<ResultsRes> {
    let username = require_username(&username)?;
    let record = ctx.evaluator().results(&username)?;

    Ok(Json(ResultsRes {
        status: STATUS_SUCCESS.into(),
        username: username.to_string(),
        user_data: to_json(&record)?,
    }))
}

#[utoipa::path(
    get,
    path = "/api/evaluation/health",
    responses(
        (status = 200, description = "Evaluation service health", body = EvaluationHealthRes)
    )
)]
#[axum::debug_handler]
async fn health(State(ctx): State<Arc<AppContext>>) -> Json<EvaluationHealthRes> {
    let base = HealthService::check_health(HealthService::EVALUATION);
    let health = ctx.evaluator().health();

    Json(EvaluationHealthRes {
        status: base.status,
        service: base.service,
        active_users: health.active_users,
        total_cases: health.total_cases,
        case_files: health.case_files,
        conversations_dir: health.conversations_dir.display().to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/api/evaluation/case/{case_id}/evaluator/{evaluator_id}",
    params(
        ("case_id" = String, Path, description = "Case id, `7` or `case7`"),
        ("evaluator_id" = String, Path, description = "Recorded conversation owner, e.g. `LLM1`")
    ),
    responses(
        (status = 200, description = "Recorded conversation", body = EvaluatorDataRes),
        (status = 404, description = "No such recording", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn evaluator_data(
    State(ctx): State<Arc<AppContext>>,
    Path((case_id, evaluator_id)): Path<(String, String)>,
) -> ApiResult<EvaluatorDataRes> {
    let record = ctx.evaluator().model_output(&case_id, &evaluator_id)?;

    Ok(Json(EvaluatorDataRes {
        status: STATUS_SUCCESS.into(),
        conversation: record.conversation,
        diagnosis: record.diagnosis,
        treatment: record.treatment,
    }))
}

#[utoipa::path(
    get,
    path = "/api/evaluation/dimensions",
    responses(
        (status = 200, description = "Scoring dimensions", body = [DimensionRes]),
        (status = 500, description = "Dimension file unreadable", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn dimensions(State(ctx): State<Arc<AppContext>>) -> ApiResult<Vec<DimensionRes>> {
    let dimensions = ctx
        .evaluator()
        .dimensions()?
        .into_iter()
        .map(|d| DimensionRes {
            dimension: d.dimension,
            anchors: d.anchors,
            category: d.category,
        })
        .collect();
    Ok(Json(dimensions))
}

#[utoipa::path(
    post,
    path = "/api/evaluation/save-dimension-score",
    request_body = DimensionScoreReq,
    responses(
        (status = 200, description = "Score saved", body = MessageRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 404, description = "Unknown evaluator", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn save_dimension_score(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<DimensionScoreReq>,
) -> ApiResult<MessageRes> {
    let username = require_username(&req.username)?;
    let case_id = req.case_id.as_text();

    ctx.evaluator().upsert_dimension_score(
        &username,
        require_case_id(&case_id)?,
        &req.evaluator_id,
        &req.dimension_key,
        req.score,
    )?;
    Ok(Json(MessageRes::success("score saved")))
}

#[utoipa::path(
    get,
    path = "/api/evaluation/get-user-scores",
    params(
        ("username" = String, Query, description = "Evaluator username"),
        ("case_id" = Option<String>, Query, description = "Restrict to one case")
    ),
    responses(
        (status = 200, description = "Stored scores", body = ScoresRes),
        (status = 404, description = "Unknown evaluator", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_user_scores(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<CaseFilterQuery>,
) -> ApiResult<ScoresRes> {
    let username = require_username(&query.username)?;
    let scores = ctx
        .evaluator()
        .scores(&username, query.case_id.as_deref().filter(|c| !c.trim().is_empty()))?;

    Ok(Json(ScoresRes {
        status: STATUS_SUCCESS.into(),
        scores,
    }))
}

#[utoipa::path(
    post,
    path = "/api/evaluation/initialize-case",
    request_body = CaseReq,
    responses(
        (status = 200, description = "Case fields present", body = MessageRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 404, description = "Unknown evaluator", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn initialize_case(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<CaseReq>,
) -> ApiResult<MessageRes> {
    let username = require_username(&req.username)?;
    let case_id = req.case_id.as_text();

    ctx.evaluator()
        .initialize_case_fields(&username, require_case_id(&case_id)?)?;
    Ok(Json(MessageRes::success("case fields initialised")))
}

#[utoipa::path(
    post,
    path = "/api/evaluation/save-ranking",
    request_body = SaveRankingReq,
    responses(
        (status = 200, description = "Ranking saved", body = MessageRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 404, description = "Unknown evaluator", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn save_ranking(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<SaveRankingReq>,
) -> ApiResult<MessageRes> {
    let username = require_username(&req.username)?;
    let case_id = req.case_id.as_text();

    ctx.evaluator().replace_ranking_and_tiers(
        &username,
        require_case_id(&case_id)?,
        req.ranking,
        req.tiers,
    )?;
    Ok(Json(MessageRes::success("ranking saved")))
}

#[utoipa::path(
    get,
    path = "/api/evaluation/get-ranking",
    params(
        ("username" = String, Query, description = "Evaluator username"),
        ("case_id" = Option<String>, Query, description = "Restrict to one case")
    ),
    responses(
        (status = 200, description = "Ranking of one case, or of every case", body = RankingRes),
        (status = 404, description = "Unknown evaluator", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_ranking(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<CaseFilterQuery>,
) -> ApiResult<RankingRes> {
    let username = require_username(&query.username)?;
    let case_id = query.case_id.as_deref().filter(|c| !c.trim().is_empty());
    let rankings = ctx.evaluator().rankings(&username, case_id)?;

    let res = match case_id {
        Some(_) => {
            let pair = rankings.into_values().next().unwrap_or_default();
            RankingRes {
                status: STATUS_SUCCESS.into(),
                ranking: Some(pair.ranking),
                tiers: Some(pair.tiers),
                rankings: None,
            }
        }
        None => RankingRes {
            status: STATUS_SUCCESS.into(),
            ranking: None,
            tiers: None,
            rankings: Some(
                rankings
                    .into_iter()
                    .map(|(case, pair)| {
                        (
                            case,
                            RankingPair {
                                ranking: pair.ranking,
                                tiers: pair.tiers,
                            },
                        )
                    })
                    .collect(),
            ),
        },
    };
    Ok(Json(res))
}

#[utoipa::path(
    post,
    path = "/api/evaluation/save-case-state",
    request_body = SaveCaseStateReq,
    responses(
        (status = 200, description = "Case saved", body = SaveCaseStateRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 404, description = "Unknown evaluator", body = ErrorRes)
    )
)]
/// Mark a case saved with its ranking and merge the submitted evaluator scores
#[axum::debug_handler]
async fn save_case_state(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<SaveCaseStateReq>,
) -> ApiResult<SaveCaseStateRes> {
    let username = require_username(&req.username)?;
    let case_id = req.case_id.as_text();
    let submissions: BTreeMap<String, EvaluatorScores> =
        decode_entries(req.evaluator_entries(), "evaluator scores")?;

    let evaluators_count = ctx.evaluator().merge_case_state(
        &username,
        require_case_id(&case_id)?,
        req.ranking,
        submissions,
    )?;

    Ok(Json(SaveCaseStateRes {
        status: STATUS_SUCCESS.into(),
        message: "case state saved".into(),
        evaluators_count,
    }))
}

#[utoipa::path(
    get,
    path = "/api/evaluation/check-submission-eligibility",
    params(
        ("username" = String, Query, description = "Evaluator username")
    ),
    responses(
        (status = 200, description = "Whether every case has model output", body = EligibilityRes),
        (status = 400, description = "Bad request", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn check_submission_eligibility(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<UserQuery>,
) -> ApiResult<EligibilityRes> {
    let _username: Username = require_username(&query.username)?;
    let eligibility = ctx.evaluator().submission_eligibility();

    Ok(Json(EligibilityRes {
        status: STATUS_SUCCESS.into(),
        can_submit: eligibility.can_submit,
        completed_cases: eligibility.completed_cases,
        total_cases: eligibility.total_cases,
    }))
}

#[utoipa::path(
    get,
    path = "/api/evaluation/get-case-state",
    params(
        ("username" = String, Query, description = "Evaluator username"),
        ("case_id" = String, Query, description = "Case id, `7` or `case7`")
    ),
    responses(
        (status = 200, description = "Saved state of the case", body = CaseStateRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 404, description = "Unknown evaluator", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_case_state(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<CaseStateQuery>,
) -> ApiResult<CaseStateRes> {
    let username = require_username(&query.username)?;
    let state = ctx
        .evaluator()
        .read_case_state(&username, require_case_id(&query.case_id)?)?;

    Ok(Json(CaseStateRes {
        status: STATUS_SUCCESS.into(),
        case_state: to_json(&state)?,
    }))
}

#[utoipa::path(
    get,
    path = "/api/evaluation/case/{case_id}/evaluators",
    params(
        ("case_id" = String, Path, description = "Case id, `7` or `case7`")
    ),
    responses(
        (status = 200, description = "Every recorded conversation of the case", body = CaseEvaluatorsRes),
        (status = 404, description = "No such case folder", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn case_evaluators(
    State(ctx): State<Arc<AppContext>>,
    Path(case_id): Path<String>,
) -> ApiResult<CaseEvaluatorsRes> {
    let recorded = ctx.evaluator().case_evaluators(&case_id)?;
    let evaluators: Vec<RecordedConversationRes> = recorded
        .into_iter()
        .map(|r| RecordedConversationRes {
            name: r.id.clone(),
            id: r.id,
            file: r.file,
            data: r.data,
        })
        .collect();

    Ok(Json(CaseEvaluatorsRes {
        status: STATUS_SUCCESS.into(),
        case_id,
        total: evaluators.len(),
        evaluators,
    }))
}

#[cfg(test)]
mod tests {
    use crate::evaluation_app;
    use crate::test_support::{body_json, context, get, post_json, seed_cases, ScriptedReplies};
    use axum::http::StatusCode;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;
    use tower::ServiceExt;

    #[tokio::test]
    async fn record_operations_round_trip() {
        let temp = TempDir::new().unwrap();
        seed_cases(temp.path(), &["cough", "fever"]);
        let app = evaluation_app(context(temp.path(), ScriptedReplies::ok("hi")));

        let res = app
            .clone()
            .oneshot(post_json("/api/evaluation/create-user", json!({"username": "bob"})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["created"], true);

        let res = app
            .clone()
            .oneshot(post_json(
                "/api/evaluation/save-dimension-score",
                json!({
                    "username": "bob", "case_id": 1, "evaluator_id": "LLM1",
                    "dimension_key": "logic", "score": 4
                }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app
            .clone()
            .oneshot(post_json(
                "/api/evaluation/save-case-state",
                json!({
                    "username": "bob", "case_id": "case1", "ranking": ["LLM1", "LLM2"],
                    "LLM2": {"dimensions": {"logic": 2}}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(res).await["evaluators_count"], 1);

        let res = app
            .clone()
            .oneshot(get("/api/evaluation/get-case-state?username=bob&case_id=1"))
            .await
            .unwrap();
        let body = body_json(res).await;
        assert_eq!(body["case_state"]["saved"], true);
        assert_eq!(
            body["case_state"]["evaluators"]["LLM1"]["dimensions"]["logic"],
            4
        );

        let res = app
            .clone()
            .oneshot(get("/api/evaluation/get-ranking?username=bob&case_id=case1"))
            .await
            .unwrap();
        assert_eq!(body_json(res).await["ranking"], json!(["LLM1", "LLM2"]));

        let res = app
            .oneshot(post_json("/api/evaluation/init-user", json!({"username": "bob"})))
            .await
            .unwrap();
        assert_eq!(body_json(res).await["next_case_index"], 1);
    }

    #[tokio::test]
    async fn unknown_evaluator_is_404() {
        let temp = TempDir::new().unwrap();
        seed_cases(temp.path(), &["cough"]);
        let app = evaluation_app(context(temp.path(), ScriptedReplies::ok("hi")));

        let res = app
            .oneshot(get("/api/evaluation/user/nobody/results"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(res).await["status"], "error");
    }

    #[tokio::test]
    async fn invalid_case_id_is_400() {
        let temp = TempDir::new().unwrap();
        seed_cases(temp.path(), &["cough"]);
        let app = evaluation_app(context(temp.path(), ScriptedReplies::ok("hi")));

        app.clone()
            .oneshot(post_json("/api/evaluation/create-user", json!({"username": "bob"})))
            .await
            .unwrap();
        let res = app
            .oneshot(post_json(
                "/api/evaluation/initialize-case",
                json!({"username": "bob", "case_id": "first"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn navigate_boundaries_and_direction() {
        let temp = TempDir::new().unwrap();
        seed_cases(temp.path(), &["cough", "fever"]);
        let app = evaluation_app(context(temp.path(), ScriptedReplies::ok("hi")));

        let res = app
            .clone()
            .oneshot(post_json(
                "/api/evaluation/navigate",
                json!({"username": "bob", "direction": "previous"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app
            .clone()
            .oneshot(post_json(
                "/api/evaluation/navigate",
                json!({"username": "bob", "direction": "sideways"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app
            .oneshot(post_json("/api/evaluation/navigate", json!({"username": "bob"})))
            .await
            .unwrap();
        let body = body_json(res).await;
        assert_eq!(body["current_index"], 1);
        assert_eq!(body["case_name"], "case2");
    }

    #[tokio::test]
    async fn recorded_conversations_are_listed() {
        let temp = TempDir::new().unwrap();
        seed_cases(temp.path(), &["cough"]);
        fs::write(
            temp.path().join("conversations/case1/LLM1.json"),
            r#"{"conversation": [{"role": "user", "content": "hi"}], "Diagnosis": "flu", "Treatment": "rest"}"#,
        )
        .unwrap();
        let app = evaluation_app(context(temp.path(), ScriptedReplies::ok("hi")));

        let res = app
            .clone()
            .oneshot(get("/api/evaluation/case/1/evaluators"))
            .await
            .unwrap();
        let body = body_json(res).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["evaluators"][0]["name"], "LLM1");

        let res = app
            .clone()
            .oneshot(get("/api/evaluation/case/1/evaluator/LLM1"))
            .await
            .unwrap();
        assert_eq!(body_json(res).await["diagnosis"], "flu");

        let res = app
            .oneshot(get("/api/evaluation/check-submission-eligibility?username=bob"))
            .await
            .unwrap();
        assert_eq!(body_json(res).await["can_submit"], true);
    }

    #[tokio::test]
    async fn health_and_dimensions() {
        let temp = TempDir::new().unwrap();
        seed_cases(temp.path(), &["cough"]);
        let app = evaluation_app(context(temp.path(), ScriptedReplies::ok("hi")));

        let res = app
            .clone()
            .oneshot(get("/api/evaluation/health"))
            .await
            .unwrap();
        let body = body_json(res).await;
        assert_eq!(body["service"], "evaluation");
        assert_eq!(body["total_cases"], 1);

        let res = app
            .oneshot(get("/api/evaluation/dimensions"))
            .await
            .unwrap();
        assert_eq!(body_json(res).await.as_array().unwrap().len(), 8);
    }
}
