use actix_web::{delete, get, post, web, HttpResponse, Result as WebResult};
use tracing::info;

use crate::api::models::{ErrorResponse, SendMessageRequest, SendMessageResponse, StatusResponse};
use crate::app::AppState;
use crate::chat::ChatError;

// --- Auth ---

#[post("/login")]
pub async fn login(state: web::Data<AppState>) -> WebResult<HttpResponse> {
    match state.sign_in().await {
        Ok(principal) => Ok(HttpResponse::Ok().json(principal)),
        Err(e) => Ok(HttpResponse::Unauthorized().json(ErrorResponse::new(e.user_message()))),
    }
}

#[post("/logout")]
pub async fn logout(state: web::Data<AppState>) -> WebResult<HttpResponse> {
    match state.sign_out().await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => Ok(HttpResponse::InternalServerError().json(ErrorResponse::new(e.to_string()))),
    }
}

#[get("/me")]
pub async fn me(state: web::Data<AppState>) -> WebResult<HttpResponse> {
    match state.identity.current_principal() {
        Some(principal) => Ok(HttpResponse::Ok().json(principal)),
        None => Ok(HttpResponse::Unauthorized().json(ErrorResponse::new("Not signed in"))),
    }
}

// --- Messages ---

#[get("")]
pub async fn list_messages(state: web::Data<AppState>) -> WebResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.orchestrator.snapshot()))
}

#[post("")]
pub async fn send_message(
    state: web::Data<AppState>,
    req: web::Json<SendMessageRequest>,
) -> WebResult<HttpResponse> {
    match state.orchestrator.send(&req.content).await {
        Ok(Some(report)) => Ok(HttpResponse::Ok().json(SendMessageResponse {
            message: report.message,
            reply: report.reply,
        })),
        Ok(None) => Ok(HttpResponse::BadRequest().json(ErrorResponse::new("Message is empty"))),
        Err(ChatError::NotAuthenticated) => {
            Ok(HttpResponse::Unauthorized().json(ErrorResponse::new("Not signed in")))
        }
        Err(ChatError::SendInProgress) => Ok(HttpResponse::Conflict()
            .json(ErrorResponse::new("A message is already being sent"))),
        Err(ChatError::Completion { error, apology }) => {
            Ok(HttpResponse::BadGateway().json(ErrorResponse {
                error: error.user_message(),
                reply: Some(*apology),
            }))
        }
    }
}

#[delete("")]
pub async fn clear_messages(state: web::Data<AppState>) -> WebResult<HttpResponse> {
    info!("Clearing local chat via API");
    state.orchestrator.clear();
    Ok(HttpResponse::NoContent().finish())
}

// --- Session ---

#[get("/stats")]
pub async fn stats(state: web::Data<AppState>) -> WebResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.orchestrator.stats()))
}

#[get("/status")]
pub async fn status(state: web::Data<AppState>) -> WebResult<HttpResponse> {
    let orchestrator = &state.orchestrator;
    Ok(HttpResponse::Ok().json(StatusResponse {
        authenticated: state.identity.is_authenticated(),
        ready: orchestrator.is_ready(),
        composing: orchestrator.is_composing(),
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(web::scope("/auth").service(login).service(logout).service(me))
            .service(
                web::scope("/messages")
                    .service(list_messages)
                    .service(send_message)
                    .service(clear_messages),
            )
            .service(stats)
            .service(status),
    );
}
