use crate::identity::{AppwriteClient, IdentityApi};
use crate::tmdb::{MovieSummary, TmdbApi, TmdbClient, Trailer};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};

const MAX_BODY_BYTES: usize = 16 * 1024;

const BLANK_CREDENTIALS: &str = "Email and password are required.";
const NOT_LOGGED_IN: &str = "Not logged in";
const DETAILS_FAILED: &str = "Failed to load movie details";

#[derive(Clone)]
pub struct AppState {
    pub tmdb: Arc<dyn TmdbApi>,
    pub identity: Arc<dyn IdentityApi>,
}

pub async fn run_server() -> Result<()> {
    let tmdb: Arc<dyn TmdbApi> = Arc::new(TmdbClient::from_env()?);
    let identity: Arc<dyn IdentityApi> = Arc::new(AppwriteClient::from_env()?);
    let state = AppState { tmdb, identity };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 3080));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/movies/popular", get(popular_movies))
        .route("/movies/top_rated", get(top_rated_movies))
        .route("/movies/search", get(search_movies))
        .route("/movies/:id", get(movie_details))
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/me", get(current_user))
        .route("/auth/logout", post(logout))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "status": "error", "message": message.into() })),
    )
        .into_response()
}

/// Listing endpoints degrade to an empty page rather than erroring: the
/// warn line is what separates "request failed" from "zero results".
fn list_or_empty(result: Result<Vec<MovieSummary>>, listing: &str) -> Json<Vec<MovieSummary>> {
    match result {
        Ok(movies) => Json(movies),
        Err(e) => {
            warn!("Failed to fetch {} listing, returning empty: {:#}", listing, e);
            Json(Vec::new())
        }
    }
}

async fn popular_movies(State(state): State<AppState>) -> Json<Vec<MovieSummary>> {
    list_or_empty(state.tmdb.popular_movies().await, "popular")
}

async fn top_rated_movies(State(state): State<AppState>) -> Json<Vec<MovieSummary>> {
    list_or_empty(state.tmdb.top_rated_movies().await, "top rated")
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
}

async fn search_movies(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<MovieSummary>> {
    let query = params.query.trim();
    // Blank query means "show me the default listing", not a search for "".
    let result = if query.is_empty() {
        state.tmdb.top_rated_movies().await
    } else {
        state.tmdb.search_movies(query).await
    };
    list_or_empty(result, "search")
}

async fn movie_details(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let (details, trailer) = tokio::join!(
        state.tmdb.movie_details(id),
        state.tmdb.movie_trailer(id)
    );

    let details = match details {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to fetch details for movie {}: {:#}", id, e);
            return error_body(StatusCode::BAD_GATEWAY, DETAILS_FAILED);
        }
    };
    // A detail view without a trailer is still a detail view.
    let trailer = trailer.unwrap_or_else(|e| {
        warn!("Failed to fetch trailer for movie {}: {:#}", id, e);
        Trailer::none()
    });

    Json(json!({ "details": details, "trailer": trailer })).into_response()
}

#[derive(Deserialize)]
struct Credentials {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

impl Credentials {
    fn is_blank(&self) -> bool {
        self.email.trim().is_empty() || self.password.trim().is_empty()
    }
}

async fn signup(State(state): State<AppState>, Json(creds): Json<Credentials>) -> Response {
    if creds.is_blank() {
        return error_body(StatusCode::BAD_REQUEST, BLANK_CREDENTIALS);
    }
    match state
        .identity
        .create_account(&creds.email, &creds.password)
        .await
    {
        Ok(identity) => {
            info!("Created account for {}", identity.email);
            (StatusCode::CREATED, Json(identity)).into_response()
        }
        Err(e) => {
            warn!("Signup failed: {:#}", e);
            error_body(StatusCode::UNAUTHORIZED, e.to_string())
        }
    }
}

async fn login(State(state): State<AppState>, Json(creds): Json<Credentials>) -> Response {
    if creds.is_blank() {
        return error_body(StatusCode::BAD_REQUEST, BLANK_CREDENTIALS);
    }
    match state
        .identity
        .create_session(&creds.email, &creds.password)
        .await
    {
        Ok(session) => {
            info!("Opened session for {}", session.provider_uid);
            Json(session).into_response()
        }
        Err(e) => {
            warn!("Login failed: {:#}", e);
            error_body(StatusCode::UNAUTHORIZED, e.to_string())
        }
    }
}

async fn current_user(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
) -> Response {
    let Some(TypedHeader(Authorization(bearer))) = auth else {
        return error_body(StatusCode::UNAUTHORIZED, NOT_LOGGED_IN);
    };
    match state.identity.current_identity(bearer.token()).await {
        Ok(identity) => Json(identity).into_response(),
        Err(e) => {
            // Whatever the provider said, the caller only learns one thing.
            warn!("Session lookup failed: {:#}", e);
            error_body(StatusCode::UNAUTHORIZED, NOT_LOGGED_IN)
        }
    }
}

async fn logout(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
) -> Response {
    let Some(TypedHeader(Authorization(bearer))) = auth else {
        return error_body(StatusCode::UNAUTHORIZED, NOT_LOGGED_IN);
    };
    match state.identity.delete_session(bearer.token()).await {
        Ok(()) => Json(json!({ "status": "success" })).into_response(),
        Err(e) => {
            warn!("Logout failed: {:#}", e);
            error_body(StatusCode::UNAUTHORIZED, e.to_string())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
