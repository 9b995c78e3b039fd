//! Axum router, handlers and server startup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thingsync_core::{SessionKey, User};
use thingsync_settings::CookieSettings;
use thingsync_store::{ItemStore, Session, SessionRegistry, UserRegistry};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::health::{self, HealthResponse};
use crate::hub::Hub;
use crate::session::{Heartbeat, run_connection};
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub sessions: Arc<SessionRegistry>,
    pub users: Arc<UserRegistry>,
    pub config: Arc<ServerConfig>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<dyn ItemStore>) -> Self {
        let lifetime = chrono::Duration::from_std(config.session_lifetime)
            .unwrap_or_else(|_| chrono::Duration::days(14));
        Self {
            hub: Arc::new(Hub::new(store, config.reply_errors)),
            sessions: Arc::new(SessionRegistry::new(lifetime)),
            users: Arc::new(UserRegistry::new()),
            config: Arc::new(config),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Session and user behind the request's cookie, if both are valid and
    /// the session has not expired.
    pub fn resolve_identity(&self, jar: &CookieJar, now: DateTime<Utc>) -> Option<(Session, User)> {
        let cookie = jar.get(&self.config.cookie.name)?;
        let session = self.sessions.resolve(cookie.value(), now)?;
        let user = self.users.get(session.user_id);
        user.exists().then_some((session, user))
    }

    fn heartbeat(&self) -> Heartbeat {
        Heartbeat {
            interval: self.config.heartbeat_interval,
            timeout: self.config.heartbeat_timeout,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/events", get(events_handler))
        .route("/session", get(session_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind, spawn the server task and return a handle to it.
pub async fn start(config: ServerConfig, store: Arc<dyn ItemStore>) -> std::io::Result<ServerHandle> {
    let state = AppState::new(config, store);
    let listener = TcpListener::bind(state.config.bind_addr()).await?;
    let addr = listener.local_addr()?;

    let router = build_router(state.clone());
    let token = state.shutdown.token();
    let server = tokio::spawn(async move {
        let serve = axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await });
        if let Err(e) = serve.await {
            warn!(error = %e, "server stopped with error");
        }
    });

    info!(%addr, "thingsync server listening");
    Ok(ServerHandle {
        addr,
        state,
        server,
    })
}

/// Handle returned by [`start`]; keeps the server task alive.
pub struct ServerHandle {
    addr: SocketAddr,
    state: AppState,
    server: JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Close every connection and stop accepting new ones.
    pub async fn shutdown(self) {
        self.state.hub.close_all().await;
        let grace = self.state.config.shutdown_timeout;
        if self.state.shutdown.stop_server(self.server, grace).await {
            info!("server stopped");
        }
    }
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    user: User,
    expires_at: DateTime<Utc>,
    created: bool,
}

/// GET /session
///
/// Reuses the caller's session when its cookie still resolves; otherwise
/// creates an anonymous user and a session for it. Either way the cookie is
/// (re)set with the remaining lifetime.
async fn session_handler(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let now = Utc::now();
    let (session, user, created) = match state.resolve_identity(&jar, now) {
        Some((session, user)) => (session, user, false),
        None => {
            let user = state.users.create_anonymous();
            let session = state.sessions.create_at(user.id, now);
            info!(user_id = user.id, session = %session.key.redacted(), "session issued");
            (session, user, true)
        }
    };

    let max_age = (session.expires_at - now).num_seconds().max(0);
    let jar = jar.add(session_cookie(&state.config.cookie, &session.key, max_age));
    (
        jar,
        Json(SessionResponse {
            user,
            expires_at: session.expires_at,
            created,
        }),
    )
}

fn session_cookie(settings: &CookieSettings, key: &SessionKey, max_age_secs: i64) -> Cookie<'static> {
    let mut cookie = Cookie::build((settings.name.clone(), key.as_str().to_owned()))
        .path(settings.path.clone())
        .http_only(settings.http_only)
        .secure(settings.secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs));
    if let Some(domain) = &settings.domain {
        cookie = cookie.domain(domain.clone());
    }
    cookie.build()
}

/// GET /events
///
/// Upgrades only when the session cookie resolves to a live session with an
/// existing user; anything else is refused with 401 before any join.
async fn events_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    jar: CookieJar,
) -> Response {
    let Some((session, user)) = state.resolve_identity(&jar, Utc::now()) else {
        warn!("refusing websocket without a valid session");
        return (StatusCode::UNAUTHORIZED, "no valid session").into_response();
    };

    let (tx, rx) = mpsc::channel(state.config.max_send_queue.max(2));
    let conn = Arc::new(Connection::new(
        session.key,
        user,
        tx,
        state.shutdown.child_token(),
    ));
    let hub = Arc::clone(&state.hub);
    let heartbeat = state.heartbeat();

    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_connection(socket, hub, conn, rx, heartbeat))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.hub.connection_count().await;
    let items = match state.hub.store().list() {
        Ok(items) => items.len(),
        Err(e) => {
            warn!(error = %e, "health check could not list items");
            0
        }
    };
    Json(health::health_check(
        state.start_time,
        connections,
        state.sessions.len(),
        items,
    ))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, header};
    use thingsync_store::MemoryStore;
    use tower::ServiceExt;

    use super::*;

    fn make_state() -> AppState {
        AppState::new(
            ServerConfig::default(),
            Arc::new(MemoryStore::with_capacity(25)),
        )
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn set_cookie(resp: &Response) -> String {
        resp.headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn health_endpoint_returns_counters() {
        let app = build_router(make_state());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["sessions"], 0);
    }

    #[tokio::test]
    async fn session_endpoint_issues_cookie() {
        let state = make_state();
        let app = build_router(state.clone());
        let req = Request::builder().uri("/session").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let cookie = set_cookie(&resp);
        assert!(cookie.starts_with("sessionid="), "got: {cookie}");
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=1209600"));

        let parsed = body_json(resp).await;
        assert_eq!(parsed["created"], true);
        assert_eq!(parsed["user"]["id"], 1);
        assert_eq!(state.sessions.len(), 1);
        assert_eq!(state.users.len(), 1);
    }

    #[tokio::test]
    async fn session_endpoint_reuses_valid_cookie() {
        let state = make_state();
        let user = state.users.create_anonymous();
        let session = state.sessions.create(user.id);

        let app = build_router(state.clone());
        let req = Request::builder()
            .uri("/session")
            .header(header::COOKIE, format!("sessionid={}", session.key))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let cookie = set_cookie(&resp);
        assert!(cookie.contains(session.key.as_str()));

        let parsed = body_json(resp).await;
        assert_eq!(parsed["created"], false);
        assert_eq!(parsed["user"]["id"], user.id);
        assert_eq!(state.sessions.len(), 1);
    }

    #[tokio::test]
    async fn unknown_cookie_gets_a_fresh_session() {
        let state = make_state();
        let app = build_router(state.clone());
        let req = Request::builder()
            .uri("/session")
            .header(header::COOKIE, "sessionid=forged")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(!set_cookie(&resp).contains("forged"));
        assert_eq!(body_json(resp).await["created"], true);
    }

    #[test]
    fn identity_requires_live_session_and_user() {
        let state = make_state();
        let now = Utc::now();

        let jar = CookieJar::new();
        assert!(state.resolve_identity(&jar, now).is_none());

        let orphan = state.sessions.create(42);
        let jar = CookieJar::new().add(Cookie::new("sessionid", orphan.key.as_str().to_owned()));
        assert!(state.resolve_identity(&jar, now).is_none());

        let user = state.users.create_anonymous();
        let session = state.sessions.create(user.id);
        let jar = CookieJar::new().add(Cookie::new("sessionid", session.key.as_str().to_owned()));
        let (resolved, resolved_user) = state.resolve_identity(&jar, now).unwrap();
        assert_eq!(resolved.key, session.key);
        assert_eq!(resolved_user, user);

        let later = session.expires_at + chrono::Duration::seconds(1);
        assert!(state.resolve_identity(&jar, later).is_none());
    }

    #[test]
    fn cookie_honours_settings() {
        let settings = CookieSettings {
            name: "sid".into(),
            path: "/app".into(),
            domain: Some("example.com".into()),
            secure: true,
            http_only: false,
        };
        let cookie = session_cookie(&settings, &SessionKey::from_raw("abc"), 60);
        let rendered = cookie.to_string();
        assert!(rendered.starts_with("sid=abc"));
        assert!(rendered.contains("Path=/app"));
        assert!(rendered.contains("Domain=example.com"));
        assert!(rendered.contains("Secure"));
        assert!(!rendered.contains("HttpOnly"));
        assert!(rendered.contains("Max-Age=60"));
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = build_router(make_state());
        let req = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
