use crate::config::AppConfig;
use crate::live::{AdminFeed, ViewRenderer};
use crate::permissions::{PermissionWriter, ToggleEvent};
use crate::session::{Screen, SessionGate};
use crate::store::LiveStore;
use crate::ui;
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use axum::{
    Form, Router,
    body::Body,
    extract::{State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

const SESSION_COOKIE: &str = "alarm_console_session";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub gate: Arc<SessionGate>,
    pub store: Arc<dyn LiveStore>,
    pub renderer: ViewRenderer,
    pub writer: PermissionWriter,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/ws/admin", get(ws_admin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState) -> Result<()> {
    let addr: SocketAddr = state.config.http_bind.parse()?;
    let router = router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Console listening on http://{addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(graceful_shutdown())
        .await?;

    Ok(())
}

async fn graceful_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutting down http server");
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            (name == SESSION_COOKIE).then(|| value.to_string())
        })
}

fn redirect_home(cookie: String) -> Response {
    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, "/".to_string()), (header::SET_COOKIE, cookie)],
        Body::empty(),
    )
        .into_response()
}

async fn index(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let screen = session_id(&headers)
        .map(|id| state.gate.screen(&id))
        .unwrap_or_else(Screen::login);
    match screen {
        Screen::Admin { identity } => Html(ui::render_admin_page(&identity.email)),
        Screen::Login { error } => Html(ui::render_login_page(error.as_deref())),
        Screen::RoleChecking => Html(ui::render_login_page(None)),
    }
}

#[derive(Deserialize)]
struct LoginForm {
    email: String,
    password: String,
}

async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let outcome = state.gate.sign_in(&form.email, &form.password).await;
    match (outcome.session, outcome.screen) {
        (Some(id), _) => redirect_home(format!(
            "{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
            state.config.session_ttl.as_secs()
        )),
        (None, Screen::Login { error }) => {
            Html(ui::render_login_page(error.as_deref())).into_response()
        }
        (None, _) => Html(ui::render_login_page(None)).into_response(),
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(id) = session_id(&headers) {
        state.gate.sign_out(&id).await;
    }
    redirect_home(format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0"))
}

async fn ws_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(id) = session_id(&headers).filter(|id| state.gate.screen(id).is_admin()) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    ws.on_upgrade(move |socket| handle_admin_ws(socket, state, id))
}

async fn handle_admin_ws(mut socket: WebSocket, state: AppState, id: String) {
    let Some(mut auth_state) = state.gate.watch(&id) else {
        let _ = send_json(&mut socket, &json!({ "screen": "login" })).await;
        return;
    };
    let mut feed = match AdminFeed::attach(state.store.as_ref(), state.renderer.clone()).await {
        Ok(feed) => feed,
        Err(err) => {
            tracing::warn!("Unable to subscribe admin views: {err:?}");
            return;
        }
    };

    loop {
        tokio::select! {
            view = feed.next() => {
                let Some(view) = view else { break };
                if send_json(&mut socket, &view).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ToggleEvent>(&text) {
                            Ok(event) => state.writer.submit(event),
                            Err(err) => tracing::warn!("Ignoring malformed toggle message: {err}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            changed = auth_state.changed() => {
                if changed.is_err() || !auth_state.borrow().is_admin() {
                    let _ = send_json(&mut socket, &json!({ "screen": "login" })).await;
                    break;
                }
            }
        }
    }
    drop(feed);
    state.gate.touch(&id);
}

async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, payload: &T) -> Result<(), ()> {
    let text = serde_json::to_string(payload).map_err(|_| ())?;
    socket.send(Message::Text(text)).await.map_err(|_| ())
}
