//! API Server module
//!
//! Serves the proxy endpoints in front of the upstream providers, the tree and session
//! API driven by [`Core`], and a small HTML view of each tree.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::models::{
    ChatRequest, ChatResponse, IdeaRequest, IdeaResponse, ImageRequest, NodeId, NodeState,
    SpeechRequest, TreeError, TreeId, TreeRequest, VisibleNode,
};
use crate::prompts;
use crate::session::SessionError;
use crate::upstream::{ChatModel, Services, UpstreamError};
use crate::Core;

/// Request to post a message into a node's conversation
#[derive(Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 3000).into(),
        }
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub core: Core,
}

/// API responses
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

fn tree_error_status(error: &TreeError) -> StatusCode {
    match error {
        TreeError::TreeNotFound(_) | TreeError::NodeNotFound(_) => StatusCode::NOT_FOUND,
        TreeError::NotExpanding(_) => StatusCode::CONFLICT,
        TreeError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Helper function to map tree results to Axum responses
fn map_tree_result<T: Serialize>(result: Result<T, TreeError>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))).into_response(),
        Err(e) => (tree_error_status(&e), Json(ApiResponse::<T>::error(e.to_string()))).into_response(),
    }
}

/// Helper function to map session results to Axum responses
fn map_session_result<T: Serialize>(result: Result<T, SessionError>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))).into_response(),
        Err(e) => {
            let status = match &e {
                SessionError::Busy => StatusCode::CONFLICT,
                SessionError::EmptyMessage => StatusCode::BAD_REQUEST,
                SessionError::Tree(inner) => tree_error_status(inner),
                SessionError::Interrupted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(ApiResponse::<T>::error(e.to_string()))).into_response()
        }
    }
}

/// `{ "error": ... }` body used by the proxy endpoints
fn proxy_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn audio_response(audio: Vec<u8>) -> Response {
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static("audio/mpeg"))],
        audio,
    )
        .into_response()
}

/// Builds the application router
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { Redirect::temporary("/ui") }))
        // --- Upstream proxy --- //
        .route("/api/generate-tree", post(generate_tree_handler))
        .route("/api/generate", post(generate_idea_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/llama-chat", post(llama_chat_handler))
        .route("/api/generate-image", post(generate_image_handler))
        .route("/api/text-to-speech", post(text_to_speech_handler))
        // --- Trees --- //
        .route("/api/trees", get(list_trees_handler).post(create_tree_handler))
        .route("/api/trees/:id", get(get_tree_handler))
        .route("/api/trees/:id/events", get(events_handler))
        .route("/api/trees/:id/nodes/:node/toggle", post(toggle_handler))
        .route("/api/trees/:id/nodes/:node/ancestors", get(ancestors_handler))
        // --- Sessions --- //
        .route("/api/trees/:id/nodes/:node/session", get(open_session_handler))
        .route(
            "/api/trees/:id/nodes/:node/session/messages",
            post(send_message_handler),
        )
        .route(
            "/api/trees/:id/nodes/:node/session/audio",
            get(session_audio_handler),
        )
        // --- UI --- //
        .route("/ui", get(list_trees_ui_handler))
        .route("/ui/trees", post(create_tree_ui_handler))
        .route("/ui/:id", get(ui_handler))
        .route("/ui/:id/toggle/:node", post(toggle_ui_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the API server
pub async fn serve(state: AppState, config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state);

    tracing::info!("Starting server on {}", config.address);
    let listener = TcpListener::bind(config.address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Proxy Handlers --- //

async fn generate_tree_handler(
    State(state): State<AppState>,
    Json(payload): Json<TreeRequest>,
) -> Response {
    if payload.prompt.trim().is_empty() {
        return proxy_error(StatusCode::BAD_REQUEST, "Prompt is required");
    }

    match state.services.generate_tree(&payload.prompt).await {
        Ok(tree) => Json(tree).into_response(),
        Err(e) => {
            tracing::error!("Tree generation failed: {}", e);
            proxy_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to retrieve a valid API response.",
            )
        }
    }
}

async fn generate_idea_handler(
    State(state): State<AppState>,
    Json(payload): Json<IdeaRequest>,
) -> Response {
    match state.services.generate_idea(&payload).await {
        Ok(text) => Json(IdeaResponse { text }).into_response(),
        Err(e) => {
            tracing::error!(node = %payload.current_node, "Idea generation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(IdeaResponse {
                    text: prompts::FAILED_IDEA_REPLY.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn chat_with(services: &Services, request: &ChatRequest, model: ChatModel) -> Response {
    match services.chat(request, model).await {
        Ok(response) => Json(ChatResponse { response }).into_response(),
        Err(e) => {
            tracing::error!(topic = %request.context, ?model, "Chat failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatResponse {
                    response: prompts::FAILED_CHAT_REPLY.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn chat_handler(State(state): State<AppState>, Json(payload): Json<ChatRequest>) -> Response {
    chat_with(&state.services, &payload, ChatModel::Primary).await
}

async fn llama_chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Response {
    chat_with(&state.services, &payload, ChatModel::Llama).await
}

async fn generate_image_handler(
    State(state): State<AppState>,
    Json(payload): Json<ImageRequest>,
) -> Response {
    match state.services.generate_image(&payload).await {
        Ok(job) => Json(job).into_response(),
        Err(UpstreamError::InvalidRequest(_)) => proxy_error(
            StatusCode::BAD_REQUEST,
            "Invalid prompt: A non-empty string is required.",
        ),
        Err(e) => {
            tracing::error!("Image submission failed: {}", e);
            proxy_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn text_to_speech_handler(
    State(state): State<AppState>,
    Json(payload): Json<SpeechRequest>,
) -> Response {
    match state.services.text_to_speech(&payload.text).await {
        Ok(audio) => audio_response(audio),
        Err(UpstreamError::InvalidRequest(message)) => proxy_error(StatusCode::BAD_REQUEST, message),
        Err(e) => {
            tracing::error!("Speech synthesis failed: {}", e);
            proxy_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// --- Tree Handlers --- //

async fn list_trees_handler(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(ApiResponse::success(state.core.list_trees())),
    )
        .into_response()
}

async fn create_tree_handler(
    State(state): State<AppState>,
    Json(payload): Json<TreeRequest>,
) -> Response {
    if payload.prompt.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::error("Prompt is required".to_string())),
        )
            .into_response();
    }
    map_tree_result(state.core.plant(&payload.prompt).await)
}

async fn get_tree_handler(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    map_tree_result(state.core.visible(TreeId::new(id)))
}

async fn toggle_handler(
    State(state): State<AppState>,
    Path((id, node)): Path<(u32, usize)>,
) -> Response {
    map_tree_result(state.core.toggle(TreeId::new(id), NodeId::new(node)).await)
}

async fn ancestors_handler(
    State(state): State<AppState>,
    Path((id, node)): Path<(u32, usize)>,
) -> Response {
    map_tree_result(state.core.ancestors(TreeId::new(id), NodeId::new(node)))
}

// --- Session Handlers --- //

async fn open_session_handler(
    State(state): State<AppState>,
    Path((id, node)): Path<(u32, usize)>,
) -> Response {
    map_tree_result(state.core.open_session(TreeId::new(id), NodeId::new(node)))
}

async fn send_message_handler(
    State(state): State<AppState>,
    Path((id, node)): Path<(u32, usize)>,
    Json(payload): Json<SendMessageRequest>,
) -> Response {
    let result = state
        .core
        .send_message(TreeId::new(id), NodeId::new(node), &payload.text)
        .await;
    map_session_result(result)
}

async fn session_audio_handler(
    State(state): State<AppState>,
    Path((id, node)): Path<(u32, usize)>,
) -> Response {
    match state.core.session_audio(TreeId::new(id), NodeId::new(node)) {
        Some(audio) => audio_response(audio),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error("No audio for this node".to_string())),
        )
            .into_response(),
    }
}

// --- Events --- //

const UPDATE_EVENT: &str = "event: update\ndata: change\n\n";

async fn events_handler(State(state): State<AppState>, Path(id): Path<u32>) -> impl IntoResponse {
    let tree_id = TreeId::new(id);
    let receiver = state.core.subscribe();

    let stream = futures::stream::unfold(receiver, move |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(updated) if updated == tree_id => {
                    return Some((Ok::<_, Infallible>(UPDATE_EVENT.to_string()), receiver));
                }
                Ok(_) => continue,
                // Some messages were missed; the client refetches anyway
                Err(RecvError::Lagged(_)) => {
                    return Some((Ok(UPDATE_EVENT.to_string()), receiver));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    // Set headers for event stream
    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream"),
        ),
        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
    ];

    (headers, axum::body::Body::from_stream(stream))
}

// --- UI Handlers --- //

async fn list_trees_ui_handler(State(state): State<AppState>) -> Html<String> {
    let trees = state.core.list_trees();

    let mut html = String::from(HTML_TEMPLATE_HEADER);
    html.push_str("<h1>Idea Trees</h1>");
    html.push_str(
        "<form class='plant' method='post' action='/ui/trees'>\
         <input name='prompt' placeholder='Plan a wedding' required>\
         <button type='submit'>Grow</button></form>",
    );

    if trees.is_empty() {
        html.push_str("<p>No trees yet. Start one above.</p>");
    } else {
        html.push_str("<ul>");
        for tree in trees {
            html.push_str(&format!(
                "<li><a href=\"/ui/{}\">{}</a></li>",
                tree.id.value(),
                html_escape::encode_text(&tree.name)
            ));
        }
        html.push_str("</ul>");
    }

    html.push_str("</body></html>");
    Html(html)
}

async fn create_tree_ui_handler(
    State(state): State<AppState>,
    Form(payload): Form<TreeRequest>,
) -> Response {
    if payload.prompt.trim().is_empty() {
        return Redirect::to("/ui").into_response();
    }

    match state.core.plant(&payload.prompt).await {
        Ok(planted) => Redirect::to(&format!("/ui/{}", planted.id.value())).into_response(),
        Err(e) => {
            tracing::error!("Failed to plant tree from UI: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!(
                    "<!DOCTYPE html><html><body><h1>Error</h1><p>Could not grow a tree: {}</p><a href='/ui'>Back</a></body></html>",
                    html_escape::encode_text(&e.to_string())
                )),
            )
                .into_response()
        }
    }
}

async fn toggle_ui_handler(
    State(state): State<AppState>,
    Path((id, node)): Path<(u32, usize)>,
) -> Redirect {
    if let Err(e) = state.core.toggle(TreeId::new(id), NodeId::new(node)).await {
        tracing::warn!(tree = id, node, "Toggle from UI failed: {}", e);
    }
    Redirect::to(&format!("/ui/{}", id))
}

async fn ui_handler(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    let tree_id = TreeId::new(id);
    match state.core.visible(tree_id) {
        Ok(root) => Html(render_tree_page(tree_id, &root)).into_response(),
        Err(e) => (
            tree_error_status(&e),
            Html(format!(
                "<!DOCTYPE html><html><body><h1>{}</h1><a href='/ui'>Back</a></body></html>",
                html_escape::encode_text(&e.to_string())
            )),
        )
            .into_response(),
    }
}

fn render_tree_page(tree_id: TreeId, root: &VisibleNode) -> String {
    let mut html = String::from(HTML_TEMPLATE_HEADER);
    html.push_str(&format!(
        "<nav><a href='/ui'>All trees</a></nav><h1>{}</h1>",
        html_escape::encode_text(&root.name)
    ));

    html.push_str("<ul class='idea-tree'>");
    render_node(&mut html, tree_id, root);
    html.push_str("</ul>");

    html.push_str(&format!(
        "<script>const TREE_ID = {};</script>",
        tree_id.value()
    ));
    html.push_str(HTML_TEMPLATE_FOOTER);
    html
}

// Renders a node and, if expanded, its children
fn render_node(html: &mut String, tree_id: TreeId, node: &VisibleNode) {
    let (marker, class) = match node.state {
        NodeState::Collapsed => ("+", "collapsed"),
        NodeState::Expanding => ("~", "expanding"),
        NodeState::Expanded => ("-", "expanded"),
    };

    html.push_str(&format!(
        "<li class='{}'><form method='post' action='/ui/{}/toggle/{}'>\
         <button type='submit' class='toggle'>{}</button>\
         <span class='node-name'>{}</span></form>",
        class,
        tree_id.value(),
        node.id.index(),
        marker,
        html_escape::encode_text(&node.name)
    ));

    if let Some(children) = &node.children {
        html.push_str("<ul class='idea-tree'>");
        for child in children {
            render_node(html, tree_id, child);
        }
        html.push_str("</ul>");
    }

    html.push_str("</li>");
}

// HTML template header with CSS styles
const HTML_TEMPLATE_HEADER: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Heartree</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, 'Open Sans', 'Helvetica Neue', sans-serif;
            line-height: 1.6;
            color: #333;
            max-width: 960px;
            margin: 0 auto;
            padding: 20px;
            background-color: #fdf7f9;
        }
        h1 {
            color: #8e3b5c;
            border-bottom: 2px solid #e58fae;
            padding-bottom: 10px;
        }
        .idea-tree {
            list-style-type: none;
            padding-left: 24px;
        }
        .idea-tree form {
            display: flex;
            align-items: center;
            gap: 10px;
            margin: 4px 0;
        }
        .toggle {
            width: 26px;
            height: 26px;
            border-radius: 13px;
            border: none;
            background: #e58fae;
            color: white;
            font-weight: bold;
            cursor: pointer;
        }
        .expanding .toggle {
            background: #bbb;
            cursor: wait;
        }
        .expanded > form .node-name {
            font-weight: 600;
        }
        .plant input {
            padding: 6px 10px;
            min-width: 300px;
        }
    </style>
</head>
<body>
"#;

// HTML template footer with EventSource JavaScript for reactive refreshing
const HTML_TEMPLATE_FOOTER: &str = r#"
    <script>
        const eventSource = new EventSource(`/api/trees/${TREE_ID}/events`);
        eventSource.addEventListener('update', () => window.location.reload());
        eventSource.onerror = () => eventSource.close();
    </script>
</body>
</html>
"#;
