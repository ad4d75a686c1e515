use crate::state::{BotRuntimeState, StatsSnapshot};
use anyhow::{Context, Result};
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;

pub fn router(state: Arc<BotRuntimeState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/stats", get(stats))
        .route("/verification", get(verification))
        .route("/terms", get(terms))
        .route("/privacy", get(privacy))
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<BotRuntimeState>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard to {}", addr))?;

    tracing::info!("Dashboard running at http://localhost:{}", port);

    axum::serve(listener, router(state))
        .await
        .context("Dashboard server error")
}

async fn index(State(state): State<Arc<BotRuntimeState>>) -> Html<String> {
    Html(render_index(&state.snapshot().await))
}

async fn stats(State(state): State<Arc<BotRuntimeState>>) -> Json<StatsSnapshot> {
    Json(state.snapshot().await)
}

fn render_index(stats: &StatsSnapshot) -> String {
    let status = if stats.locked { "locked" } else { "open" };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <meta name="description" content="Juno - coding assistant bot for Discord.">
    <title>Juno</title>
</head>
<body>
    <h1>Juno</h1>
    <p><strong>Servers:</strong> {}</p>
    <p><strong>Commands Executed:</strong> {}</p>
    <p><strong>Commands:</strong> {}</p>
</body>
</html>
"#,
        stats.servers, stats.commands_executed, status
    )
}

fn static_page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<html>\n<head>\n    <title>{title}</title>\n</head>\n<body>\n    <h1>{title}</h1>\n    <p>{body}</p>\n</body>\n</html>\n"
    ))
}

async fn verification() -> impl IntoResponse {
    static_page(
        "Linked Roles Verification",
        "This is the Linked Roles Verification URL for this application.",
    )
}

async fn terms() -> impl IntoResponse {
    static_page(
        "Terms of Service",
        "This is the Terms of Service for this application.",
    )
}

async fn privacy() -> impl IntoResponse {
    static_page(
        "Privacy Policy",
        "This is the Privacy Policy for this application.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_shows_counters() {
        let html = render_index(&StatsSnapshot {
            servers: 12,
            commands_executed: 345,
            command_stats: Default::default(),
            locked: true,
        });
        assert!(html.contains("<strong>Servers:</strong> 12"));
        assert!(html.contains("<strong>Commands Executed:</strong> 345"));
        assert!(html.contains("locked"));
    }

    #[tokio::test]
    async fn stats_reflect_shared_state() {
        let state = Arc::new(BotRuntimeState::new(None));
        state.set_servers(3);
        state.record_command("help").await;

        let Json(snapshot) = stats(State(state.clone())).await;
        assert_eq!(snapshot.servers, 3);
        assert_eq!(snapshot.commands_executed, 1);

        state.record_command("help").await;
        let Json(snapshot) = stats(State(state)).await;
        assert_eq!(snapshot.command_stats["help"], 2);
    }

    #[test]
    fn static_pages_carry_their_title() {
        let Html(page) = static_page("Terms of Service", "text");
        assert!(page.contains("<title>Terms of Service</title>"));
        assert!(page.contains("<h1>Terms of Service</h1>"));
    }
}
