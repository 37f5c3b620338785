//! HTTP server setup: router construction and API route wiring.

use super::state::ApiState;
use super::{agents, deep_work, projects, system, tasks};

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use std::net::SocketAddr;
use std::sync::Arc;

/// Build the full API router.
pub fn build_router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(system::health))
        .route("/ws", get(system::dashboard_ws))
        .route("/files/browse", get(system::browse_files))
        .route(
            "/whatsapp/webhook",
            get(system::whatsapp_verify).post(system::whatsapp_webhook),
        )
        .route("/deep-work/start", post(deep_work::start))
        .route("/deep-work/projects/{id}/plan", get(deep_work::get_plan))
        .route("/deep-work/projects/{id}/approve", post(deep_work::approve))
        .route("/deep-work/projects/{id}/pause", post(deep_work::pause))
        .route("/deep-work/projects/{id}/resume", post(deep_work::resume))
        .route(
            "/mission-control/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/mission-control/projects/{id}",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route(
            "/mission-control/projects/{id}/approve",
            post(projects::approve_project),
        )
        .route(
            "/mission-control/projects/{id}/pause",
            post(projects::pause_project),
        )
        .route(
            "/mission-control/projects/{id}/resume",
            post(projects::resume_project),
        )
        .route("/mission-control/tasks", post(tasks::create_task))
        .route("/mission-control/tasks/{id}", get(tasks::get_task))
        .route("/mission-control/tasks/{id}/status", post(tasks::update_status))
        .route("/mission-control/tasks/{id}/skip", post(tasks::skip_task))
        .route("/mission-control/tasks/{id}/execute", post(tasks::execute_task))
        .route("/mission-control/tasks/{id}/stop", post(tasks::stop_task))
        .route(
            "/mission-control/tasks/{id}/documents",
            get(tasks::task_documents),
        )
        .route(
            "/mission-control/agents",
            get(agents::list_agents).post(agents::create_agent),
        )
        .route(
            "/mission-control/agents/{id}",
            axum::routing::delete(agents::delete_agent),
        )
        .route("/mission-control/activities", get(system::activity_feed));

    Router::new()
        .nest("/api", api_routes)
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the given address.
pub async fn start_http_server(
    bind: SocketAddr,
    state: Arc<ApiState>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "HTTP server listening");

    let handle = tokio::spawn(async move {
        let mut shutdown = shutdown_rx;
        if let Err(error) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|v| *v).await;
            })
            .await
        {
            tracing::error!(%error, "HTTP server exited with error");
        }
    });

    Ok(handle)
}

/// Return `preferred` if it is free, otherwise the next free port the OS
/// hands out.
pub fn find_free_port(preferred: u16) -> std::io::Result<u16> {
    match std::net::TcpListener::bind(("127.0.0.1", preferred)) {
        Ok(listener) => {
            drop(listener);
            Ok(preferred)
        }
        Err(_) => {
            let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
            let port = listener.local_addr()?.port();
            drop(listener);
            Ok(port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_free_port_falls_back_when_taken() {
        // Occupy a port, then ask for it: we must get a different one.
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let taken = listener.local_addr().expect("addr").port();
        let other = find_free_port(taken).expect("fallback port");
        assert_ne!(other, taken);
        assert!(other > 0);
    }
}
