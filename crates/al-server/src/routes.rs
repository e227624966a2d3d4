use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;

use crate::handler::AppState;
use crate::{autolabel, health, projects};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/api/projects/{project}",
            get(projects::get_project).delete(projects::delete_project),
        )
        .route(
            "/api/projects/{project}/members",
            get(projects::list_members).post(projects::add_member),
        )
        .route("/api/projects/{project}/progress", get(projects::progress))
        .route("/api/projects/{project}/stats", get(projects::stats))
        .route(
            "/api/projects/{project}/labels",
            get(projects::list_labels).post(projects::create_label),
        )
        .route(
            "/api/projects/{project}/labels/{label}",
            get(projects::get_label)
                .patch(projects::update_label)
                .delete(projects::delete_label),
        )
        .route(
            "/api/projects/{project}/docs",
            get(projects::list_documents).post(projects::create_document),
        )
        .route(
            "/api/projects/{project}/docs/{doc}",
            get(projects::get_document).delete(projects::delete_document),
        )
        .route(
            "/api/projects/{project}/docs/{doc}/annotations",
            get(projects::list_annotations).post(projects::create_annotation),
        )
        .route(
            "/api/projects/{project}/docs/{doc}/annotations/{annotation}",
            get(projects::get_annotation)
                .patch(projects::update_annotation)
                .delete(projects::delete_annotation),
        )
        .route(
            "/api/projects/{project}/docs/{doc}/auto-labeling",
            get(autolabel::predict).put(autolabel::retrain),
        )
        .route(
            "/api/projects/{project}/docs/{doc}/auto-labeling/accept",
            post(autolabel::accept),
        )
        .route(
            "/api/projects/{project}/auto-labeling/rebuild",
            post(autolabel::rebuild),
        )
        .route(
            "/api/projects/{project}/auto-labeling/training",
            delete(autolabel::cancel),
        )
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    axum::serve(listener, build_router(state)).await
}
