pub mod error;
pub mod info_routes;
pub mod session_routes;

use axum::Router;

use crate::state::app_state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(info_routes::health_routes())
        .merge(session_routes::session_routes(state))
}
