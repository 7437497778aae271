pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod err;
pub mod models;
pub mod profiles;
pub mod scores;


use std::net::SocketAddr;

use axum::handler::Handler;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::Serialize;
use sqlx::SqlitePool;

pub use crate::err::{Error, Success};

pub type Payload<T> = Result<(StatusCode, Json<Success<T>>), Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok((StatusCode::OK, Json(Success::of(value))))
}

pub fn creates<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok((StatusCode::CREATED, Json(Success::of(value))))
}

pub fn breaks<V>(err: Error) -> Payload<V>
where
    V: Serialize,
{
    Err(err)
}

pub fn app(pg: SqlitePool) -> Router {
    Router::new()
        .route("/register/student", post(auth::register_student))
        .route("/register/mentor", post(auth::register_mentor))
        .route("/login", post(auth::login))
        .route(
            "/profile/student",
            get(profiles::student_profile).put(profiles::update_student_profile),
        )
        .route("/profile/student/:id", get(profiles::student_profile_by_id))
        .route(
            "/profile/mentor",
            get(profiles::mentor_profile).put(profiles::update_mentor_profile),
        )
        .route("/students", get(profiles::all_students))
        .route("/tests", get(catalog::list_tests).post(catalog::create_test))
        .route("/tests/:id", put(catalog::update_test))
        .route("/test-scores", post(scores::add_score))
        .route(
            "/test-scores/:id",
            put(scores::update_score).delete(scores::delete_score),
        )
        .fallback(err::handler404.into_service())
        .layer(Extension(pg))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = config::Config::load();

    let pg = db::connect(&config.database_url).await?;
    db::init_schema(&pg).await?;

    let app = app(pg);
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    log::info!("Starting mentoring portal HTTP server on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
