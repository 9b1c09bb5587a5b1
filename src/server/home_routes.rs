//! The landing page for signed-in users: statistics, testimonials and the
//! review form.

use super::auth_routes::HOME_PATH;
use super::forms::{FormErrors, ReviewForm};
use super::session::Session;
use super::state::{GuardedStore, ServerState};
use crate::genre::{
    FullStore, GenreCount, PredictionStore, Review, ReviewStore, TrendStore, TrendingGenre,
    UserActivity,
};
use crate::user::UserStore;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, Router,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{error, info};

pub const TOP_GENRES_LIMIT: usize = 5;
pub const TESTIMONIALS_LIMIT: usize = 6;
pub const MOST_PREDICTED_WINDOW_DAYS: i64 = 30;

#[derive(Serialize)]
struct CurrentUser {
    id: usize,
    handle: String,
}

#[derive(Serialize)]
struct HomePage {
    user: CurrentUser,
    top_genres: Vec<GenreCount>,
    active_users: usize,
    testimonials: Vec<Review>,
    trending_genres: Vec<TrendingGenre>,
    most_predicted_genre: Option<GenreCount>,
    activity: Option<UserActivity>,
    form: serde_json::Value,
    errors: FormErrors,
}

fn build_home_page(
    store: &dyn FullStore,
    user_id: usize,
    form: &ReviewForm,
    errors: FormErrors,
) -> Result<HomePage> {
    let user = store
        .get_user(user_id)?
        .with_context(|| format!("User {} not found", user_id))?;
    let since = Utc::now() - Duration::days(MOST_PREDICTED_WINDOW_DAYS);
    Ok(HomePage {
        user: CurrentUser {
            id: user.id,
            handle: user.handle,
        },
        top_genres: store.top_genres(TOP_GENRES_LIMIT)?,
        active_users: store.count_users()?,
        testimonials: store.latest_reviews(TESTIMONIALS_LIMIT)?,
        trending_genres: store.latest_trends()?,
        most_predicted_genre: store.most_predicted_since(since)?,
        activity: store.get_user_activity(user_id)?,
        form: serde_json::json!({ "message": form.message }),
        errors,
    })
}

fn render(status: StatusCode, page: Result<HomePage>) -> Response {
    match page {
        Ok(page) => (status, Json(page)).into_response(),
        Err(err) => {
            error!("Failed to build home page: {:#}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_home(session: Session, State(store): State<GuardedStore>) -> Response {
    render(
        StatusCode::OK,
        build_home_page(
            store.as_ref(),
            session.user_id,
            &ReviewForm::default(),
            FormErrors::default(),
        ),
    )
}

async fn post_home(
    session: Session,
    State(store): State<GuardedStore>,
    Form(form): Form<ReviewForm>,
) -> Response {
    let errors = form.validate();
    if !errors.is_empty() {
        return render(
            StatusCode::BAD_REQUEST,
            build_home_page(store.as_ref(), session.user_id, &form, errors),
        );
    }

    match store.add_review(session.user_id, None, form.message.trim()) {
        Ok(review) => {
            info!("User {} left review {}", session.user_id, review.id);
            Redirect::to(HOME_PATH).into_response()
        }
        Err(err) => {
            error!("Failed to store review: {:#}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn make_home_routes(state: ServerState) -> Router {
    Router::new()
        .route("/home/", get(get_home).post(post_home))
        .with_state(state)
}
