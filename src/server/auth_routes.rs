//! Signup, login and logout pages.

use super::forms::{FormErrors, LoginForm, SignupForm, INVALID_CREDENTIALS};
use super::metrics;
use super::session::{expired_session_cookie, session_cookie, Session, LOGIN_PATH};
use super::state::{GuardedUserManager, ServerState};
use crate::user::auth::AuthTokenValue;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use std::time::Instant;
use tracing::{error, info};

pub const HOME_PATH: &str = "/home/";

fn form_page(status: StatusCode, form: serde_json::Value, errors: &FormErrors) -> Response {
    (status, Json(json!({ "form": form, "errors": errors }))).into_response()
}

async fn get_signup() -> Response {
    form_page(
        StatusCode::OK,
        json!({ "username": "", "email": "" }),
        &FormErrors::default(),
    )
}

async fn post_signup(
    State(user_manager): State<GuardedUserManager>,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Response {
    let errors = match form.validate(&user_manager) {
        Ok(errors) => errors,
        Err(err) => {
            error!("Failed to validate signup form: {:#}", err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if !errors.is_empty() {
        return form_page(StatusCode::BAD_REQUEST, form.echo(), &errors);
    }

    let handle = form.username.trim();
    let created = user_manager
        .add_user_with_password(handle, form.email.trim(), &form.password1)
        .and_then(|user_id| user_manager.generate_auth_token(user_id));
    match created {
        Ok(token) => {
            info!("Created user {}", handle);
            if let Ok(count) = user_manager.count_users() {
                metrics::set_users_total(count);
            }
            (jar.add(session_cookie(&token.value)), Redirect::to(HOME_PATH)).into_response()
        }
        Err(err) => {
            error!("Failed to create user {}: {:#}", handle, err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_login() -> Response {
    form_page(
        StatusCode::OK,
        json!({ "username": "" }),
        &FormErrors::default(),
    )
}

async fn post_login(
    State(user_manager): State<GuardedUserManager>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let start = Instant::now();
    let echo = json!({ "username": form.username });
    let errors = form.validate();
    if !errors.is_empty() {
        return form_page(StatusCode::BAD_REQUEST, echo, &errors);
    }

    match user_manager.login(form.username.trim(), &form.password) {
        Ok(Some(token)) => {
            metrics::record_login_attempt("success", start.elapsed());
            (jar.add(session_cookie(&token.value)), Redirect::to(HOME_PATH)).into_response()
        }
        Ok(None) => {
            metrics::record_login_attempt("failure", start.elapsed());
            let mut errors = FormErrors::default();
            errors.add("__all__", INVALID_CREDENTIALS);
            form_page(StatusCode::UNAUTHORIZED, echo, &errors)
        }
        Err(err) => {
            metrics::record_login_attempt("error", start.elapsed());
            error!("Login failed: {:#}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn logout(
    State(user_manager): State<GuardedUserManager>,
    session: Option<Session>,
    jar: CookieJar,
) -> Response {
    if let Some(session) = session {
        if let Err(err) = user_manager.logout(&AuthTokenValue(session.token)) {
            error!("Failed to delete session of user {}: {:#}", session.user_id, err);
        }
    }
    (jar.add(expired_session_cookie()), Redirect::to(LOGIN_PATH)).into_response()
}

pub fn make_auth_routes(state: ServerState) -> Router {
    Router::new()
        .route("/signup/", get(get_signup).post(post_signup))
        .route("/login/", get(get_login).post(post_login))
        .route("/logout/", get(logout))
        .with_state(state)
}
