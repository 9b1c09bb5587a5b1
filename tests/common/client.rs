//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per route. Redirects are not followed so
//! tests can assert on the `Location` of every form submission.
//!
//! When routes or form fields change, update only this file.

use super::constants::*;
use reqwest::multipart::{Form, Part};
use reqwest::{redirect::Policy, Response, StatusCode};
use std::time::Duration;

/// HTTP test client with cookie-based session management
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    pub base_url: String,
}

impl TestClient {
    /// Creates an anonymous client.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    /// Creates a client logged in as [`TEST_USER`].
    ///
    /// # Panics
    ///
    /// Panics if the login is rejected.
    pub async fn authenticated(base_url: String) -> Self {
        Self::authenticated_as(base_url, TEST_USER, TEST_PASS).await
    }

    pub async fn authenticated_as(base_url: String, handle: &str, password: &str) -> Self {
        let client = Self::new(base_url);
        let response = client.login(handle, password).await;
        assert_eq!(
            response.status(),
            StatusCode::SEE_OTHER,
            "Login of {} failed: {:?}",
            handle,
            response.text().await
        );
        client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .unwrap_or_else(|e| panic!("GET {} failed: {}", path, e))
    }

    async fn post_form(&self, path: &str, fields: &[(&str, &str)]) -> Response {
        self.client
            .post(self.url(path))
            .form(fields)
            .send()
            .await
            .unwrap_or_else(|e| panic!("POST {} failed: {}", path, e))
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// GET /
    pub async fn get_status(&self) -> Response {
        self.get("/").await
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// POST /signup/
    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password1: &str,
        password2: &str,
    ) -> Response {
        self.post_form(
            "/signup/",
            &[
                ("username", username),
                ("email", email),
                ("password1", password1),
                ("password2", password2),
            ],
        )
        .await
    }

    /// GET /signup/
    pub async fn get_signup(&self) -> Response {
        self.get("/signup/").await
    }

    /// POST /login/
    pub async fn login(&self, username: &str, password: &str) -> Response {
        self.post_form("/login/", &[("username", username), ("password", password)])
            .await
    }

    /// GET /logout/
    pub async fn logout(&self) -> Response {
        self.get("/logout/").await
    }

    // ========================================================================
    // Home
    // ========================================================================

    /// GET /home/
    pub async fn get_home(&self) -> Response {
        self.get("/home/").await
    }

    /// POST /home/ with the review form
    pub async fn post_review(&self, message: &str) -> Response {
        self.post_form("/home/", &[("message", message)]).await
    }

    // ========================================================================
    // Prediction
    // ========================================================================

    /// GET /predict/
    pub async fn get_predict(&self) -> Response {
        self.get("/predict/").await
    }

    /// POST /predict/ with a file upload
    pub async fn predict_upload(&self, filename: &str, bytes: &[u8]) -> Response {
        let part = Part::bytes(bytes.to_vec()).file_name(filename.to_string());
        self.client
            .post(self.url("/predict/"))
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .expect("Upload request failed")
    }

    /// POST /predict/ the way a browser submits an untouched file input
    /// together with the record button.
    pub async fn predict_recording_with_empty_file_input(&self) -> Response {
        let empty_file = Part::bytes(Vec::new())
            .file_name(String::new())
            .mime_str("application/octet-stream")
            .expect("Valid mime type");
        let form = Form::new().part("file", empty_file).text("record", "1");
        self.client
            .post(self.url("/predict/"))
            .multipart(form)
            .send()
            .await
            .expect("Record request failed")
    }

    /// POST /predict/ asking for a live recording
    pub async fn predict_recording(&self) -> Response {
        self.post_form("/predict/", &[("record", "1")]).await
    }

    /// POST /predict/ with neither a file nor a recording request
    pub async fn predict_nothing(&self) -> Response {
        self.post_form("/predict/", &[]).await
    }

    /// GET /history/
    pub async fn get_history(&self) -> Response {
        self.get("/history/").await
    }

    /// POST /predictions/{id}/feedback/
    pub async fn send_feedback(&self, prediction_id: usize, correct: bool) -> Response {
        let correct = if correct { "true" } else { "false" };
        self.post_form(
            &format!("/predictions/{}/feedback/", prediction_id),
            &[("correct", correct)],
        )
        .await
    }
}

/// Returns the `Location` header of a redirect.
pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .expect("Response has no Location header")
        .to_str()
        .expect("Location is not valid UTF-8")
        .to_string()
}
