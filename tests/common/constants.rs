//! Shared constants for end-to-end tests
//!
//! When test users or the fixture classifier change, update only this file.

// ============================================================================
// Test User Credentials
// ============================================================================

/// Pre-seeded user handle
pub const TEST_USER: &str = "testuser";

/// Pre-seeded user email
pub const TEST_EMAIL: &str = "testuser@example.com";

/// Pre-seeded user password
pub const TEST_PASS: &str = "testpass123";

/// Second pre-seeded user, used to check per-user isolation
pub const OTHER_USER: &str = "otheruser";

pub const OTHER_EMAIL: &str = "otheruser@example.com";

pub const OTHER_PASS: &str = "otherpass123";

// ============================================================================
// Fixture Classifier
// ============================================================================

/// Label the fixture classifier always predicts
pub const PREDICTED_GENRE: &str = "jazz";

/// Every label known to the fixture classifier
pub const CLASSIFIER_CLASSES: [&str; 3] = ["jazz", "metal", "classical"];

/// Length of the clips produced by the fake transcoder and capture device
pub const FIXTURE_CLIP_SECONDS: f32 = 1.0;

// ============================================================================
// Timeouts
// ============================================================================

/// Max time to wait for the server to answer its first request
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between readiness polls
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Per-request timeout for the test client
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
