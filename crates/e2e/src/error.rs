//! Error types for E2E testing

use thiserror::Error;

use crate::locator::Locator;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server health check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("WebDriver not reachable at {0}. Start geckodriver or chromedriver first")]
    DriverUnavailable(String),

    #[error("WebDriver error: {0}")]
    WebDriver(String),

    #[error("Element not found: {0}")]
    ElementNotFound(Locator),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error(
        "Session already authenticated as '{current}', log out before logging in as '{requested}'"
    )]
    SessionConflict { current: String, requested: String },

    #[error("Fixture setup failed: {0}")]
    Fixture(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("WebDriver session could not be created: {0}")]
    NewSession(#[from] fantoccini::error::NewSessionError),

    #[error("WebDriver command failed: {0}")]
    Command(#[from] fantoccini::error::CmdError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// True when an expected interactive element was absent from the page.
    pub fn is_missing_element(&self) -> bool {
        matches!(self, E2eError::ElementNotFound(_))
    }

    pub(crate) fn assertion(message: impl Into<String>) -> Self {
        E2eError::AssertionFailed(message.into())
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
