//! Browser capability interface
//!
//! Everything the scenarios need from a browser: navigate, find, read and
//! act. The WebDriver backend implements it for real browsers; tests
//! implement it over an in-process fake of the admin site.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;
use crate::locator::Locator;

/// Opaque handle to an element returned by a [`Browser`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait Browser: Send {
    /// Load a URL and wait for the document to be ready
    async fn goto(&mut self, url: &str) -> E2eResult<()>;

    async fn current_url(&mut self) -> E2eResult<String>;

    /// Find one element, failing with `ElementNotFound` once the implicit
    /// wait expires
    async fn find(&mut self, locator: &Locator) -> E2eResult<ElementRef>;

    /// Find all matching elements; an empty list is not an error
    async fn find_all(&mut self, locator: &Locator) -> E2eResult<Vec<ElementRef>>;

    /// Find one element below `parent`
    async fn find_in(&mut self, parent: &ElementRef, locator: &Locator) -> E2eResult<ElementRef>;

    /// Rendered text of the element
    async fn text(&mut self, element: &ElementRef) -> E2eResult<String>;

    /// HTML attribute value, `None` when absent
    async fn attribute(&mut self, element: &ElementRef, name: &str) -> E2eResult<Option<String>>;

    /// DOM property value (e.g. the live `value` of an input), `None` when null
    async fn property(&mut self, element: &ElementRef, name: &str) -> E2eResult<Option<String>>;

    async fn is_enabled(&mut self, element: &ElementRef) -> E2eResult<bool>;

    async fn is_selected(&mut self, element: &ElementRef) -> E2eResult<bool>;

    async fn clear(&mut self, element: &ElementRef) -> E2eResult<()>;

    async fn send_keys(&mut self, element: &ElementRef, text: &str) -> E2eResult<()>;

    async fn click(&mut self, element: &ElementRef) -> E2eResult<()>;

    /// Select the `<option>` of a `<select>` whose visible text equals `text`
    async fn select_by_visible_text(&mut self, select: &ElementRef, text: &str) -> E2eResult<()>;

    /// Visible texts of every `<option>` inside a `<select>`
    async fn option_texts(&mut self, select: &ElementRef) -> E2eResult<Vec<String>>;

    /// End the browser session. Calling it twice is a no-op.
    async fn quit(&mut self) -> E2eResult<()>;
}

/// Starts a fresh browser session for each scenario
#[async_trait]
pub trait Launcher: Send + Sync {
    type Browser: Browser;

    async fn launch(&self) -> E2eResult<Self::Browser>;
}
