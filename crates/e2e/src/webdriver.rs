//! WebDriver backend built on `fantoccini`
//!
//! One [`WebDriverSession`] owns exactly one browser session on geckodriver
//! or chromedriver; [`Browser::quit`] releases it.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::{CmdError, NewSessionError};
use fantoccini::wd::TimeoutConfiguration;
use fantoccini::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::browser::{Browser, ElementRef, Launcher};
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Firefox,
    Chrome,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Firefox => "firefox",
            BrowserKind::Chrome => "chrome",
        }
    }
}

impl std::str::FromStr for BrowserKind {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "firefox" | "gecko" => Ok(BrowserKind::Firefox),
            "chrome" | "chromium" => Ok(BrowserKind::Chrome),
            other => Err(E2eError::WebDriver(format!("unsupported browser '{}'", other))),
        }
    }
}

/// Configuration for the WebDriver connection
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// Base URL of the running driver (geckodriver defaults to port 4444)
    pub endpoint: String,
    pub browser: BrowserKind,
    pub headless: bool,
    /// How long element lookups wait before reporting a missing element
    pub implicit_wait: Duration,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:4444".to_string(),
            browser: BrowserKind::Firefox,
            headless: true,
            implicit_wait: Duration::from_secs(5),
            window_width: 1280,
            window_height: 720,
        }
    }
}

/// An open browser session on a WebDriver server
pub struct WebDriverSession {
    client: Option<Client>,
    /// Elements handed out through [`ElementRef`]s
    elements: HashMap<String, Element>,
    next_element: usize,
}

impl WebDriverSession {
    /// Open a session and apply the implicit wait
    pub async fn connect(config: &WebDriverConfig) -> E2eResult<Self> {
        let client = ClientBuilder::native()
            .capabilities(capabilities(config))
            .connect(&config.endpoint)
            .await
            .map_err(|e| match e {
                NewSessionError::Failed(_) | NewSessionError::Lost(_) => {
                    E2eError::DriverUnavailable(config.endpoint.clone())
                }
                other => E2eError::NewSession(other),
            })?;
        info!("Opened {} session on {}", config.browser.as_str(), config.endpoint);

        let session = Self {
            client: Some(client),
            elements: HashMap::new(),
            next_element: 0,
        };

        let client = session.client()?;
        client
            .update_timeouts(TimeoutConfiguration::new(None, None, Some(config.implicit_wait)))
            .await?;

        // Not every driver supports resizing a headless window
        if let Err(e) = client
            .set_window_size(config.window_width, config.window_height)
            .await
        {
            warn!("Could not resize browser window: {}", e);
        }

        Ok(session)
    }

    fn client(&self) -> E2eResult<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| E2eError::WebDriver("browser session already closed".to_string()))
    }

    fn element(&self, element: &ElementRef) -> E2eResult<&Element> {
        self.elements
            .get(element.as_str())
            .ok_or_else(|| E2eError::WebDriver(format!("unknown element {}", element.as_str())))
    }

    fn register(&mut self, element: Element) -> ElementRef {
        let handle = format!("e{}", self.next_element);
        self.next_element += 1;
        self.elements.insert(handle.clone(), element);
        ElementRef::new(handle)
    }

    /// Release the references of the previous page after navigation
    fn forget_elements(&mut self) {
        self.elements.clear();
    }
}

/// Map a lookup failure to `ElementNotFound` when nothing matched
fn lookup_error(locator: &Locator, err: CmdError) -> E2eError {
    if err.is_no_such_element() {
        E2eError::ElementNotFound(locator.clone())
    } else {
        E2eError::Command(err)
    }
}

fn to_wd<'a>(strategy: &'a (&'static str, String)) -> fantoccini::Locator<'a> {
    let (using, value) = strategy;
    match *using {
        "xpath" => fantoccini::Locator::XPath(value),
        "link text" => fantoccini::Locator::LinkText(value),
        _ => fantoccini::Locator::Css(value),
    }
}

#[async_trait]
impl Browser for WebDriverSession {
    async fn goto(&mut self, url: &str) -> E2eResult<()> {
        debug!("Navigating to {}", url);
        self.forget_elements();
        self.client()?.goto(url).await?;
        Ok(())
    }

    async fn current_url(&mut self) -> E2eResult<String> {
        Ok(self.client()?.current_url().await?.to_string())
    }

    async fn find(&mut self, locator: &Locator) -> E2eResult<ElementRef> {
        let strategy = locator.strategy();
        let found = self
            .client()?
            .find(to_wd(&strategy))
            .await
            .map_err(|e| lookup_error(locator, e))?;
        Ok(self.register(found))
    }

    async fn find_all(&mut self, locator: &Locator) -> E2eResult<Vec<ElementRef>> {
        let strategy = locator.strategy();
        let found = self.client()?.find_all(to_wd(&strategy)).await?;
        Ok(found.into_iter().map(|e| self.register(e)).collect())
    }

    async fn find_in(&mut self, parent: &ElementRef, locator: &Locator) -> E2eResult<ElementRef> {
        let strategy = locator.strategy();
        let found = self
            .element(parent)?
            .find(to_wd(&strategy))
            .await
            .map_err(|e| lookup_error(locator, e))?;
        Ok(self.register(found))
    }

    async fn text(&mut self, element: &ElementRef) -> E2eResult<String> {
        Ok(self.element(element)?.text().await?)
    }

    async fn attribute(&mut self, element: &ElementRef, name: &str) -> E2eResult<Option<String>> {
        Ok(self.element(element)?.attr(name).await?)
    }

    async fn property(&mut self, element: &ElementRef, name: &str) -> E2eResult<Option<String>> {
        Ok(self.element(element)?.prop(name).await?)
    }

    async fn is_enabled(&mut self, element: &ElementRef) -> E2eResult<bool> {
        Ok(self.element(element)?.is_enabled().await?)
    }

    async fn is_selected(&mut self, element: &ElementRef) -> E2eResult<bool> {
        Ok(self.element(element)?.is_selected().await?)
    }

    async fn clear(&mut self, element: &ElementRef) -> E2eResult<()> {
        Ok(self.element(element)?.clear().await?)
    }

    async fn send_keys(&mut self, element: &ElementRef, text: &str) -> E2eResult<()> {
        Ok(self.element(element)?.send_keys(text).await?)
    }

    async fn click(&mut self, element: &ElementRef) -> E2eResult<()> {
        Ok(self.element(element)?.click().await?)
    }

    async fn select_by_visible_text(&mut self, select: &ElementRef, text: &str) -> E2eResult<()> {
        let select = self.element(select)?;
        select.select_by_label(text).await.map_err(|e| {
            if e.is_no_such_element() {
                E2eError::ElementNotFound(Locator::xpath(format!(
                    ".//option[normalize-space(.) = {}]",
                    crate::locator::xpath_literal(text)
                )))
            } else {
                E2eError::Command(e)
            }
        })
    }

    async fn option_texts(&mut self, select: &ElementRef) -> E2eResult<Vec<String>> {
        let options = self
            .element(select)?
            .find_all(fantoccini::Locator::Css("option"))
            .await?;

        let mut texts = Vec::with_capacity(options.len());
        for option in &options {
            texts.push(option.text().await?);
        }
        Ok(texts)
    }

    async fn quit(&mut self) -> E2eResult<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        self.forget_elements();
        info!("Closing browser session");
        client.close().await?;
        Ok(())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if self.client.is_some() {
            warn!("Browser session dropped without quit; the driver may still hold it");
        }
    }
}

#[async_trait]
impl Launcher for WebDriverConfig {
    type Browser = WebDriverSession;

    async fn launch(&self) -> E2eResult<WebDriverSession> {
        WebDriverSession::connect(self).await
    }
}

/// Browser-specific capabilities for the new-session request
fn capabilities(config: &WebDriverConfig) -> Map<String, Value> {
    let mut caps = Map::new();

    match config.browser {
        BrowserKind::Firefox => {
            let args: Vec<&str> = if config.headless { vec!["-headless"] } else { vec![] };
            caps.insert("browserName".to_string(), json!("firefox"));
            caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
        }
        BrowserKind::Chrome => {
            let mut args = vec![format!(
                "--window-size={},{}",
                config.window_width, config.window_height
            )];
            if config.headless {
                args.push("--headless=new".to_string());
            }
            caps.insert("browserName".to_string(), json!("chrome"));
            caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        }
    }

    caps
}
