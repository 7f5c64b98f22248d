//! Page objects for the Django admin site
//!
//! [`AdminSession`] wraps an explicit browser handle together with the
//! identity it is logged in as. Only one identity may be authenticated at a
//! time; switching accounts requires an explicit [`AdminSession::logout`].

use tracing::{debug, info};

use crate::browser::Browser;
use crate::error::{E2eError, E2eResult};
use crate::locator::{xpath_literal, Locator};
use crate::scenario::{AdminRoutes, RestrictedAccount};

/// Who the browser is currently logged in as
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticated(String),
}

pub struct AdminSession<B: Browser> {
    browser: B,
    base_url: String,
    routes: AdminRoutes,
    state: SessionState,
}

impl<B: Browser> AdminSession<B> {
    pub fn new(browser: B, base_url: impl Into<String>, routes: AdminRoutes) -> Self {
        Self {
            browser,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            routes,
            state: SessionState::Anonymous,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn browser_mut(&mut self) -> &mut B {
        &mut self.browser
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fill(&mut self, locator: Locator, text: &str) -> E2eResult<()> {
        let element = self.browser.find(&locator).await?;
        self.browser.send_keys(&element, text).await
    }

    async fn click(&mut self, locator: Locator) -> E2eResult<()> {
        let element = self.browser.find(&locator).await?;
        self.browser.click(&element).await
    }

    /// Log in through the admin login form and confirm the landing page is
    /// an authenticated one
    pub async fn login(&mut self, username: &str, password: &str) -> E2eResult<()> {
        if let SessionState::Authenticated(current) = &self.state {
            return Err(E2eError::SessionConflict {
                current: current.clone(),
                requested: username.to_string(),
            });
        }

        info!("Logging in as '{}'", username);
        let login_url = self.url(&self.routes.login);
        self.browser.goto(&login_url).await?;
        self.fill(Locator::name("username"), username).await?;
        self.fill(Locator::name("password"), password).await?;
        self.click(Locator::xpath(r#"//input[@value="Log in"]"#)).await?;

        // A rejected login re-renders the login form, which has no logout control
        let authenticated = match self.browser.find(&Locator::id("logout-form")).await {
            Ok(_) => true,
            Err(e) if e.is_missing_element() => false,
            Err(e) => return Err(e),
        };
        let landed = self.browser.current_url().await?;
        debug!("Login as '{}' landed on {}", username, landed);

        if authenticated && !landed.contains(&self.routes.login) {
            self.state = SessionState::Authenticated(username.to_string());
            Ok(())
        } else {
            Err(E2eError::assertion(format!(
                "login as '{}' did not reach an authenticated page (at {})",
                username, landed
            )))
        }
    }

    /// Log out with the logout control, then visit the logout endpoint
    pub async fn logout(&mut self) -> E2eResult<()> {
        if let SessionState::Authenticated(user) = &self.state {
            info!("Logging out '{}'", user);
        }

        let form = self.browser.find(&Locator::id("logout-form")).await?;
        let button = self.browser.find_in(&form, &Locator::xpath(".//button")).await?;
        self.browser.click(&button).await?;

        let logout_url = self.url(&self.routes.logout);
        self.browser.goto(&logout_url).await?;
        self.state = SessionState::Anonymous;
        Ok(())
    }

    /// Create `account` through the add-user form and grant it staff status
    /// plus exactly its one permission
    pub async fn create_restricted_user(&mut self, account: &RestrictedAccount) -> E2eResult<()> {
        info!("Creating user '{}' with '{}'", account.username, account.permission);

        let add_url = self.url(&self.routes.user_add);
        self.browser.goto(&add_url).await?;
        self.fill(Locator::name("username"), &account.username).await?;
        self.fill(Locator::name("password1"), &account.password).await?;
        self.fill(Locator::name("password2"), &account.password).await?;
        self.click(Locator::name("_continue")).await?;

        let staff = self.browser.find(&Locator::name("is_staff")).await?;
        if self.browser.is_selected(&staff).await? != account.staff {
            self.browser.click(&staff).await?;
        }

        let available = self.browser.find(&Locator::id("id_user_permissions_from")).await?;
        self.browser
            .select_by_visible_text(&available, &account.permission)
            .await?;
        self.click(Locator::id("id_user_permissions_add_link")).await?;

        let chosen = self.browser.find(&Locator::id("id_user_permissions_to")).await?;
        let granted = self.browser.option_texts(&chosen).await?;
        if granted != [account.permission.as_str()] {
            return Err(E2eError::assertion(format!(
                "user '{}' should hold only '{}', chosen permissions are {:?}",
                account.username, account.permission, granted
            )));
        }

        self.click(Locator::name("_save")).await?;

        let message = self.browser.find(&Locator::class_name("success")).await?;
        let message = self.browser.text(&message).await?;
        let expected = format!("The user “{}” was changed successfully.", account.username);
        if !message.contains(&expected) {
            return Err(E2eError::assertion(format!(
                "expected '{}' in success message, got '{}'",
                expected, message
            )));
        }
        Ok(())
    }

    /// Whether the user list links to `username`
    pub async fn user_listed(&mut self, username: &str) -> E2eResult<bool> {
        let list_url = self.url(&self.routes.user_list);
        self.browser.goto(&list_url).await?;

        let link = Locator::xpath(format!("//a[text()={}]", xpath_literal(username)));
        match self.browser.find(&link).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_missing_element() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Follow the admin index link to a model's change list
    pub async fn open_model_list(&mut self, link_text: &str) -> E2eResult<()> {
        self.click(Locator::link_text(link_text)).await
    }

    /// Text of the page's `<h1>`
    pub async fn heading(&mut self) -> E2eResult<String> {
        let heading = self.browser.find(&Locator::tag_name("h1")).await?;
        self.browser.text(&heading).await
    }

    /// Number of rows in the change list table
    pub async fn result_rows(&mut self) -> E2eResult<usize> {
        let rows = self
            .browser
            .find_all(&Locator::css("#result_list tbody tr"))
            .await?;
        debug!("Change list has {} row(s)", rows.len());
        Ok(rows.len())
    }

    /// Open a record from the change list by its link text
    pub async fn open_record(&mut self, label: &str) -> E2eResult<()> {
        self.click(Locator::link_text(label)).await
    }

    pub async fn delete_control_enabled(&mut self) -> E2eResult<bool> {
        let delete = self.browser.find(&Locator::css(r#"button[name="delete"]"#)).await?;
        self.browser.is_enabled(&delete).await
    }

    pub async fn save_control_enabled(&mut self) -> E2eResult<bool> {
        let save = self.browser.find(&Locator::xpath(r#"//input[@value="Save"]"#)).await?;
        self.browser.is_enabled(&save).await
    }

    /// Current value of a form field, as the browser sees it
    pub async fn field_value(&mut self, field: &str) -> E2eResult<String> {
        let input = self.browser.find(&Locator::name(field)).await?;
        match self.browser.property(&input, "value").await? {
            Some(value) => Ok(value),
            None => Ok(self.browser.attribute(&input, "value").await?.unwrap_or_default()),
        }
    }

    /// Clear a form field and type `text` into it
    pub async fn replace_field_text(&mut self, field: &str, text: &str) -> E2eResult<()> {
        let input = self.browser.find(&Locator::name(field)).await?;
        self.browser.clear(&input).await?;
        self.browser.send_keys(&input, text).await
    }
}
