//! In-process fake of the polls admin site
//!
//! `FakeBrowser` implements the browser trait by rendering a tiny model of
//! each admin page as a flat list of elements. It follows the same rules
//! the scenarios rely on: staff-only login, the add-user flow, the
//! permission picker, and view-only change lists and detail pages.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use polls_e2e::browser::{Browser, ElementRef, Launcher};
use polls_e2e::fixtures::{Fixtures, QuestionRecord, TestFixtureUser};
use polls_e2e::locator::{xpath_literal, Locator};
use polls_e2e::{E2eError, E2eResult};

pub const BASE_URL: &str = "http://testserver";

pub const VIEW_QUESTION: &str = "Polls | question | Can view question";
pub const ADD_QUESTION: &str = "Polls | question | Can add question";
pub const CHANGE_QUESTION: &str = "Polls | question | Can change question";
pub const DELETE_QUESTION: &str = "Polls | question | Can delete question";
pub const VIEW_USER: &str = "Authentication and Authorization | user | Can view user";

const ALL_PERMISSIONS: [&str; 5] = [
    VIEW_USER,
    ADD_QUESTION,
    CHANGE_QUESTION,
    DELETE_QUESTION,
    VIEW_QUESTION,
];

#[derive(Debug, Clone, Default)]
pub struct FakeUser {
    pub password: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub permissions: BTreeSet<String>,
}

impl FakeUser {
    fn has(&self, permission: &str) -> bool {
        self.is_superuser || self.permissions.contains(permission)
    }

    fn sees_questions(&self) -> bool {
        [VIEW_QUESTION, ADD_QUESTION, CHANGE_QUESTION, DELETE_QUESTION]
            .iter()
            .any(|p| self.has(p))
    }
}

/// Database and behaviour switches shared by every fake browser
#[derive(Debug, Default)]
pub struct SiteState {
    pub users: BTreeMap<String, FakeUser>,
    pub questions: BTreeMap<u64, QuestionRecord>,
    pub next_question_id: u64,
    /// Rows removed through the fixture interface, kept for inspection
    pub deleted_users: BTreeMap<String, FakeUser>,
    pub deleted_questions: Vec<QuestionRecord>,
    /// Paths visited by any browser, in order
    pub visits: Vec<String>,
    pub launched: usize,
    pub quits: usize,
    /// Render detail pages without a delete button
    pub omit_delete_button: bool,
    /// Enable the save button for view-only users
    pub broken_save_permission: bool,
    /// Pick the wrong option in the permission picker
    pub sticky_extra_permission: Option<String>,
    /// Fail WebDriver launches
    pub driver_down: bool,
    /// Clearing a text input leaves its value in place
    pub ignore_clear: bool,
}

#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<Mutex<SiteState>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().unwrap()
    }

    pub fn browser(&self) -> FakeBrowser {
        FakeBrowser::new(self.clone())
    }

    pub fn user(&self, username: &str) -> Option<FakeUser> {
        self.state().users.get(username).cloned()
    }

    /// The account as it was when the fixture interface deleted it
    pub fn deleted_user(&self, username: &str) -> Option<FakeUser> {
        self.state().deleted_users.get(username).cloned()
    }

    pub fn usernames(&self) -> Vec<String> {
        self.state().users.keys().cloned().collect()
    }

    pub fn visited(&self, fragment: &str) -> bool {
        self.state().visits.iter().any(|v| v.contains(fragment))
    }
}

#[async_trait]
impl Fixtures for FakeSite {
    async fn create_user(&self, user: &TestFixtureUser) -> E2eResult<()> {
        self.state().users.insert(
            user.username.clone(),
            FakeUser {
                password: user.password.clone(),
                is_staff: user.is_staff,
                is_superuser: user.is_superuser,
                permissions: BTreeSet::new(),
            },
        );
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> E2eResult<()> {
        let mut state = self.state();
        if let Some(user) = state.users.remove(username) {
            state.deleted_users.insert(username.to_string(), user);
        }
        Ok(())
    }

    async fn create_question(&self, question: &QuestionRecord) -> E2eResult<u64> {
        let mut state = self.state();
        state.next_question_id += 1;
        let id = state.next_question_id;
        state.questions.insert(id, question.clone());
        Ok(id)
    }

    async fn delete_question(&self, id: u64) -> E2eResult<()> {
        let mut state = self.state();
        if let Some(question) = state.questions.remove(&id) {
            state.deleted_questions.push(question);
        }
        Ok(())
    }
}

#[async_trait]
impl Launcher for FakeSite {
    type Browser = FakeBrowser;

    async fn launch(&self) -> E2eResult<FakeBrowser> {
        let mut state = self.state();
        if state.driver_down {
            return Err(E2eError::DriverUnavailable("fake".to_string()));
        }
        state.launched += 1;
        drop(state);
        Ok(self.browser())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Page {
    Blank,
    Login { error: bool },
    Index,
    UserAdd,
    UserChange(String),
    UserList,
    LoggedOut,
    QuestionList,
    QuestionDetail(u64),
    Forbidden,
}

#[derive(Debug, Clone, PartialEq)]
enum Action {
    None,
    SubmitLogin,
    ContinueUserAdd,
    ToggleStaff,
    AddPermissions,
    SaveUser,
    Logout,
    Follow(String),
}

#[derive(Debug, Clone)]
struct Element {
    handle: String,
    parent: Option<String>,
    locators: Vec<Locator>,
    text: String,
    value: Option<String>,
    enabled: bool,
    selected: bool,
    action: Action,
}

/// Edits pending on the user change form
#[derive(Debug, Default)]
struct UserForm {
    staff: bool,
    highlighted: BTreeSet<String>,
    chosen: BTreeSet<String>,
}

pub struct FakeBrowser {
    site: FakeSite,
    page: Page,
    elements: Vec<Element>,
    generation: usize,
    session_user: Option<String>,
    form: UserForm,
    flash: Option<String>,
    closed: bool,
}

impl FakeBrowser {
    fn new(site: FakeSite) -> Self {
        Self {
            site,
            page: Page::Blank,
            elements: Vec::new(),
            generation: 0,
            session_user: None,
            form: UserForm::default(),
            flash: None,
            closed: false,
        }
    }

    pub fn session_user(&self) -> Option<&str> {
        self.session_user.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn current_user(&self) -> Option<FakeUser> {
        self.session_user.as_deref().and_then(|u| self.site.user(u))
    }

    fn ensure_open(&self) -> E2eResult<()> {
        if self.closed {
            Err(E2eError::WebDriver("invalid session id: session closed".to_string()))
        } else {
            Ok(())
        }
    }

    fn path_of(page: &Page) -> String {
        match page {
            Page::Blank => "about:blank".to_string(),
            Page::Login { .. } => "/admin/login/".to_string(),
            Page::Index => "/admin/".to_string(),
            Page::UserAdd => "/admin/auth/user/add/".to_string(),
            Page::UserChange(name) => format!("/admin/auth/user/{}/change/", name),
            Page::UserList => "/admin/auth/user/".to_string(),
            Page::LoggedOut => "/admin/logout/".to_string(),
            Page::QuestionList => "/admin/polls/question/".to_string(),
            Page::QuestionDetail(id) => format!("/admin/polls/question/{}/change/", id),
            Page::Forbidden => "/admin/forbidden/".to_string(),
        }
    }

    fn show(&mut self, page: Page) {
        self.site.state().visits.push(Self::path_of(&page));
        self.page = page;
        self.render();
    }

    fn route(&self, path: &str) -> Page {
        let user = self.current_user();
        let staff = user.as_ref().map(|u| u.is_staff).unwrap_or(false);
        let superuser = user.as_ref().map(|u| u.is_superuser).unwrap_or(false);
        let sees_questions = user.as_ref().map(|u| u.sees_questions()).unwrap_or(false);

        match path {
            "/admin/login/" => Page::Login { error: false },
            "/admin/logout/" => Page::LoggedOut,
            _ if !staff => Page::Login { error: false },
            "/admin/" => Page::Index,
            "/admin/auth/user/add/" if superuser => Page::UserAdd,
            "/admin/auth/user/" if superuser => Page::UserList,
            "/admin/polls/question/" if sees_questions => Page::QuestionList,
            other => {
                let detail = other
                    .strip_prefix("/admin/polls/question/")
                    .and_then(|rest| rest.strip_suffix("/change/"))
                    .and_then(|id| id.parse::<u64>().ok());
                match detail {
                    Some(id) => Page::QuestionDetail(id),
                    None => Page::Forbidden,
                }
            }
        }
    }

    fn push(
        &mut self,
        parent: Option<&str>,
        locators: Vec<Locator>,
        text: &str,
        action: Action,
    ) -> String {
        let handle = format!("g{}-e{}", self.generation, self.elements.len());
        self.elements.push(Element {
            handle: handle.clone(),
            parent: parent.map(str::to_string),
            locators,
            text: text.to_string(),
            value: None,
            enabled: true,
            selected: false,
            action,
        });
        handle
    }

    fn last(&mut self) -> &mut Element {
        self.elements.last_mut().unwrap()
    }

    fn input(&mut self, name: &str) {
        self.push(None, vec![Locator::name(name)], "", Action::None);
        self.last().value = Some(String::new());
    }

    fn heading(&mut self, text: &str) {
        self.push(None, vec![Locator::tag_name("h1")], text, Action::None);
    }

    fn link(&mut self, parent: Option<&str>, text: &str, path: &str) {
        self.push(
            parent,
            vec![Locator::link_text(text)],
            text,
            Action::Follow(path.to_string()),
        );
    }

    fn logout_form(&mut self) {
        let form = self.push(None, vec![Locator::id("logout-form")], "", Action::None);
        self.push(Some(&form), vec![Locator::xpath(".//button")], "Log out", Action::Logout);
    }

    fn render(&mut self) {
        self.generation += 1;
        self.elements.clear();
        let user = self.current_user();

        match self.page.clone() {
            Page::Blank | Page::Forbidden => {}
            Page::Login { error } => {
                self.heading("Django administration");
                if error {
                    self.push(
                        None,
                        vec![Locator::class_name("errornote")],
                        "Please enter the correct username and password",
                        Action::None,
                    );
                }
                self.input("username");
                self.input("password");
                let submit = Locator::xpath(r#"//input[@value="Log in"]"#);
                self.push(None, vec![submit], "", Action::SubmitLogin);
            }
            Page::LoggedOut => {
                self.heading("Logged out");
            }
            Page::Index => {
                self.heading("Site administration");
                self.logout_form();
                let user = user.unwrap_or_default();
                if user.sees_questions() {
                    self.link(None, "Questions", "/admin/polls/question/");
                }
                if user.is_superuser {
                    self.link(None, "Users", "/admin/auth/user/");
                }
            }
            Page::UserAdd => {
                self.heading("Add user");
                self.logout_form();
                self.input("username");
                self.input("password1");
                self.input("password2");
                self.push(None, vec![Locator::name("_continue")], "", Action::ContinueUserAdd);
            }
            Page::UserChange(name) => {
                self.heading(&format!("Change user {}", name));
                self.logout_form();
                let staff = self.form.staff;
                self.push(None, vec![Locator::name("is_staff")], "", Action::ToggleStaff);
                self.last().selected = staff;

                let from_locator = Locator::id("id_user_permissions_from");
                let from = self.push(None, vec![from_locator], "", Action::None);
                let available: Vec<String> = ALL_PERMISSIONS
                    .iter()
                    .filter(|p| !self.form.chosen.contains(**p))
                    .map(|p| p.to_string())
                    .collect();
                for permission in available {
                    let highlighted = self.form.highlighted.contains(&permission);
                    let option = option_locator(&permission);
                    self.push(Some(&from), vec![option], &permission, Action::None);
                    self.last().selected = highlighted;
                }
                let add_link = Locator::id("id_user_permissions_add_link");
                self.push(None, vec![add_link], "Choose", Action::AddPermissions);

                let to_locator = Locator::id("id_user_permissions_to");
                let to = self.push(None, vec![to_locator], "", Action::None);
                let chosen: Vec<String> = self.form.chosen.iter().cloned().collect();
                for permission in chosen {
                    let option = option_locator(&permission);
                    self.push(Some(&to), vec![option], &permission, Action::None);
                }
                self.push(None, vec![Locator::name("_save")], "", Action::SaveUser);
            }
            Page::UserList => {
                self.heading("Select user to change");
                self.logout_form();
                if let Some(message) = self.flash.take() {
                    let success = Locator::class_name("success");
                    self.push(None, vec![success], &message, Action::None);
                }
                let names: Vec<String> = self.site.state().users.keys().cloned().collect();
                for name in names {
                    self.push(
                        None,
                        vec![
                            Locator::link_text(name.clone()),
                            Locator::xpath(format!("//a[text()={}]", xpath_literal(&name))),
                        ],
                        &name,
                        Action::None,
                    );
                }
            }
            Page::QuestionList => {
                let user = user.unwrap_or_default();
                let heading = if user.has(CHANGE_QUESTION) {
                    "Select question to change"
                } else {
                    "Select question to view"
                };
                self.heading(heading);
                self.logout_form();
                let questions: Vec<(u64, String)> = self
                    .site
                    .state()
                    .questions
                    .iter()
                    .map(|(id, q)| (*id, q.text.clone()))
                    .collect();
                for (id, text) in questions {
                    let row_locator = Locator::css("#result_list tbody tr");
                    let row = self.push(None, vec![row_locator], "", Action::None);
                    let path = format!("/admin/polls/question/{}/change/", id);
                    self.link(Some(&row), &text, &path);
                }
            }
            Page::QuestionDetail(id) => {
                let user = user.unwrap_or_default();
                let (omit_delete, broken_save) = {
                    let state = self.site.state();
                    (state.omit_delete_button, state.broken_save_permission)
                };
                let text = self
                    .site
                    .state()
                    .questions
                    .get(&id)
                    .map(|q| q.text.clone())
                    .unwrap_or_default();
                let can_change = user.has(CHANGE_QUESTION) || broken_save;

                let heading = if can_change { "Change question" } else { "View question" };
                self.heading(heading);
                self.logout_form();
                self.input("question_text");
                self.last().value = Some(text);
                if !omit_delete {
                    let delete = Locator::css(r#"button[name="delete"]"#);
                    self.push(None, vec![delete], "Delete", Action::None);
                    self.last().enabled = user.has(DELETE_QUESTION);
                }
                let save = Locator::xpath(r#"//input[@value="Save"]"#);
                self.push(None, vec![save], "", Action::None);
                self.last().enabled = can_change;
            }
        }
    }

    fn element(&self, element: &ElementRef) -> E2eResult<&Element> {
        self.ensure_open()?;
        self.elements
            .iter()
            .find(|e| e.handle == element.0)
            .ok_or_else(|| E2eError::WebDriver(format!("stale element reference: {}", element.0)))
    }

    fn element_mut(&mut self, element: &ElementRef) -> E2eResult<&mut Element> {
        self.ensure_open()?;
        self.elements
            .iter_mut()
            .find(|e| e.handle == element.0)
            .ok_or_else(|| E2eError::WebDriver(format!("stale element reference: {}", element.0)))
    }

    fn field(&self, locator: &Locator) -> String {
        self.elements
            .iter()
            .find(|e| e.locators.contains(locator))
            .and_then(|e| e.value.clone())
            .unwrap_or_default()
    }

    fn perform(&mut self, action: Action) {
        match action {
            Action::None => {}
            Action::Follow(path) => {
                let page = self.route(&path);
                self.show(page);
            }
            Action::SubmitLogin => {
                let username = self.field(&Locator::name("username"));
                let password = self.field(&Locator::name("password"));
                let ok = self
                    .site
                    .user(&username)
                    .map(|u| u.password == password && u.is_staff)
                    .unwrap_or(false);
                if ok {
                    self.session_user = Some(username);
                    self.show(Page::Index);
                } else {
                    self.show(Page::Login { error: true });
                }
            }
            Action::ContinueUserAdd => {
                let username = self.field(&Locator::name("username"));
                let password1 = self.field(&Locator::name("password1"));
                let password2 = self.field(&Locator::name("password2"));
                let exists = self.site.state().users.contains_key(&username);
                if username.is_empty() || exists || password1 != password2 {
                    self.show(Page::UserAdd);
                    return;
                }
                self.site.state().users.insert(
                    username.clone(),
                    FakeUser {
                        password: password1,
                        ..Default::default()
                    },
                );
                self.form = UserForm::default();
                self.show(Page::UserChange(username));
            }
            Action::ToggleStaff => {
                self.form.staff = !self.form.staff;
                self.render();
            }
            Action::AddPermissions => {
                let mut moved: BTreeSet<String> = std::mem::take(&mut self.form.highlighted);
                if let Some(extra) = self.site.state().sticky_extra_permission.clone() {
                    moved.insert(extra);
                }
                self.form.chosen.extend(moved);
                self.render();
            }
            Action::SaveUser => {
                if let Page::UserChange(name) = self.page.clone() {
                    if let Some(user) = self.site.state().users.get_mut(&name) {
                        user.is_staff = self.form.staff;
                        user.permissions = self.form.chosen.clone();
                    }
                    self.flash = Some(format!("The user “{}” was changed successfully.", name));
                    self.show(Page::UserList);
                }
            }
            Action::Logout => {
                self.session_user = None;
                self.show(Page::LoggedOut);
            }
        }
    }
}

fn option_locator(text: &str) -> Locator {
    Locator::xpath(format!(".//option[normalize-space(.) = {}]", xpath_literal(text)))
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn goto(&mut self, url: &str) -> E2eResult<()> {
        self.ensure_open()?;
        let path = url.strip_prefix(BASE_URL).unwrap_or(url);
        if path == "/admin/logout/" {
            self.session_user = None;
        }
        let page = self.route(path);
        self.show(page);
        Ok(())
    }

    async fn current_url(&mut self) -> E2eResult<String> {
        self.ensure_open()?;
        Ok(format!("{}{}", BASE_URL, Self::path_of(&self.page)))
    }

    async fn find(&mut self, locator: &Locator) -> E2eResult<ElementRef> {
        self.ensure_open()?;
        self.elements
            .iter()
            .find(|e| e.locators.contains(locator))
            .map(|e| ElementRef::new(e.handle.clone()))
            .ok_or_else(|| E2eError::ElementNotFound(locator.clone()))
    }

    async fn find_all(&mut self, locator: &Locator) -> E2eResult<Vec<ElementRef>> {
        self.ensure_open()?;
        Ok(self
            .elements
            .iter()
            .filter(|e| e.locators.contains(locator))
            .map(|e| ElementRef::new(e.handle.clone()))
            .collect())
    }

    async fn find_in(&mut self, parent: &ElementRef, locator: &Locator) -> E2eResult<ElementRef> {
        self.element(parent)?;
        self.elements
            .iter()
            .find(|e| {
                e.parent.as_deref() == Some(parent.as_str()) && e.locators.contains(locator)
            })
            .map(|e| ElementRef::new(e.handle.clone()))
            .ok_or_else(|| E2eError::ElementNotFound(locator.clone()))
    }

    async fn text(&mut self, element: &ElementRef) -> E2eResult<String> {
        Ok(self.element(element)?.text.clone())
    }

    async fn attribute(&mut self, element: &ElementRef, name: &str) -> E2eResult<Option<String>> {
        let element = self.element(element)?;
        Ok(match name {
            "value" => element.value.clone(),
            _ => None,
        })
    }

    async fn property(&mut self, element: &ElementRef, name: &str) -> E2eResult<Option<String>> {
        self.attribute(element, name).await
    }

    async fn is_enabled(&mut self, element: &ElementRef) -> E2eResult<bool> {
        Ok(self.element(element)?.enabled)
    }

    async fn is_selected(&mut self, element: &ElementRef) -> E2eResult<bool> {
        Ok(self.element(element)?.selected)
    }

    async fn clear(&mut self, element: &ElementRef) -> E2eResult<()> {
        if self.site.state().ignore_clear {
            return self.element(element).map(|_| ());
        }
        let element = self.element_mut(element)?;
        if element.value.is_some() {
            element.value = Some(String::new());
        }
        Ok(())
    }

    async fn send_keys(&mut self, element: &ElementRef, text: &str) -> E2eResult<()> {
        let element = self.element_mut(element)?;
        match element.value.as_mut() {
            Some(value) => {
                value.push_str(text);
                Ok(())
            }
            None => Err(E2eError::WebDriver("element not interactable".to_string())),
        }
    }

    async fn click(&mut self, element: &ElementRef) -> E2eResult<()> {
        let action = self.element(element)?.action.clone();
        self.perform(action);
        Ok(())
    }

    async fn select_by_visible_text(&mut self, select: &ElementRef, text: &str) -> E2eResult<()> {
        let option = self.find_in(select, &option_locator(text)).await?;
        self.element_mut(&option)?.selected = true;
        self.form.highlighted.insert(text.to_string());
        Ok(())
    }

    async fn option_texts(&mut self, select: &ElementRef) -> E2eResult<Vec<String>> {
        self.element(select)?;
        Ok(self
            .elements
            .iter()
            .filter(|e| e.parent.as_deref() == Some(select.as_str()))
            .map(|e| e.text.clone())
            .collect())
    }

    async fn quit(&mut self) -> E2eResult<()> {
        if !self.closed {
            self.closed = true;
            self.site.state().quits += 1;
        }
        Ok(())
    }
}
