//! Polls admin E2E test framework
//!
//! This crate drives a real browser through the Django admin of the polls
//! site to prove that a view-only account cannot change or delete
//! questions. It:
//! - Spawns the Django development server against a throwaway database
//! - Provisions fixture users and questions through `manage.py shell`
//! - Controls the browser over WebDriver with `fantoccini`
//! - Parses declarative YAML scenario files
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ScenarioRunner<Fixtures, Launcher>          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  run_permission_scenario(config) -> ScenarioResult          │
//! │    ├── provision admin (Fixtures, once), clear account      │
//! │    ├── launch browser (Launcher) -> AdminSession<Browser>   │
//! │    ├── login / create user / verify / logout                │
//! │    ├── login restricted / heading / rows / detail checks    │
//! │    ├── quit browser (always)                                │
//! │    └── delete seeded questions and restricted account       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Browser trait: navigate, find, read, act                   │
//! │    └── WebDriverSession (geckodriver / chromedriver)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioConfig (YAML)                                      │
//! │    ├── admin, restricted {username, password, permission}   │
//! │    ├── seed_questions, target_record_label                  │
//! │    ├── expected_heading, empty_list_policy                  │
//! │    └── missing_detail_policy (tolerate | fail)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod admin;
pub mod browser;
pub mod database;
pub mod error;
pub mod fixtures;
pub mod locator;
pub mod runner;
pub mod scenario;
pub mod server;
pub mod webdriver;

pub use admin::{AdminSession, SessionState};
pub use browser::{Browser, ElementRef, Launcher};
pub use database::TestDatabase;
pub use error::{E2eError, E2eResult};
pub use fixtures::{DjangoShell, Fixtures, QuestionRecord, TestFixtureUser};
pub use locator::Locator;
pub use runner::{Outcome, ScenarioResult, ScenarioRunner, SuiteResult};
pub use scenario::{EmptyListPolicy, MissingDetailPolicy, ScenarioConfig};
