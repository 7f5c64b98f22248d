//! Declarative YAML scenario configuration
//!
//! One file describes one permission scenario: who administers the site,
//! which restricted account gets created with which single permission, and
//! what the restricted account must (not) be able to do.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{E2eError, E2eResult};
use crate::fixtures::{QuestionRecord, TestFixtureUser};

/// A complete permission scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Unique name for this scenario
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Administrator provisioned before the browser starts
    #[serde(default = "TestFixtureUser::administrator")]
    pub admin: TestFixtureUser,

    /// Account created through the admin UI
    #[serde(default)]
    pub restricted: RestrictedAccount,

    /// Questions created once the administrator is logged in
    #[serde(default)]
    pub seed_questions: Vec<QuestionRecord>,

    /// Link on the admin index leading to the change list
    #[serde(default = "default_model_link")]
    pub model_link_text: String,

    /// Expected `<h1>` of the change list for a view-only user
    #[serde(default = "default_heading")]
    pub expected_heading: String,

    /// Visible label of the record opened in the detail view
    #[serde(default = "default_record_label")]
    pub target_record_label: String,

    /// Form field whose value must survive the edit attempt
    #[serde(default = "default_target_field")]
    pub target_field: String,

    /// Text typed into the field to attempt a change
    #[serde(default = "default_edit_text")]
    pub edit_text: String,

    #[serde(default)]
    pub empty_list_policy: EmptyListPolicy,

    /// What a missing detail-view element means. Deliberately has no
    /// default: each scenario has to state it.
    pub missing_detail_policy: MissingDetailPolicy,

    #[serde(default)]
    pub routes: AdminRoutes,
}

/// The secondary account and the one permission it is granted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestrictedAccount {
    pub username: String,
    pub password: String,
    /// Label of the permission as listed in the admin permission picker
    pub permission: String,
    #[serde(default = "default_true")]
    pub staff: bool,
}

impl Default for RestrictedAccount {
    fn default() -> Self {
        Self {
            username: "QuestionsR".to_string(),
            password: "A123456*".to_string(),
            permission: "Polls | question | Can view question".to_string(),
            staff: true,
        }
    }
}

/// Outcome when the change list has no rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyListPolicy {
    /// Nothing to check, report success without opening a record
    #[default]
    Pass,
    Fail,
}

/// Outcome when the record link or a detail-view control is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDetailPolicy {
    /// Missing detail elements end the scenario as a soft pass
    Tolerate,
    /// Missing detail elements fail the scenario
    Fail,
}

/// Paths of the admin site, relative to the server base URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminRoutes {
    pub login: String,
    pub logout: String,
    pub user_add: String,
    pub user_list: String,
}

impl Default for AdminRoutes {
    fn default() -> Self {
        Self {
            login: "/admin/login/".to_string(),
            logout: "/admin/logout/".to_string(),
            user_add: "/admin/auth/user/add/".to_string(),
            user_list: "/admin/auth/user/".to_string(),
        }
    }
}

fn default_model_link() -> String {
    "Questions".to_string()
}

fn default_heading() -> String {
    "Select question to view".to_string()
}

fn default_record_label() -> String {
    "¿Cómo te llamas?".to_string()
}

fn default_target_field() -> String {
    "question_text".to_string()
}

fn default_edit_text() -> String {
    "¿Nuevo texto?".to_string()
}

fn default_true() -> bool {
    true
}

impl ScenarioConfig {
    /// Scenario where missing detail elements are a soft pass
    pub fn lenient(name: impl Into<String>) -> Self {
        Self::with_policy(name, MissingDetailPolicy::Tolerate)
    }

    /// Scenario where every missing element is a failure
    pub fn strict(name: impl Into<String>) -> Self {
        Self::with_policy(name, MissingDetailPolicy::Fail)
    }

    fn with_policy(name: impl Into<String>, missing_detail_policy: MissingDetailPolicy) -> Self {
        let target_record_label = default_record_label();
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            admin: TestFixtureUser::administrator(),
            restricted: RestrictedAccount::default(),
            seed_questions: vec![QuestionRecord::new(target_record_label.clone())],
            model_link_text: default_model_link(),
            expected_heading: default_heading(),
            target_record_label,
            target_field: default_target_field(),
            edit_text: default_edit_text(),
            empty_list_policy: EmptyListPolicy::Pass,
            missing_detail_policy,
            routes: AdminRoutes::default(),
        }
    }

    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| match e {
            E2eError::Yaml(inner) => {
                E2eError::ScenarioParse(format!("{}: {}", path.display(), inner))
            }
            other => other,
        })
    }

    /// Load all scenarios from a directory, sorted by file path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    pub fn validate(&self) -> E2eResult<()> {
        let required = [
            ("name", &self.name),
            ("admin.username", &self.admin.username),
            ("restricted.username", &self.restricted.username),
            ("restricted.password", &self.restricted.password),
            ("restricted.permission", &self.restricted.permission),
            ("model_link_text", &self.model_link_text),
            ("target_record_label", &self.target_record_label),
            ("target_field", &self.target_field),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(E2eError::ScenarioParse(format!(
                    "scenario '{}': {} must not be empty",
                    self.name, field
                )));
            }
        }

        if self.restricted.username == self.admin.username {
            return Err(E2eError::ScenarioParse(format!(
                "scenario '{}': restricted account must differ from the administrator",
                self.name
            )));
        }

        Ok(())
    }
}
