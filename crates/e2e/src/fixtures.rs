//! Fixture data provisioned directly in the application database
//!
//! The admin account and the questions are created out of band, through
//! Django's ORM, before the browser ever sees them.

use std::ffi::OsString;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};

/// An account created before the scenario starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFixtureUser {
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub is_staff: bool,
}

impl TestFixtureUser {
    /// Full-privilege administrator used to drive the admin site
    pub fn administrator() -> Self {
        Self {
            username: "isard".to_string(),
            email: "isard@isardvdi.com".to_string(),
            password: "pirineus".to_string(),
            is_superuser: true,
            is_staff: true,
        }
    }
}

/// A poll question to populate the change list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub text: String,
    #[serde(default = "Utc::now")]
    pub publication_timestamp: DateTime<Utc>,
}

impl QuestionRecord {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            publication_timestamp: Utc::now(),
        }
    }
}

/// Creates and removes fixture rows in the system under test
///
/// Creation is idempotent so a rerun against the same database resets the
/// row instead of failing on a unique constraint.
#[async_trait]
pub trait Fixtures: Send + Sync {
    /// Create `user`, or reset password, flags and permissions if it exists
    async fn create_user(&self, user: &TestFixtureUser) -> E2eResult<()>;

    /// Delete the account if present
    async fn delete_user(&self, username: &str) -> E2eResult<()>;

    /// Insert a question and return its primary key
    async fn create_question(&self, question: &QuestionRecord) -> E2eResult<u64>;

    async fn delete_question(&self, id: u64) -> E2eResult<()>;
}

/// Provisions fixtures through `manage.py shell`
#[derive(Debug, Clone)]
pub struct DjangoShell {
    pub python: PathBuf,
    pub project_dir: PathBuf,
    /// Extra environment, such as the settings module of a throwaway database
    pub env: Vec<(OsString, OsString)>,
}

impl DjangoShell {
    pub fn new(python: impl Into<PathBuf>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            project_dir: project_dir.into(),
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, env: Vec<(OsString, OsString)>) -> Self {
        self.env.extend(env);
        self
    }

    /// Run `code` and return its standard output
    async fn run(&self, code: &str) -> E2eResult<String> {
        debug!("manage.py shell -c {}", code);

        let output = Command::new(&self.python)
            .arg("manage.py")
            .arg("shell")
            .arg("-c")
            .arg(code)
            .current_dir(&self.project_dir)
            .envs(self.env.iter().cloned())
            .output()
            .await
            .map_err(|e| {
                E2eError::Fixture(format!(
                    "Failed to run {} manage.py shell: {}",
                    self.python.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(E2eError::Fixture(format!(
                "manage.py shell exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Fixtures for DjangoShell {
    async fn create_user(&self, user: &TestFixtureUser) -> E2eResult<()> {
        info!("Creating fixture user '{}'", user.username);
        self.run(&user_script(user)).await?;
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> E2eResult<()> {
        info!("Deleting user '{}'", username);
        self.run(&format!(
            "from django.contrib.auth.models import User\n\
             User.objects.filter(username={}).delete()\n",
            py_str(username)
        ))
        .await?;
        Ok(())
    }

    async fn create_question(&self, question: &QuestionRecord) -> E2eResult<u64> {
        info!("Creating question '{}'", question.text);
        let stdout = self.run(&question_script(question)).await?;
        parse_pk(&stdout)
    }

    async fn delete_question(&self, id: u64) -> E2eResult<()> {
        info!("Deleting question {}", id);
        self.run(&format!(
            "from polls.models import Question\n\
             Question.objects.filter(pk={}).delete()\n",
            id
        ))
        .await?;
        Ok(())
    }
}

/// Python string literal for `value`; JSON string escapes are valid Python
pub(crate) fn py_str(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn py_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn user_script(user: &TestFixtureUser) -> String {
    format!(
        "from django.contrib.auth.models import User\n\
         user, _ = User.objects.get_or_create(username={})\n\
         user.email = {}\n\
         user.set_password({})\n\
         user.is_superuser = {}\n\
         user.is_staff = {}\n\
         user.is_active = True\n\
         user.save()\n\
         user.user_permissions.clear()\n",
        py_str(&user.username),
        py_str(&user.email),
        py_str(&user.password),
        py_bool(user.is_superuser),
        py_bool(user.is_staff),
    )
}

fn question_script(question: &QuestionRecord) -> String {
    format!(
        "from datetime import datetime\n\
         from polls.models import Question\n\
         q = Question.objects.create(question_text={}, pub_date=datetime.fromisoformat({}))\n\
         print(q.pk)\n",
        py_str(&question.text),
        py_str(
            &question
                .publication_timestamp
                .to_rfc3339_opts(SecondsFormat::Micros, false),
        ),
    )
}

/// The primary key is the last line the shell printed
fn parse_pk(stdout: &str) -> E2eResult<u64> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse().ok())
        .ok_or_else(|| {
            E2eError::Fixture(format!("no question id in shell output: {:?}", stdout.trim()))
        })
}
