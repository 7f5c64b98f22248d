//! Throwaway database for a single run
//!
//! Every run gets a fresh sqlite file inside a temporary directory, next to
//! a generated settings module that imports the project settings and only
//! swaps `DATABASES`. The server and the fixture shell both import that
//! module, so nothing touches the developer's database and a rerun always
//! starts from an empty schema.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::process::Command;
use tracing::info;

use crate::error::{E2eError, E2eResult};
use crate::fixtures::py_str;

/// Name of the generated settings module
pub const SETTINGS_MODULE: &str = "polls_e2e_settings";

/// A migrated sqlite database that is deleted on drop
pub struct TestDatabase {
    dir: TempDir,
    pythonpath: OsString,
}

impl TestDatabase {
    /// Write the settings override and run `manage.py migrate` against it
    pub async fn create(
        python: &Path,
        project_dir: &Path,
        base_settings: &str,
    ) -> E2eResult<Self> {
        let dir = tempfile::Builder::new().prefix("polls-e2e-").tempdir()?;
        let db_path = dir.path().join("db.sqlite3");
        std::fs::write(
            dir.path().join(format!("{}.py", SETTINGS_MODULE)),
            settings_source(base_settings, &db_path),
        )?;

        let mut paths = vec![dir.path().to_path_buf()];
        if let Some(existing) = std::env::var_os("PYTHONPATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        let pythonpath = std::env::join_paths(paths)
            .map_err(|e| E2eError::Fixture(format!("Invalid PYTHONPATH: {}", e)))?;

        let database = Self { dir, pythonpath };

        info!("Migrating throwaway database at {}", db_path.display());
        let output = Command::new(python)
            .arg("manage.py")
            .arg("migrate")
            .arg("--noinput")
            .current_dir(project_dir)
            .envs(database.env())
            .output()
            .await
            .map_err(|e| {
                E2eError::Fixture(format!(
                    "Failed to run {} manage.py migrate: {}",
                    python.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(E2eError::Fixture(format!(
                "manage.py migrate exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(database)
    }

    /// Environment that points Django at this database
    pub fn env(&self) -> Vec<(OsString, OsString)> {
        vec![
            ("PYTHONPATH".into(), self.pythonpath.clone()),
            ("DJANGO_SETTINGS_MODULE".into(), SETTINGS_MODULE.into()),
        ]
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("db.sqlite3")
    }
}

fn settings_source(base_settings: &str, db_path: &Path) -> String {
    format!(
        "from {} import *  # noqa: F401,F403\n\
         \n\
         DATABASES = {{\n\
         \x20   \"default\": {{\n\
         \x20       \"ENGINE\": \"django.db.backends.sqlite3\",\n\
         \x20       \"NAME\": {},\n\
         \x20   }}\n\
         }}\n",
        base_settings,
        py_str(&db_path.to_string_lossy()),
    )
}
