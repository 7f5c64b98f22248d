//! Live server management - spawning and health checking the Django site

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::database::TestDatabase;
use crate::error::{E2eError, E2eResult};
use crate::fixtures::DjangoShell;

/// Handle to a running `manage.py runserver` process
pub struct ServerHandle {
    child: Child,
    pub base_url: String,
    pub port: u16,
    python: PathBuf,
    project_dir: PathBuf,
    /// Django environment shared with the fixture shell
    env: Vec<(OsString, OsString)>,
    /// Removed only after the server process has stopped
    database: Option<TestDatabase>,
}

impl ServerHandle {
    /// Spawn the development server for the polls project
    pub async fn spawn(config: ServerConfig) -> E2eResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let base_url = format!("http://127.0.0.1:{}", port);

        let database = if config.throwaway_database {
            Some(
                TestDatabase::create(&config.python, &config.project_dir, &config.settings_module)
                    .await?,
            )
        } else {
            None
        };
        let env = match &database {
            Some(database) => database.env(),
            None => vec![(
                "DJANGO_SETTINGS_MODULE".into(),
                config.settings_module.clone().into(),
            )],
        };

        info!("Spawning Django server on port {}", port);

        let mut cmd = Command::new(&config.python);
        cmd.arg("manage.py")
            .arg("runserver")
            .arg(format!("127.0.0.1:{}", port))
            .arg("--noreload")
            .current_dir(&config.project_dir)
            .env("PYTHONUNBUFFERED", "1")
            .envs(env.iter().cloned());

        cmd.stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!(
                "Failed to spawn {} manage.py in {}: {}",
                config.python.display(),
                config.project_dir.display(),
                e
            ))
        })?;

        let handle = ServerHandle {
            child,
            base_url: base_url.clone(),
            port,
            python: config.python.clone(),
            project_dir: config.project_dir.clone(),
            env,
            database,
        };

        handle
            .wait_for_healthy(&config.health_path, config.startup_timeout)
            .await?;

        info!("Server is healthy at {}", base_url);
        Ok(handle)
    }

    /// Wait for the server to answer on the health path
    async fn wait_for_healthy(
        &self,
        health_path: &str,
        timeout_duration: Duration,
    ) -> E2eResult<()> {
        let health_url = format!("{}{}", self.base_url, health_path);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for server to start...");
                    }
                    // Connection refused is expected while the server boots
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(100)).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fixture shell bound to the same settings and database as the server
    pub fn fixtures(&self) -> DjangoShell {
        DjangoShell::new(&self.python, &self.project_dir).with_env(self.env.clone())
    }

    /// Location of the throwaway sqlite file, if one was created
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database.as_ref().map(TestDatabase::path)
    }

    /// Stop the server
    pub fn stop(&mut self) -> E2eResult<()> {
        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }

        info!("Stopping server (pid: {})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        // Force kill if still running
        let _ = self.child.kill();
        let _ = self.child.wait();

        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Configuration for spawning the live server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Python interpreter with Django installed
    pub python: PathBuf,

    /// Directory holding `manage.py`
    pub project_dir: PathBuf,

    /// Project settings module
    pub settings_module: String,

    /// Run against a fresh migrated sqlite database instead of the one
    /// configured in `settings_module`
    pub throwaway_database: bool,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    /// Path polled until it answers with a success status
    pub health_path: String,

    /// Timeout for server startup
    pub startup_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            python: PathBuf::from("python3"),
            project_dir: PathBuf::from("."),
            settings_module: "mysite.settings".to_string(),
            throwaway_database: true,
            port: None,
            health_path: "/admin/login/".to_string(),
            startup_timeout: Duration::from_secs(30),
        }
    }
}

/// Find a free port to use
fn find_free_port() -> E2eResult<u16> {
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
