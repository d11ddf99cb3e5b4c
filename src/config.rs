use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::dataset::DatasetLimits;

pub const CHARTS_WEB_PREFIX: &str = "/static/charts/testscore";
pub const MANUAL_FILE_NAME: &str = "Test_Score_User_Manual.pdf";

/// Settings shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    /// Address the HTTP server listens on
    #[arg(long, env = "TESTSCORE_BIND", default_value = "127.0.0.1:8080", global = true)]
    pub bind: SocketAddr,

    /// Root directory for uploads, charts and the reference manual
    #[arg(long, env = "TESTSCORE_DATA_DIR", default_value = "./data", global = true)]
    pub data_dir: PathBuf,

    /// Postgres URL for session state; sessions stay in memory when unset
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    #[arg(long, env = "TESTSCORE_MAX_ROWS", default_value_t = 50_000, global = true)]
    pub max_rows: usize,

    #[arg(long, env = "TESTSCORE_MAX_COLUMNS", default_value_t = 256, global = true)]
    pub max_columns: usize,

    #[arg(long, env = "TESTSCORE_MAX_UPLOAD_MB", default_value_t = 20, global = true)]
    pub max_upload_mb: usize,

    /// Minutes a session is kept after its last write
    #[arg(long, env = "TESTSCORE_SESSION_TTL_MINUTES", default_value_t = 120, global = true)]
    pub session_ttl_minutes: u64,

    /// Most sessions held in memory at once
    #[arg(long, env = "TESTSCORE_MAX_SESSIONS", default_value_t = 1_000, global = true)]
    pub max_sessions: usize,
}

impl AppConfig {
    /// Defaults rooted at `data_dir`, without reading the environment.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let limits = DatasetLimits::default();
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            data_dir: data_dir.into(),
            database_url: None,
            max_rows: limits.max_rows,
            max_columns: limits.max_columns,
            max_upload_mb: 20,
            session_ttl_minutes: 120,
            max_sessions: 1_000,
        }
    }

    pub fn limits(&self) -> DatasetLimits {
        DatasetLimits {
            max_rows: self.max_rows,
            max_columns: self.max_columns,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_minutes.saturating_mul(60))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads").join("testscore")
    }

    pub fn charts_dir(&self) -> PathBuf {
        self.data_dir.join("static").join("charts").join("testscore")
    }

    /// Directory served under `/static/charts`.
    pub fn charts_root(&self) -> PathBuf {
        self.data_dir.join("static").join("charts")
    }

    pub fn manual_path(&self) -> PathBuf {
        self.data_dir
            .join("static")
            .join("manuals")
            .join(MANUAL_FILE_NAME)
    }
}
