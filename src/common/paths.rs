use directories::ProjectDirs;
use std::path::PathBuf;

pub const SYSTEM_SOCKET_PATH: &str = "/run/facebank/facebank.sock";
pub const DEV_SOCKET_PATH: &str = "/tmp/facebank.sock";

pub enum RunMode {
    /// Everything relative to the working directory, for hacking on the service.
    Development(PathBuf),
    /// Fixed paths under /etc and /run.
    System,
    /// Per-user locations resolved through the platform project dirs.
    User,
}

pub struct Paths {
    mode: RunMode,
}

impl Paths {
    pub fn new(dev: bool) -> Self {
        if dev {
            return Self {
                mode: RunMode::Development(PathBuf::from(".")),
            };
        }
        if std::env::var("USER").unwrap_or_default() == "root" {
            return Self {
                mode: RunMode::System,
            };
        }
        Self {
            mode: RunMode::User,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        match &self.mode {
            RunMode::Development(base) => base.join("configs/facebank.toml"),
            RunMode::System => PathBuf::from("/etc/facebank/facebank.toml"),
            RunMode::User => {
                // Prefer a user config, fall back to the system one
                if let Some(dirs) = project_dirs() {
                    let user_config = dirs.config_dir().join("facebank.toml");
                    if user_config.exists() {
                        return user_config;
                    }
                }
                PathBuf::from("/etc/facebank/facebank.toml")
            }
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        match &self.mode {
            RunMode::Development(_) => PathBuf::from(DEV_SOCKET_PATH),
            RunMode::System => PathBuf::from(SYSTEM_SOCKET_PATH),
            RunMode::User => project_dirs()
                .and_then(|dirs| dirs.runtime_dir().map(|d| d.join("facebank.sock")))
                .unwrap_or_else(|| PathBuf::from(DEV_SOCKET_PATH)),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "facebank", "FaceBank")
}
