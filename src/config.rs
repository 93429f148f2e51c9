//! User-scoped locations shared by the compute and plot phases.
use std::path::PathBuf;

use crate::error::{GseaError, Result};

/// Overrides the home directory as the place where session files live.
pub const HOME_ENV: &str = "GSEAWRAP_HOME";
pub const CHECKPOINT_FILE: &str = "gseawrap_session.ckpt";
pub const PLOT_BASENAME: &str = "gsea_plot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Workspace { dir: dir.into() }
    }

    /// `$GSEAWRAP_HOME` when set and non-empty, else the user's home directory.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(HOME_ENV) {
            Some(dir) if !dir.is_empty() => Ok(Self::new(dir)),
            _ => dirs::home_dir().map(Self::new).ok_or_else(|| {
                GseaError::Configuration(format!(
                    "Cannot locate a home directory; set {HOME_ENV} to choose where session files are kept."
                ))
            }),
        }
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    /// Plot output base path, without extension.
    pub fn plot_base(&self) -> PathBuf {
        self.dir.join(PLOT_BASENAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_live_under_the_workspace() {
        let ws = Workspace::new("/tmp/someone");
        assert_eq!(ws.checkpoint_path(), PathBuf::from("/tmp/someone/gseawrap_session.ckpt"));
        assert_eq!(ws.plot_base(), PathBuf::from("/tmp/someone/gsea_plot"));
    }
}
