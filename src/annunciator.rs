//! Audible acknowledgments: welcome on entry, reminder or clean after recheck.
//!
//! Clips live in one directory:
//! - `<identity>W.wav` welcome, falling back to `welcomeW.wav`
//! - `<identity>A.wav` single-person reminder, falling back to `reminderA.wav`
//! - `reminderA.wav` for a batch of several people
//! - `cleanA.wav` when everyone in the batch is compliant

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

#[async_trait]
pub trait Annunciator: Send + Sync {
    async fn welcome(&self, identity: &str) -> Result<()>;

    /// One reminder for the whole batch of non-compliant identities.
    async fn reminder(&self, identities: &[String]) -> Result<()>;

    async fn clean(&self) -> Result<()>;
}

/// Plays WAV clips through an external player (`aplay -q` by default).
pub struct AplayAnnunciator {
    clip_dir: PathBuf,
    player: PathBuf,
    // Welcome and alert audio come from different workers; never overlap them.
    playing: Mutex<()>,
}

impl AplayAnnunciator {
    pub fn new(clip_dir: impl Into<PathBuf>) -> Self {
        Self {
            clip_dir: clip_dir.into(),
            player: PathBuf::from("aplay"),
            playing: Mutex::new(()),
        }
    }

    /// Use a different player executable. It receives `-q <clip>`.
    pub fn player(mut self, player: impl Into<PathBuf>) -> Self {
        self.player = player.into();
        self
    }

    /// `preferred` if it exists in the clip dir, else `fallback`.
    async fn pick(&self, preferred: &str, fallback: &str) -> PathBuf {
        let path = self.clip_dir.join(preferred);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            path
        } else {
            self.clip_dir.join(fallback)
        }
    }

    async fn play(&self, clip: &Path) -> Result<()> {
        let _guard = self.playing.lock().await;
        debug!(clip = %clip.display(), "playing clip");

        let status = Command::new(&self.player)
            .arg("-q")
            .arg(clip)
            .status()
            .await?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::Playback(format!(
                "{} exited with status {} for {}",
                self.player.display(),
                status.code().unwrap_or(-1),
                clip.display()
            )))
        }
    }
}

#[async_trait]
impl Annunciator for AplayAnnunciator {
    async fn welcome(&self, identity: &str) -> Result<()> {
        let clip = self.pick(&format!("{identity}W.wav"), "welcomeW.wav").await;
        self.play(&clip).await
    }

    async fn reminder(&self, identities: &[String]) -> Result<()> {
        let clip = match identities {
            [single] => self.pick(&format!("{single}A.wav"), "reminderA.wav").await,
            _ => self.clip_dir.join("reminderA.wav"),
        };
        self.play(&clip).await
    }

    async fn clean(&self) -> Result<()> {
        self.play(&self.clip_dir.join("cleanA.wav")).await
    }
}

/// Logs acknowledgments instead of playing them. For headless nodes.
#[derive(Debug, Default)]
pub struct SilentAnnunciator;

#[async_trait]
impl Annunciator for SilentAnnunciator {
    async fn welcome(&self, identity: &str) -> Result<()> {
        info!(identity, "welcome");
        Ok(())
    }

    async fn reminder(&self, identities: &[String]) -> Result<()> {
        info!(?identities, "hand hygiene reminder");
        Ok(())
    }

    async fn clean(&self) -> Result<()> {
        info!("clean acknowledgment");
        Ok(())
    }
}
