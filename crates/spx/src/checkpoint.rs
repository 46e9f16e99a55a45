//! 🏷️ Cursor persistence for the runner. The spooler itself is stateless across sessions:
//! whatever token was saved here last is where the next run picks up.
//!
//! Saves go through `<file>.tmp` and a rename, so a crash mid-write leaves either the old
//! token or the new one on disk, never half of each.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// 📂 Read the saved token. A missing or blank file means "start from the beginning".
pub async fn load(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(the_contents) => {
            // -- ✂️ only the line ending goes; spaces can be part of the key
            let the_token = the_contents.trim_end_matches(['\n', '\r']);
            if the_token.trim().is_empty() {
                info!("🏷️ cursor file {} is empty; starting from the beginning", path.display());
                Ok(None)
            } else {
                info!("🏷️ resuming from cursor '{the_token}' ({})", path.display());
                Ok(Some(the_token.to_string()))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("🏷️ no cursor file at {}; starting from the beginning", path.display());
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("💀 could not read the cursor file {}", path.display())),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut the_name = path.as_os_str().to_os_string();
    the_name.push(".tmp");
    PathBuf::from(the_name)
}

/// 💾 Replace the saved token.
pub async fn save(path: &Path, token: &str) -> Result<()> {
    let the_temp = temp_path(path);
    let mut the_file = fs::File::create(&the_temp)
        .await
        .with_context(|| format!("💀 could not create {}", the_temp.display()))?;
    the_file.write_all(token.as_bytes()).await?;
    the_file.write_all(b"\n").await?;
    the_file
        .sync_all()
        .await
        .with_context(|| format!("💀 could not sync {}", the_temp.display()))?;
    drop(the_file);

    fs::rename(&the_temp, path).await.with_context(|| {
        format!("💀 could not move {} over {}", the_temp.display(), path.display())
    })?;
    debug!("💾 cursor '{token}' saved to {}", path.display());
    Ok(())
}
