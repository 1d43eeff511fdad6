//! Output folder allocation.

use std::io;
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Create a fresh folder for a request under `parent`.
///
/// Uses `name` if it is free, otherwise `name_1`, `name_2`, ... Returns the
/// folder name that was used and its path. An existing folder is never
/// returned.
pub async fn create_unique_dir(parent: &Path, name: &str) -> io::Result<(String, PathBuf)> {
    tokio::fs::create_dir_all(parent).await?;

    let mut suffix = 0u32;
    loop {
        let candidate = if suffix == 0 {
            name.to_string()
        } else {
            format!("{}_{}", name, suffix)
        };
        let path = parent.join(&candidate);
        match tokio::fs::create_dir(&path).await {
            Ok(()) => return Ok((candidate, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Link sent to the requester for a request folder.
///
/// Points at SharePoint when the output directory is synced there, otherwise
/// at the folder on disk.
pub fn share_link(config: &Config, folder: &str, target_dir: &Path) -> String {
    match config.sharepoint_url.as_deref().map(str::trim) {
        Some(base) if config.onedrive_synced && !base.is_empty() => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            urlencoding::encode(folder)
        ),
        _ => target_dir.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unique_dir_appends_suffix() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("Elm Street")).unwrap();
        std::fs::create_dir(dir.path().join("Elm Street_1")).unwrap();

        let (name, path) = create_unique_dir(dir.path(), "Elm Street").await.unwrap();
        assert_eq!(name, "Elm Street_2");
        assert_eq!(path, dir.path().join("Elm Street_2"));
        assert!(path.is_dir());

        let (name, _) = create_unique_dir(dir.path(), "Oak").await.unwrap();
        assert_eq!(name, "Oak");
    }

    #[tokio::test]
    async fn test_unique_dir_creates_parent() {
        let dir = TempDir::new().unwrap();
        let parent = dir.path().join("Outputs").join("2024");
        let (_, path) = create_unique_dir(&parent, "A").await.unwrap();
        assert!(path.is_dir());
    }

    #[test]
    fn test_share_link() {
        let mut config = Config {
            sharepoint_url: Some("https://city.sharepoint.com/sites/GIS/Outputs/".to_string()),
            ..Default::default()
        };
        let target = Path::new("/data/Outputs/Elm Street");

        assert_eq!(share_link(&config, "Elm Street", target), "/data/Outputs/Elm Street");

        config.onedrive_synced = true;
        assert_eq!(
            share_link(&config, "Elm Street", target),
            "https://city.sharepoint.com/sites/GIS/Outputs/Elm%20Street"
        );
    }
}
