use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};

/// A video file named `episode_<digits>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeVideo {
    pub episode_index: u64,
    pub path: PathBuf,
}

/// Episode videos directly inside `dir`, sorted by episode index.
pub fn find_episode_videos(dir: &Path, extension: &str) -> io::Result<Vec<EpisodeVideo>> {
    let pattern = format!(r"^episode_(\d+)\.{}$", regex::escape(extension));
    let re = Regex::new(&pattern).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut videos = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some(index) = re
            .captures(name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
        else {
            continue;
        };
        // Follows symlinks.
        if entry.path().is_file() {
            videos.push(EpisodeVideo {
                episode_index: index,
                path: entry.path(),
            });
        }
    }

    videos.sort_by_key(|v| v.episode_index);
    Ok(videos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_discovery_sorts_by_index_and_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "episode_000010.mp4",
            "episode_000002.mp4",
            "episode_000001.mp4",
            "episode_000003.avi",
            "notes.txt",
            "episode_abc.mp4",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("episode_000004.mp4")).unwrap();

        let found = find_episode_videos(dir.path(), "mp4").unwrap();
        let indices: Vec<u64> = found.iter().map(|v| v.episode_index).collect();
        assert_eq!(indices, vec![1, 2, 10]);
        assert!(found[2].path.ends_with("episode_000010.mp4"));
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        assert!(find_episode_videos(Path::new("/nonexistent/videos"), "mp4").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_videos_are_found() {
        let store = tempfile::tempdir().unwrap();
        let target = store.path().join("recording.mp4");
        fs::write(&target, b"").unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("episode_000004.mp4")).unwrap();
        std::os::unix::fs::symlink(
            store.path().join("missing.mp4"),
            dir.path().join("episode_000005.mp4"),
        )
        .unwrap();

        let videos = find_episode_videos(dir.path(), "mp4").unwrap();
        let indices: Vec<u64> = videos.iter().map(|v| v.episode_index).collect();
        assert_eq!(indices, vec![4]);
    }
}
