//! Utility functions and constants
//!
//! **Why**: Centralized helpers used across multiple modules
//!
//! **Used by**: feed, thumbnails, main

/// Media file type detection
pub mod media {
    use std::path::Path;

    /// Video file extensions the feed recognizes
    pub const VIDEO_EXTS: &[&str] = &["mp4", "3gp", "mov", "avi", "mkv"];

    /// Check if file is a video format
    pub fn is_video(path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|s| VIDEO_EXTS.contains(&s.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::media;
    use std::path::Path;

    #[test]
    fn test_video_extension_detection() {
        assert!(media::is_video(Path::new("videos/clip_01.mp4")));
        assert!(media::is_video(Path::new("videos/CLIP_02.MP4")));
        assert!(media::is_video(Path::new("old/message.3gp")));
        assert!(!media::is_video(Path::new("videos/readme.txt")));
        assert!(!media::is_video(Path::new("videos/noext")));
    }
}
