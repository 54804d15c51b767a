//! Listen fixture generation

use anyhow::Result;
use std::path::Path;

/// One JSON-lines listen record
pub fn listen_line(user: &str, msid: &str, listened_at: i64, track: &str, artist: &str) -> String {
    serde_json::json!({
        "user_name": user,
        "recording_msid": msid,
        "listened_at": listened_at,
        "track_metadata": {
            "track_name": track,
            "artist_name": artist,
        },
    })
    .to_string()
}

/// Write lines to `path`, creating parent directories
pub fn write_listens(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(path, content)?;
    Ok(())
}
