use tokio::process::Command;

/// File stem for an item id, distinct for distinct ids
///
/// ASCII letters, digits, `-` and `_` are kept. Every other byte is
/// percent-encoded, `%` and `.` included, so no stem is hidden, empty or a
/// path component like `..`.
pub fn id_file_stem(item_id: &str) -> String {
    if item_id.is_empty() {
        return "%".to_string();
    }
    urlencoding::encode(item_id)
        .replace('.', "%2E")
        .replace('~', "%7E")
}

/// Check that the external tools used by the pipeline can be started
pub async fn check_dependencies(yt_dlp_path: &str, ffmpeg_path: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(yt_dlp_path, "--version").await {
        missing.push(format!("{} - required to download audio", yt_dlp_path));
    }

    if !check_command_available(ffmpeg_path, "-version").await {
        missing.push(format!("{} - required to convert audio", ffmpeg_path));
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str, version_flag: &str) -> bool {
    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
