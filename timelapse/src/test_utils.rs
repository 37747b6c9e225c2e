//! Test helpers: throwaway configs rooted in a temp directory and fake transcoder scripts.

use crate::config::{Config, StorageConfig, TranscoderConfig};
use axum_test::TestServer;
use std::path::{Path, PathBuf};

/// Copies the file after `-i` to the last argument and records its arguments, one per line, in
/// `args.txt` next to itself.
pub const COPY_INPUT_TRANSCODER: &str = r#"printf '%s\n' "$@" > "$(dirname "$0")/args.txt"
prev=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then input="$arg"; fi
  prev="$arg"
  last="$arg"
done
cp "$input" "$last"
echo "frame=  120 fps=0.0 q=-1.0 Lsize=       1kB time=00:00:04.00" >&2
"#;

/// Writes a partial output, then fails the way ffmpeg does on a corrupt input.
pub const FAILING_TRANSCODER: &str = r#"for last in "$@"; do :; done
echo partial > "$last"
echo "$2: Invalid data found when processing input" >&2
exit 1
"#;

/// Writes a partial output and never finishes.
pub const HANGING_TRANSCODER: &str = r#"for last in "$@"; do :; done
echo partial > "$last"
sleep 60
"#;

/// A config whose directories all live under `root`. The transcoder is only looked up in
/// `root/bin`, which starts empty.
pub fn create_test_config(root: &Path) -> Config {
    let bin = root.join("bin");
    std::fs::create_dir_all(&bin).expect("Failed to create test bin directory");

    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        storage: StorageConfig {
            upload_dir: root.join("videos"),
            work_dir: root.join(".work"),
            ..StorageConfig::default()
        },
        transcoder: TranscoderConfig {
            search_path: Some(bin.display().to_string()),
            ..TranscoderConfig::default()
        },
        ..Config::default()
    }
}

/// Install an executable `ffmpeg` shell script with the given body into `dir`.
#[cfg(unix)]
pub fn install_fake_transcoder(dir: &Path, body: &str) -> PathBuf {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(dir).expect("Failed to create transcoder directory");
    let path = dir.join("ffmpeg");
    {
        let mut file = std::fs::File::create(&path).expect("Failed to create fake transcoder");
        write!(file, "#!/bin/sh\n{body}\n").expect("Failed to write fake transcoder");
        file.sync_all().expect("Failed to sync fake transcoder");
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("Failed to make fake transcoder executable");
    path
}

/// Build the full application for `config` and wrap it in a test server.
pub async fn create_test_server(config: Config) -> TestServer {
    crate::Application::new(config)
        .await
        .expect("Failed to create application")
        .into_test_server()
}
