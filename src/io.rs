use anyhow::{Context, Result};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::{fs, io::AsyncWriteExt};

/// Download timeout for generated images.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(45);

const STEM_MAX: usize = 40;

lazy_static! {
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-zA-Z0-9]+").unwrap();
}

/// `<stem>_<unix seconds>_<index>.png`, where the stem is the prompt with
/// non-alphanumeric runs collapsed to `_`, cut to 40 chars and stripped of
/// edge underscores.
pub fn synthesize_filename(prompt: &str, index: usize) -> String {
    synthesize_filename_at(prompt, index, Utc::now().timestamp())
}

pub fn synthesize_filename_at(prompt: &str, index: usize, timestamp: i64) -> String {
    let collapsed = NON_ALNUM.replace_all(prompt, "_");
    let cut: String = collapsed.chars().take(STEM_MAX).collect();
    let stem = cut.trim_matches('_');
    format!("{stem}_{timestamp}_{index}.png")
}

/// GETs `url` and writes the body to `target`, replacing whatever is there.
pub async fn fetch_and_save(
    client: &reqwest::Client,
    url: &str,
    target: &Path,
    timeout: Duration,
) -> Result<PathBuf> {
    let bytes = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .with_context(|| format!("download failed: {url}"))?
        .error_for_status()
        .with_context(|| format!("download failed: {url}"))?
        .bytes()
        .await
        .with_context(|| format!("download interrupted: {url}"))?;

    let mut tmp = target.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    {
        let mut f = fs::File::create(&tmp)
            .await
            .with_context(|| format!("create {}", tmp.display()))?;
        f.write_all(&bytes).await?;
        let _ = f.sync_all().await; // best-effort
    }
    fs::rename(&tmp, target)
        .await
        .with_context(|| format!("write {}", target.display()))?;
    Ok(target.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn filename_collapses_runs_and_appends_suffix() {
        assert_eq!(
            synthesize_filename_at("Hello, World!!!", 3, 1700000000),
            "Hello_World_1700000000_3.png"
        );
    }

    #[test]
    fn filename_uses_current_timestamp() {
        let name = synthesize_filename("Hello, World!!!", 3);
        let re = Regex::new(r"^Hello_World_\d+_3\.png$").unwrap();
        assert!(re.is_match(&name), "{name}");
    }

    #[test]
    fn filename_stem_is_truncated_before_stripping() {
        let prompt = "a".repeat(39) + " trailing words";
        // cut lands on the underscore after the 39 a's, which is then stripped
        assert_eq!(synthesize_filename_at(&prompt, 1, 5), format!("{}_5_1.png", "a".repeat(39)));

        let long = "x".repeat(80);
        let name = synthesize_filename_at(&long, 12, 5);
        assert_eq!(name, format!("{}_5_12.png", "x".repeat(40)));
    }

    #[test]
    fn filename_of_symbols_only_has_empty_stem() {
        assert_eq!(synthesize_filename_at("!!! ???", 2, 9), "_9_2.png");
    }

    #[tokio::test]
    async fn saves_body_and_overwrites_existing_file() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/img/1.png");
                then.status(200).body(b"\x89PNG fresh".to_vec());
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.png");
        std::fs::write(&target, b"stale contents that are longer").unwrap();

        let client = reqwest::Client::new();
        let saved = fetch_and_save(&client, &server.url("/img/1.png"), &target, DOWNLOAD_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(saved, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"\x89PNG fresh");
        assert!(!dir.path().join("out.png.tmp").exists());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gone.png");
                then.status(404);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("gone.png");
        let client = reqwest::Client::new();
        let url = server.url("/gone.png");
        let res = fetch_and_save(&client, &url, &target, DOWNLOAD_TIMEOUT).await;

        assert!(res.is_err());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn slow_download_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow.png");
                then.status(200).delay(Duration::from_millis(500)).body("late");
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("slow.png");
        let res = fetch_and_save(
            &reqwest::Client::new(),
            &server.url("/slow.png"),
            &target,
            Duration::from_millis(50),
        )
        .await;

        assert!(res.is_err());
    }
}
