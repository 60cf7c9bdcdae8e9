//! Navigation helper files for MODIS geolocation
//!
//! The SPA geolocation reads `leapsec.dat` and `utcpole.dat` from its `etc`
//! directory. Each is kept as a symlink to a timestamped download:
//!
//! ```text
//! etc/leapsec.dat -> etc/leapsec.dat_201610170812
//! etc/utcpole.dat -> etc/utcpole.dat_201610170812
//! ```
//!
//! Before a MODIS pipeline the links are checked; stale or missing files
//! trigger a cleanup of old downloads and a fresh fetch. Nothing here ever
//! aborts a scene: failures are logged and the pipeline runs with whatever
//! files are present.

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::defaults::{ANCILLARY_HTTP_TIMEOUT_SECS, NAVIGATION_HELPER_FILES};
use crate::config::AncillaryConfig;

/// Timestamp suffix of a downloaded helper file
const DOWNLOAD_STAMP_FORMAT: &str = "%Y%m%d%H%M";
/// Matches the suffix written with `DOWNLOAD_STAMP_FORMAT`
const DOWNLOAD_STAMP_PATTERN: &str = r"\.dat_(\d{12})$";

#[derive(Debug, Error)]
pub enum AncillaryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid download stamp pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("server returned status {status} for {url}")]
    ServerError { url: String, status: reqwest::StatusCode },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> AncillaryError + '_ {
    move |source| AncillaryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Outcome of a freshness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Missing(PathBuf),
    /// The link target carries no download timestamp
    Unstamped(PathBuf),
    Stale { path: PathBuf, age_days: i64 },
}

/// Keeps `leapsec.dat` / `utcpole.dat` fresh in one `etc` directory.
pub struct NavigationFiles {
    etc_dir: PathBuf,
    url: String,
    max_age: ChronoDuration,
    keep_old: ChronoDuration,
    http: reqwest::Client,
    stamp: Regex,
}

impl NavigationFiles {
    pub fn new(etc_dir: impl Into<PathBuf>, config: &AncillaryConfig) -> Result<Self, AncillaryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(ANCILLARY_HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            etc_dir: etc_dir.into(),
            url: config.url.clone(),
            max_age: ChronoDuration::days(i64::from(config.days_between_download)),
            keep_old: ChronoDuration::days(i64::from(config.days_keep_old)),
            http,
            stamp: Regex::new(DOWNLOAD_STAMP_PATTERN)?,
        })
    }

    pub fn etc_dir(&self) -> &Path {
        &self.etc_dir
    }

    /// Refresh the helper files if any is missing or too old.
    ///
    /// Returns the number of files downloaded.
    pub async fn ensure_fresh(&self, now: NaiveDateTime) -> usize {
        match self.check(now) {
            Freshness::Fresh => {
                info!("Navigation helper files are fresh, no download");
                return 0;
            }
            other => warn!(?other, "Navigation helper files missing or too old"),
        }

        for removed in self.clean_old(now) {
            info!(file = %removed.display(), "Removed old navigation helper file");
        }

        if self.url.trim().is_empty() {
            warn!("ancillary.url is not set, cannot refresh navigation helper files");
            return 0;
        }

        match self.download(now).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, url = %self.url, "Navigation helper download failed");
                0
            }
        }
    }

    /// Check every helper file: it must exist and resolve to a download
    /// younger than `days_between_download`.
    pub fn check(&self, now: NaiveDateTime) -> Freshness {
        for name in NAVIGATION_HELPER_FILES {
            let link = self.etc_dir.join(name);
            if !link.exists() {
                return Freshness::Missing(link);
            }
            let target = std::fs::canonicalize(&link).unwrap_or_else(|_| link.clone());
            let Some(stamp) = self.download_time(&target) else {
                return Freshness::Unstamped(target);
            };
            let age = now - stamp;
            if age > self.max_age {
                return Freshness::Stale {
                    path: link,
                    age_days: age.num_days(),
                };
            }
        }
        Freshness::Fresh
    }

    /// Delete timestamped downloads older than `days_keep_old`.
    pub fn clean_old(&self, now: NaiveDateTime) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.etc_dir) else {
            return Vec::new();
        };

        let mut removed = Vec::new();
        for path in entries.filter_map(Result::ok).map(|e| e.path()) {
            let Some(stamp) = self.download_time(&path) else {
                continue;
            };
            if now - stamp > self.keep_old {
                match std::fs::remove_file(&path) {
                    Ok(()) => removed.push(path),
                    Err(e) => warn!(file = %path.display(), error = %e, "Failed to remove old helper file"),
                }
            }
        }
        removed
    }

    /// Fetch every helper file, store it timestamped and re-point its link.
    ///
    /// A file that fails to download keeps its old link.
    pub async fn download(&self, now: NaiveDateTime) -> Result<usize, AncillaryError> {
        // Probe the base URL before touching anything
        self.http.get(&self.url).send().await?;

        info!(url = %self.url, "Downloading navigation helper files");
        let stamp = now.format(DOWNLOAD_STAMP_FORMAT).to_string();
        let mut downloaded = 0;

        for name in NAVIGATION_HELPER_FILES {
            let url = format!("{}{}", self.url, name);
            let body = match self.fetch(&url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(file = name, error = %e, "Failed fetching navigation helper file");
                    continue;
                }
            };

            let target = self.etc_dir.join(format!("{name}_{stamp}"));
            tokio::fs::write(&target, &body)
                .await
                .map_err(io_error(&target))?;
            info!(file = %target.display(), bytes = body.len(), "Navigation helper file written");

            relink(&target, &self.etc_dir.join(name))?;
            downloaded += 1;
        }
        Ok(downloaded)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AncillaryError> {
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(AncillaryError::ServerError {
                url: url.to_string(),
                status: resp.status(),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }

    fn download_time(&self, path: &Path) -> Option<NaiveDateTime> {
        let name = path.file_name()?.to_str()?;
        let captures = self.stamp.captures(name)?;
        NaiveDateTime::parse_from_str(&captures[1], DOWNLOAD_STAMP_FORMAT).ok()
    }
}

/// Point `link` at `target`, replacing an existing link.
#[cfg(unix)]
fn relink(target: &Path, link: &Path) -> Result<(), AncillaryError> {
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(link).map_err(io_error(link))?;
    }
    std::os::unix::fs::symlink(target, link).map_err(io_error(link))
}

#[cfg(not(unix))]
fn relink(target: &Path, link: &Path) -> Result<(), AncillaryError> {
    std::fs::copy(target, link).map(|_| ()).map_err(io_error(link))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn helper(etc: &Path, stamp: &str) {
        for name in NAVIGATION_HELPER_FILES {
            let target = etc.join(format!("{name}_{stamp}"));
            std::fs::write(&target, "data").unwrap();
            relink(&target, &etc.join(name)).unwrap();
        }
    }

    fn files(etc: &Path) -> NavigationFiles {
        NavigationFiles::new(etc, &AncillaryConfig::default()).unwrap()
    }

    #[test]
    fn test_missing_files_are_not_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(files(tmp.path()).check(at(2016, 10, 17)), Freshness::Missing(_)));
    }

    #[test]
    fn test_freshness_window() {
        let tmp = tempfile::tempdir().unwrap();
        helper(tmp.path(), "201610100000");
        let nav = files(tmp.path());

        assert_eq!(nav.check(at(2016, 10, 17)), Freshness::Fresh);
        assert!(matches!(
            nav.check(at(2016, 11, 17)),
            Freshness::Stale { age_days: 38, .. }
        ));
    }

    #[test]
    fn test_unstamped_target_is_not_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        for name in NAVIGATION_HELPER_FILES {
            std::fs::write(tmp.path().join(name), "plain file").unwrap();
        }
        assert!(matches!(files(tmp.path()).check(at(2016, 10, 17)), Freshness::Unstamped(_)));
    }

    #[test]
    fn test_clean_old_keeps_recent_downloads() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("leapsec.dat_201601010000"), "").unwrap();
        std::fs::write(tmp.path().join("leapsec.dat_201610010000"), "").unwrap();
        std::fs::write(tmp.path().join("unrelated.txt"), "").unwrap();

        let removed = files(tmp.path()).clean_old(at(2016, 10, 17));
        assert_eq!(removed, vec![tmp.path().join("leapsec.dat_201601010000")]);
        assert!(tmp.path().join("leapsec.dat_201610010000").exists());
        assert!(tmp.path().join("unrelated.txt").exists());
    }

    #[test]
    fn test_relink_replaces_existing_link() {
        let tmp = tempfile::tempdir().unwrap();
        helper(tmp.path(), "201601010000");
        helper(tmp.path(), "201610170000");
        let target = std::fs::read_link(tmp.path().join("utcpole.dat")).unwrap();
        assert!(target.ends_with("utcpole.dat_201610170000"));
    }

    #[tokio::test]
    async fn test_no_url_means_no_download() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(files(tmp.path()).ensure_fresh(at(2016, 10, 17)).await, 0);
    }
}
