//! Chrome CDP client: one browser, one reused tab per target site.
//!
//! Launches headed by default because the target sites require logged-in
//! sessions; the profile directory persists those logins across restarts.
//! A site's tab is reused as long as it is still on the site's host, so an
//! in-progress conversation is never blown away by a reload.

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use crate::models::SiteProfile;

/// Per-request CDP deadline. Must outlast the longest single evaluate
/// (the element waiter's in-page timeout), not any user interaction; the
/// picker polls in short requests for exactly that reason.
const CDP_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct BrowserClient {
    browser: Browser,
    pages: RwLock<HashMap<String, Page>>,
}

impl BrowserClient {
    /// Launch Chrome with a persistent profile directory.
    pub async fn launch(user_data_dir: PathBuf, headless: bool) -> Result<Self> {
        tokio::fs::create_dir_all(&user_data_dir).await?;

        let chrome_path = find_chrome_executable()?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(&user_data_dir)
            .viewport(None)
            .request_timeout(CDP_REQUEST_TIMEOUT)
            .arg("--disable-background-timer-throttling")
            .arg("--disable-breakpad")
            .arg("--disable-default-apps")
            .arg("--disable-hang-monitor")
            .arg("--disable-ipc-flooding-protection")
            .arg("--disable-popup-blocking")
            .arg("--disable-prompt-on-repost")
            .arg("--disable-renderer-backgrounding")
            .arg("--disable-sync")
            .arg("--metrics-recording-only")
            .arg("--mute-audio")
            .arg("--no-first-run")
            .arg("--password-store=basic");

        if !headless {
            builder = builder.with_head();
        } else {
            builder = builder.arg("--disable-gpu").arg("--disable-dev-shm-usage");
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        // Drain CDP events; the stream must be polled for the session to live.
        tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self {
            browser,
            pages: RwLock::new(HashMap::new()),
        })
    }

    /// Page for `profile`, reusing the site's existing tab when it is still
    /// on the site's host. Navigation happens here; the caller only ever
    /// sees a page that is already on its way to the target. The map lock
    /// is held only to clone or swap entries, never across a navigation,
    /// so one slow site cannot stall deliveries to the others.
    pub async fn open_site(&self, profile: &SiteProfile) -> Result<Page> {
        let existing = self.pages.read().await.get(&profile.id).cloned();

        if let Some(page) = existing {
            match page.url().await {
                Ok(current) => match plan_reuse(current.as_deref(), &profile.url) {
                    TabAction::Reuse => {
                        debug!(site = %profile.id, "reusing tab in place");
                        return Ok(page);
                    }
                    TabAction::Renavigate => {
                        debug!(site = %profile.id, "tab drifted off-site, renavigating");
                        if page.goto(profile.url.as_str()).await.is_ok() {
                            page.wait_for_navigation().await.ok();
                            return Ok(page);
                        }
                        self.pages.write().await.remove(&profile.id);
                    }
                },
                Err(_) => {
                    // Tab was closed by hand; fall through and open a new one.
                    self.pages.write().await.remove(&profile.id);
                }
            }
        }

        info!(site = %profile.id, url = %profile.url, "opening tab");
        let page = self
            .browser
            .new_page(profile.url.as_str())
            .await
            .with_context(|| format!("Failed to open page for {}", profile.id))?;
        page.wait_for_navigation().await.ok();
        // Concurrent opens for the same site race; last insert wins.
        self.pages
            .write()
            .await
            .insert(profile.id.clone(), page.clone());
        Ok(page)
    }

    /// Verify the browser is still responsive.
    pub async fn health_check(&self) -> Result<bool> {
        let _version = self.browser.version().await?;
        Ok(true)
    }

    pub async fn close(mut self) -> Result<()> {
        self.pages.write().await.clear();
        self.browser.close().await?;
        Ok(())
    }
}

/// What to do with an already-open tab for a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TabAction {
    /// Still on the site's host; keep the page as-is, no reload.
    Reuse,
    /// Off-site or URL unknown; drive it back to the profile URL.
    Renavigate,
}

fn plan_reuse(current: Option<&str>, target: &str) -> TabAction {
    match current {
        Some(url) if same_host(url, target) => TabAction::Reuse,
        _ => TabAction::Renavigate,
    }
}

/// Host-level comparison; path and query differences never force a reload.
fn same_host(current: &str, target: &str) -> bool {
    match (Url::parse(current), Url::parse(target)) {
        (Ok(a), Ok(b)) => match (a.host_str(), b.host_str()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => false,
    }
}

/// Find a Chrome/Chromium binary on the system.
fn find_chrome_executable() -> Result<PathBuf> {
    let paths = [
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ];

    for path in &paths {
        let p = PathBuf::from(path);
        if p.exists() {
            info!("Found Chrome at: {}", path);
            return Ok(p);
        }
    }

    // Playwright-managed Chromium works too, if a full build is present.
    if let Some(home) = dirs::home_dir() {
        for cache in [
            home.join("Library/Caches/ms-playwright"),
            home.join(".cache/ms-playwright"),
        ] {
            let Ok(entries) = std::fs::read_dir(&cache) else {
                continue;
            };
            let mut chromium_dirs: Vec<_> = entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with("chromium-"))
                .collect();
            chromium_dirs.sort_by_key(|b| std::cmp::Reverse(b.file_name()));

            for dir in chromium_dirs {
                for candidate in [
                    dir.path().join("chrome-linux/chrome"),
                    dir.path().join("chrome-mac/Chromium.app/Contents/MacOS/Chromium"),
                ] {
                    if candidate.exists() {
                        info!("Using Playwright Chromium at: {:?}", candidate);
                        return Ok(candidate);
                    }
                }
            }
        }
    }

    anyhow::bail!("Chrome/Chromium not found. Install Google Chrome or run npx playwright install chromium.")
}
