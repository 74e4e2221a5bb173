//! RelayService: method dispatch behind the control socket.
//!
//! The browser launches lazily on the first method that needs it, so
//! `start` returns immediately and a `status` probe never spawns Chrome.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::browser::{picker, BrowserClient, CdpDriver, Orchestrator};
use crate::error::DeliveryError;
use crate::models::{PendingDelivery, SiteProfile};
use crate::profiles::{ProfileStore, SelectorKind};

/// Upper bound on opening or revisiting a site tab.
const NAVIGATION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Per-site handoff between a send trigger and its delivery. One slot per
/// site; a newer trigger overwrites an unconsumed one, and consumption
/// empties the slot so a superseded delivery can notice and stand down.
pub struct DeliverySlots {
    slots: StdMutex<HashMap<String, PendingDelivery>>,
}

impl DeliverySlots {
    pub fn new() -> Self {
        Self {
            slots: StdMutex::new(HashMap::new()),
        }
    }

    pub fn queue(&self, site_id: &str, text: String) {
        self.slots.lock().unwrap().insert(
            site_id.to_string(),
            PendingDelivery {
                site_id: site_id.to_string(),
                text,
            },
        );
    }

    pub fn take(&self, site_id: &str) -> Option<PendingDelivery> {
        self.slots.lock().unwrap().remove(site_id)
    }
}

impl Default for DeliverySlots {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RelayService {
    client: Arc<RwLock<Option<Arc<BrowserClient>>>>,
    store: Mutex<ProfileStore>,
    slots: DeliverySlots,
    orchestrator: Orchestrator,
    user_data_dir: PathBuf,
    headless: bool,
}

impl RelayService {
    pub fn new(headless: bool) -> Result<Self> {
        let base_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".prompt-relay");
        std::fs::create_dir_all(&base_dir)?;

        let store = ProfileStore::open_default()?;

        Ok(Self {
            client: Arc::new(RwLock::new(None)),
            store: Mutex::new(store),
            slots: DeliverySlots::new(),
            orchestrator: Orchestrator::default(),
            user_data_dir: base_dir.join("browser-profile"),
            headless,
        })
    }

    pub async fn dispatch(&self, method: &str, params: HashMap<String, Value>) -> Result<Value> {
        match method {
            "health" => self.handle_health().await,
            "relay.send" | "send" => self.handle_send(params).await,
            "detect.selector" | "detect" => self.handle_detect(params, false).await,
            "detect.auto" | "auto_detect" => self.handle_detect(params, true).await,
            "profile.list" => self.handle_profile_list().await,
            "profile.get" => self.handle_profile_get(params).await,
            "profile.set_selector" => self.handle_profile_set_selector(params).await,
            "profile.reset" => self.handle_profile_reset().await,
            _ => Err(anyhow::anyhow!("Unknown method: {}", method)),
        }
    }

    async fn get_or_init_client(&self) -> Result<Arc<BrowserClient>> {
        if let Some(existing) = self.client.read().await.as_ref() {
            return Ok(Arc::clone(existing));
        }

        let mut client_lock = self.client.write().await;
        if client_lock.is_none() {
            info!("Launching browser");
            let client =
                BrowserClient::launch(self.user_data_dir.clone(), self.headless).await?;
            *client_lock = Some(Arc::new(client));
        }

        client_lock
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| anyhow::anyhow!("Failed to get browser client"))
    }

    async fn profile(&self, site_id: &str) -> Result<SiteProfile> {
        self.store
            .lock()
            .await
            .get(site_id)
            .cloned()
            .with_context(|| format!("Unknown site: {}", site_id))
    }

    async fn handle_health(&self) -> Result<Value> {
        let browser = match self.client.read().await.as_ref() {
            Some(client) => {
                if client.health_check().await.unwrap_or(false) {
                    "running"
                } else {
                    "unresponsive"
                }
            }
            None => "idle",
        };
        Ok(json!({
            "status": "ok",
            "browser": browser,
            "version": env!("CARGO_PKG_VERSION"),
        }))
    }

    async fn handle_send(&self, params: HashMap<String, Value>) -> Result<Value> {
        let site = require_str(&params, "site")?;
        let text = require_str(&params, "text")?;
        let raw = opt_bool(&params, "raw").unwrap_or(false);
        let feature = opt_str(&params, "feature");

        let profile = self.profile(site).await?;
        let profile = self.profile_with_feature(profile, feature)?;
        if !profile.enabled {
            anyhow::bail!("Site is disabled: {}", site);
        }

        let wrapped = if raw {
            text.to_string()
        } else {
            profile.wrap_text(text)
        };
        self.slots.queue(site, wrapped);

        let client = self.get_or_init_client().await?;
        let page = tokio::time::timeout(NAVIGATION_TIMEOUT, client.open_site(&profile))
            .await
            .map_err(|_| {
                let e = DeliveryError::Timeout(format!("navigation to {}", profile.url));
                anyhow::anyhow!("{}: {}", e.code(), e)
            })??;

        // A later send may have replaced the slot while the page was
        // loading; in that case the newer call owns the delivery.
        let Some(pending) = self.slots.take(site) else {
            info!(site, "delivery superseded before the page was ready");
            return Ok(json!({ "site": site, "delivered": false, "superseded": true }));
        };

        info!(site = %pending.site_id, chars = pending.text.len(), "delivering");
        let driver = CdpDriver::new(page);
        let outcome = self
            .orchestrator
            .deliver(&driver, &profile, &pending.text)
            .await
            .map_err(|e| anyhow::anyhow!("{}: {}", e.code(), e))?;

        Ok(json!({
            "site": outcome.site_id,
            "delivered": true,
            "via": outcome.via,
        }))
    }

    fn profile_with_feature(
        &self,
        mut profile: SiteProfile,
        feature: Option<&str>,
    ) -> Result<SiteProfile> {
        if let Some(feature) = feature {
            if !profile.features.contains_key(feature) {
                anyhow::bail!("Unknown feature '{}' for site {}", feature, profile.id);
            }
            profile.current_feature = Some(feature.to_string());
        }
        Ok(profile)
    }

    async fn handle_detect(&self, params: HashMap<String, Value>, auto: bool) -> Result<Value> {
        let site = require_str(&params, "site")?;
        let kind = parse_selector_kind(require_str(&params, "kind")?)?;
        let save = opt_bool(&params, "save").unwrap_or(true);

        let profile = self.profile(site).await?;
        let client = self.get_or_init_client().await?;
        let page = client.open_site(&profile).await?;

        let inference = if auto {
            picker::auto_detect(&page, kind).await?
        } else {
            picker::infer(&page, kind).await?
        };

        match inference {
            Some(inference) => {
                if save {
                    self.store
                        .lock()
                        .await
                        .set_selector(site, kind, &inference.selector)?;
                }
                Ok(json!({
                    "found": true,
                    "selector": inference.selector,
                    "confidence": inference.confidence,
                    "saved": save,
                }))
            }
            None => Ok(json!({ "found": false })),
        }
    }

    async fn handle_profile_list(&self) -> Result<Value> {
        let store = self.store.lock().await;
        let profiles: Vec<Value> = store
            .get_all()
            .into_iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "name": p.name,
                    "url": p.url,
                    "enabled": p.enabled,
                    "input_selector": p.input_selector,
                    "submit_selector": p.submit_selector,
                    "current_feature": p.current_feature,
                })
            })
            .collect();
        Ok(json!({ "profiles": profiles }))
    }

    async fn handle_profile_get(&self, params: HashMap<String, Value>) -> Result<Value> {
        let site = require_str(&params, "site")?;
        let profile = self.profile(site).await?;
        Ok(serde_json::to_value(profile)?)
    }

    async fn handle_profile_set_selector(
        &self,
        params: HashMap<String, Value>,
    ) -> Result<Value> {
        let site = require_str(&params, "site")?;
        let kind = parse_selector_kind(require_str(&params, "kind")?)?;
        let selector = require_str(&params, "selector")?;

        self.store
            .lock()
            .await
            .set_selector(site, kind, selector)?;
        Ok(json!({ "saved": true, "site": site, "selector": selector }))
    }

    async fn handle_profile_reset(&self) -> Result<Value> {
        self.store.lock().await.reset()?;
        Ok(json!({ "reset": true }))
    }
}

fn require_str<'a>(params: &'a HashMap<String, Value>, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .with_context(|| format!("Missing '{}' parameter", key))
}

fn opt_str<'a>(params: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn opt_bool(params: &HashMap<String, Value>, key: &str) -> Option<bool> {
    params.get(key).and_then(|v| v.as_bool())
}

fn parse_selector_kind(kind: &str) -> Result<SelectorKind> {
    match kind {
        "input" | "textarea" | "text_area" => Ok(SelectorKind::TextArea),
        "submit" | "button" | "submit_button" => Ok(SelectorKind::SubmitButton),
        other => Err(anyhow::anyhow!(
            "Unknown selector kind '{}' (expected 'input' or 'submit')",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_str_present() {
        let mut params = HashMap::new();
        params.insert("site".to_string(), json!("chatgpt"));
        assert_eq!(require_str(&params, "site").unwrap(), "chatgpt");
    }

    #[test]
    fn test_require_str_missing_names_the_key() {
        let params = HashMap::new();
        let err = require_str(&params, "text").unwrap_err();
        assert!(err.to_string().contains("'text'"));
    }

    #[test]
    fn test_require_str_rejects_non_string() {
        let mut params = HashMap::new();
        params.insert("site".to_string(), json!(42));
        assert!(require_str(&params, "site").is_err());
    }

    #[test]
    fn test_opt_bool() {
        let mut params = HashMap::new();
        params.insert("raw".to_string(), json!(true));
        assert_eq!(opt_bool(&params, "raw"), Some(true));
        assert_eq!(opt_bool(&params, "save"), None);
    }

    #[test]
    fn test_parse_selector_kind_aliases() {
        for alias in ["input", "textarea", "text_area"] {
            assert_eq!(parse_selector_kind(alias).unwrap(), SelectorKind::TextArea);
        }
        for alias in ["submit", "button", "submit_button"] {
            assert_eq!(
                parse_selector_kind(alias).unwrap(),
                SelectorKind::SubmitButton
            );
        }
        assert!(parse_selector_kind("link").is_err());
    }

    #[test]
    fn test_slots_last_write_wins() {
        let slots = DeliverySlots::new();
        slots.queue("chatgpt", "first".into());
        slots.queue("chatgpt", "second".into());
        assert_eq!(slots.take("chatgpt").unwrap().text, "second");
    }

    #[test]
    fn test_slots_take_empties_the_slot() {
        let slots = DeliverySlots::new();
        slots.queue("kimi", "hello".into());
        assert!(slots.take("kimi").is_some());
        assert!(slots.take("kimi").is_none());
    }

    #[test]
    fn test_slots_are_per_site() {
        let slots = DeliverySlots::new();
        slots.queue("chatgpt", "a".into());
        slots.queue("kimi", "b".into());
        assert_eq!(slots.take("kimi").unwrap().text, "b");
        assert_eq!(slots.take("chatgpt").unwrap().text, "a");
    }
}
