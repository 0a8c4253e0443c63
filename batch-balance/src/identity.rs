//! Faction member lookup
//!
//! The member list is scraped by the host page and may not be available when a
//! batch is requested. Providers hide how readiness is detected behind
//! [`IdentityProvider::wait_ready`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

pub const UNKNOWN_PLAYER: &str = "Unknown player";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(alias = "name")]
    pub display_name: String,
    /// Currently a valid recipient for `give`
    #[serde(alias = "isInFaction")]
    pub is_eligible: bool,
}

impl Identity {
    pub fn new(display_name: impl Into<String>, is_eligible: bool) -> Self {
        Self {
            display_name: display_name.into(),
            is_eligible,
        }
    }
}

/// Read-only snapshot of target id → identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityMap(HashMap<String, Identity>);

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target_id: impl Into<String>, identity: Identity) {
        self.0.insert(target_id.into(), identity);
    }

    pub fn get(&self, target_id: &str) -> Option<&Identity> {
        self.0.get(target_id)
    }

    pub fn is_eligible(&self, target_id: &str) -> bool {
        self.0.get(target_id).is_some_and(|i| i.is_eligible)
    }

    pub fn display_name(&self, target_id: &str) -> Option<&str> {
        self.0.get(target_id).map(|i| i.display_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Identity)> for IdentityMap {
    fn from_iter<T: IntoIterator<Item = (K, Identity)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Resolves once the member list is available.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn wait_ready(&self) -> IdentityMap;
}

/// A member list that is already known
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    map: IdentityMap,
}

impl StaticIdentity {
    pub fn new(map: IdentityMap) -> Self {
        Self { map }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn wait_ready(&self) -> IdentityMap {
        self.map.clone()
    }
}

/// Polls a source until it reports a member list. No timeout: the page either
/// renders the list or the operator navigates away.
pub struct PollingIdentity<F> {
    source: F,
    interval: Duration,
}

impl<F> PollingIdentity<F>
where
    F: Fn() -> Option<IdentityMap> + Send + Sync,
{
    pub fn new(source: F) -> Self {
        Self {
            source,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl<F> IdentityProvider for PollingIdentity<F>
where
    F: Fn() -> Option<IdentityMap> + Send + Sync,
{
    async fn wait_ready(&self) -> IdentityMap {
        let mut polls: u64 = 0;
        loop {
            if let Some(map) = (self.source)() {
                debug!(members = map.len(), polls, "Member list available");
                return map;
            }
            polls += 1;
            if polls % 25 == 0 {
                info!(
                    "Still waiting for the member list... {} ms",
                    polls * self.interval.as_millis() as u64
                );
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_lookup() {
        let map: IdentityMap = [
            ("15", Identity::new("Leslie", true)),
            ("4", Identity::new("Duke", false)),
        ]
        .into_iter()
        .collect();
        assert!(map.is_eligible("15"));
        assert!(!map.is_eligible("4"));
        assert!(!map.is_eligible("99"));
        assert_eq!(map.display_name("4"), Some("Duke"));
        assert_eq!(map.display_name("99"), None);
    }

    #[test]
    fn test_deserializes_scraped_shape() {
        let map: IdentityMap = serde_json::from_str(
            r#"{"15":{"name":"Leslie","isInFaction":true},"4":{"displayName":"Duke","isEligible":false}}"#,
        )
        .unwrap();
        assert_eq!(map.get("15"), Some(&Identity::new("Leslie", true)));
        assert_eq!(map.get("4"), Some(&Identity::new("Duke", false)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_waits_for_source() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let provider = PollingIdentity::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                None
            } else {
                Some([("15", Identity::new("Leslie", true))].into_iter().collect())
            }
        });

        let started = tokio::time::Instant::now();
        let map = provider.wait_ready().await;
        assert_eq!(map.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= Duration::from_millis(600));
    }
}
