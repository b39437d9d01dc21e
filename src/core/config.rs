//! Environment configuration
//!
//! Read once at startup, after loading `.env` if one exists.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::{GatewayConfig, InteractionStore, MemoryStore, NpcRouter, RestStore};
use crate::{DEFAULT_GATEWAY_URL, DEFAULT_MODEL};

/// Supabase table credentials
#[derive(Debug, Clone, PartialEq)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_key: String,
}

/// Process configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub supabase: Option<SupabaseConfig>,
    /// NPC answering unmatched messages; random universal role when unset
    pub default_npc: Option<String>,
    /// `ZEP_API_KEY` was set. Zep memory is not supported.
    pub zep_configured: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Load `.env` then read the process environment
    pub fn from_env() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => warn!(error = %e, ".env present but unreadable"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let gateway = GatewayConfig {
            base_url: var("AI_GATEWAY_URL").unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
            api_key: var("AI_GATEWAY_API_KEY"),
            model: var("AI_GATEWAY_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            local_mode: var("LOCAL_DEV_MODE").as_deref().is_some_and(parse_flag),
            ..GatewayConfig::default()
        };

        let supabase = match (var("SUPABASE_URL"), var("SUPABASE_SERVICE_KEY")) {
            (Some(url), Some(service_key)) => Some(SupabaseConfig { url, service_key }),
            _ => None,
        };

        Self {
            gateway,
            supabase,
            default_npc: var("HELIOS_DEFAULT_NPC"),
            zep_configured: var("ZEP_API_KEY").is_some(),
        }
    }

    /// Rest store when Supabase is configured, memory otherwise
    pub fn store(&self) -> Arc<dyn InteractionStore> {
        match &self.supabase {
            Some(sb) => {
                info!(url = %sb.url, "interaction log: supabase");
                Arc::new(RestStore::new(sb.url.clone(), sb.service_key.clone()))
            }
            None => {
                info!("interaction log: in-memory");
                Arc::new(MemoryStore::new())
            }
        }
    }

    pub fn router(&self) -> NpcRouter {
        match &self.default_npc {
            Some(id) => NpcRouter::with_default(id.clone()),
            None => NpcRouter::new(),
        }
    }

    /// Log what is on and off
    pub fn log_summary(&self) {
        if self.gateway.local_mode {
            info!("LOCAL_DEV_MODE set, gateway calls are simulated");
        } else if self.gateway.api_key.is_none() {
            warn!("AI_GATEWAY_API_KEY not set, gateway calls are simulated");
        } else {
            info!(url = %self.gateway.base_url, model = %self.gateway.model, "gateway configured");
        }
        if self.zep_configured {
            warn!("ZEP_API_KEY is set but Zep memory is not supported, ignoring");
        }
    }
}

/// `1`, `true`, `yes`, `on` (any case)
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.gateway.base_url, DEFAULT_GATEWAY_URL);
        assert_eq!(cfg.gateway.model, DEFAULT_MODEL);
        assert!(cfg.gateway.api_key.is_none());
        assert!(!cfg.gateway.local_mode);
        assert!(cfg.supabase.is_none());
        assert_eq!(cfg.router().fallback(), &crate::core::RouterFallback::RandomUniversal);
    }

    #[test]
    fn test_gateway_overrides() {
        let cfg = config(&[
            ("AI_GATEWAY_URL", "http://localhost:8080/v1"),
            ("AI_GATEWAY_API_KEY", " sk-test "),
            ("AI_GATEWAY_MODEL", "openai/gpt-4o"),
        ]);
        assert_eq!(cfg.gateway.base_url, "http://localhost:8080/v1");
        assert_eq!(cfg.gateway.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.gateway.model, "openai/gpt-4o");
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let cfg = config(&[("AI_GATEWAY_API_KEY", "   ")]);
        assert!(cfg.gateway.api_key.is_none());
    }

    #[test]
    fn test_local_dev_mode_flag() {
        assert!(config(&[("LOCAL_DEV_MODE", "true")]).gateway.local_mode);
        assert!(config(&[("LOCAL_DEV_MODE", "1")]).gateway.local_mode);
        assert!(!config(&[("LOCAL_DEV_MODE", "false")]).gateway.local_mode);
        assert!(parse_flag("YES"));
        assert!(!parse_flag("maybe"));
    }

    #[test]
    fn test_supabase_needs_both_values() {
        assert!(config(&[("SUPABASE_URL", "https://x.supabase.co")]).supabase.is_none());

        let cfg = config(&[
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_SERVICE_KEY", "svc"),
        ]);
        assert_eq!(cfg.store().backend(), "rest");
        assert_eq!(config(&[]).store().backend(), "memory");
    }

    #[test]
    fn test_default_npc_and_zep() {
        let cfg = config(&[("HELIOS_DEFAULT_NPC", "bartender"), ("ZEP_API_KEY", "z")]);
        assert_eq!(
            cfg.router().fallback(),
            &crate::core::RouterFallback::Default("bartender".to_string())
        );
        assert!(cfg.zep_configured);
    }
}
