//! Environment-derived gateway configuration.
//!
//! Read once at startup; the resulting [`GatewayConfig`] is plain data so
//! tests can build isolated gateways without touching the process
//! environment.
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `FINNHUB_API_KEY` … `TIINGO_API_KEY` | comma-separated key pool per provider; absent means unavailable |
//! | `API_FAILOVER_ENABLED` | `false` restricts dispatch to the first candidate |
//! | `PRIMARY_API_SOURCE`, `SECONDARY_API_SOURCE` | legacy head of the candidate order for all tools |
//! | `API_TIMEOUT_MS`, `FINNHUB_TIMEOUT_MS`, `ALPHAVANTAGE_TIMEOUT_MS` | single upstream call deadline |
//! | `RETRY_*` | same-provider retry envelope |
//! | `CIRCUIT_BREAKER_*` | breaker tuning |
//! | `KEY_ROTATION_ENABLED`, `KEY_ROTATION_RESET_WINDOW_MS` | key cooldown behavior |
//! | `SOURCE_PRIORITY_<TOOL>` | per-tool candidate order, unknown tags ignored |
//! | `MARKET_SOURCES_<MARKET>` | per-market coverage override |

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::domain::Market;
use crate::provider::Operation;
use crate::retry::{Backoff, RetryConfig};
use crate::source::ProviderId;

const DEFAULT_DISPATCH_DEADLINE: Duration = Duration::from_secs(30);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_KEY_RESET_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_PACING_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Raw comma-separated credential lists for the keyed providers.
    pub credentials: HashMap<ProviderId, String>,
    pub failover_enabled: bool,
    /// Whole-request deadline covering the full cascade.
    pub dispatch_deadline: Duration,
    /// Default deadline for one upstream call.
    pub call_timeout: Duration,
    pub provider_timeouts: HashMap<ProviderId, Duration>,
    pub retry: RetryConfig,
    pub breaker: CircuitBreakerConfig,
    pub key_rotation_enabled: bool,
    pub key_reset_window: Duration,
    pub custom_priority: HashMap<Operation, Vec<ProviderId>>,
    pub market_overrides: HashMap<Market, Vec<ProviderId>>,
    pub legacy_head: Vec<ProviderId>,
    /// Minimum request spacing for the Chinese-market adapters.
    pub pacing_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            credentials: HashMap::new(),
            failover_enabled: true,
            dispatch_deadline: DEFAULT_DISPATCH_DEADLINE,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            provider_timeouts: HashMap::new(),
            retry: RetryConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            key_rotation_enabled: true,
            key_reset_window: DEFAULT_KEY_RESET_WINDOW,
            custom_priority: HashMap::new(),
            market_overrides: HashMap::new(),
            legacy_head: Vec::new(),
            pacing_interval: DEFAULT_PACING_INTERVAL,
        }
    }
}

impl GatewayConfig {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup; tests feed maps here.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        for (provider, variable) in [
            (ProviderId::Finnhub, "FINNHUB_API_KEY"),
            (ProviderId::Alphavantage, "ALPHAVANTAGE_API_KEY"),
            (ProviderId::Twelvedata, "TWELVEDATA_API_KEY"),
            (ProviderId::Tiingo, "TIINGO_API_KEY"),
        ] {
            if let Some(raw) = lookup(variable) {
                config.credentials.insert(provider, raw);
            }
        }

        config.failover_enabled = bool_var(&lookup, "API_FAILOVER_ENABLED", true);

        if let Some(timeout) = duration_ms_var(&lookup, "API_TIMEOUT_MS") {
            config.call_timeout = timeout;
        }
        for (provider, variable) in [
            (ProviderId::Finnhub, "FINNHUB_TIMEOUT_MS"),
            (ProviderId::Alphavantage, "ALPHAVANTAGE_TIMEOUT_MS"),
        ] {
            if let Some(timeout) = duration_ms_var(&lookup, variable) {
                config.provider_timeouts.insert(provider, timeout);
            }
        }

        config.retry = RetryConfig {
            enabled: bool_var(&lookup, "RETRY_ENABLED", false),
            max_attempts: u32_var(&lookup, "RETRY_MAX_ATTEMPTS", 3).max(1),
            backoff: Backoff {
                initial_delay: duration_ms_var(&lookup, "RETRY_INITIAL_DELAY_MS")
                    .unwrap_or(Duration::from_millis(200)),
                max_delay: duration_ms_var(&lookup, "RETRY_MAX_DELAY_MS")
                    .unwrap_or(Duration::from_secs(3)),
                ..Backoff::default()
            },
        };

        config.breaker = CircuitBreakerConfig {
            enabled: bool_var(&lookup, "CIRCUIT_BREAKER_ENABLED", true),
            failure_threshold: u32_var(&lookup, "CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5).max(1),
            open_timeout: duration_ms_var(&lookup, "CIRCUIT_BREAKER_TIMEOUT_MS")
                .unwrap_or(Duration::from_secs(60)),
            half_open_max_probes: u32_var(&lookup, "CIRCUIT_BREAKER_HALF_OPEN_ATTEMPTS", 1).max(1),
        };

        config.key_rotation_enabled = bool_var(&lookup, "KEY_ROTATION_ENABLED", true);
        if let Some(window) = duration_ms_var(&lookup, "KEY_ROTATION_RESET_WINDOW_MS") {
            config.key_reset_window = window;
        }

        for operation in Operation::ALL {
            let variable = format!("SOURCE_PRIORITY_{}", operation.tool_name().to_uppercase());
            let raw = lookup(&variable).or_else(|| {
                (operation == Operation::Quote)
                    .then(|| lookup("SOURCE_PRIORITY_GET_QUOTE"))
                    .flatten()
            });
            if let Some(raw) = raw {
                let providers = provider_list(&raw);
                if !providers.is_empty() {
                    config.custom_priority.insert(operation, providers);
                }
            }
        }

        for market in Market::ALL {
            let variable = format!("MARKET_SOURCES_{}", market.as_str());
            if let Some(raw) = lookup(&variable) {
                let providers = provider_list(&raw);
                if !providers.is_empty() {
                    config.market_overrides.insert(market, providers);
                }
            }
        }

        let mut head = Vec::new();
        for variable in ["PRIMARY_API_SOURCE", "SECONDARY_API_SOURCE"] {
            if let Some(provider) = lookup(variable)
                .as_deref()
                .and_then(|raw| ProviderId::from_str(raw).ok())
            {
                head.push(provider);
            }
        }
        config.legacy_head = head;

        config
    }

    /// Effective single-call timeout for one provider.
    pub fn timeout_for(&self, provider: ProviderId) -> Duration {
        self.provider_timeouts
            .get(&provider)
            .copied()
            .unwrap_or(self.call_timeout)
    }
}

fn bool_var(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    lookup(name)
        .map(|raw| {
            let lowered = raw.trim().to_ascii_lowercase();
            !matches!(lowered.as_str(), "false" | "0" | "no" | "off")
        })
        .unwrap_or(default)
}

fn u32_var(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u32) -> u32 {
    lookup(name)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn duration_ms_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<Duration> {
    lookup(name)
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Parse a comma-separated provider list, ignoring unknown tags.
fn provider_list(raw: &str) -> Vec<ProviderId> {
    raw.split(',')
        .filter_map(|tag| ProviderId::from_str(tag).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_owned())
        }
    }

    #[test]
    fn defaults_apply_without_environment() {
        let config = GatewayConfig::from_lookup(|_| None);

        assert!(config.failover_enabled);
        assert!(config.credentials.is_empty());
        assert!(!config.retry.enabled);
        assert!(config.breaker.enabled);
        assert_eq!(config.call_timeout, Duration::from_secs(10));
        assert_eq!(config.key_reset_window, Duration::from_secs(60));
    }

    #[test]
    fn timeouts_and_overrides_parse_from_millis() {
        let pairs = [
            ("API_TIMEOUT_MS", "2500"),
            ("FINNHUB_TIMEOUT_MS", "1200"),
            ("CIRCUIT_BREAKER_FAILURE_THRESHOLD", "3"),
            ("KEY_ROTATION_RESET_WINDOW_MS", "30000"),
        ];
        let config = GatewayConfig::from_lookup(lookup_from(&pairs));

        assert_eq!(config.call_timeout, Duration::from_millis(2500));
        assert_eq!(
            config.timeout_for(ProviderId::Finnhub),
            Duration::from_millis(1200)
        );
        assert_eq!(
            config.timeout_for(ProviderId::Tiingo),
            Duration::from_millis(2500)
        );
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.key_reset_window, Duration::from_secs(30));
    }

    #[test]
    fn source_priority_ignores_unknown_tags() {
        let pairs = [(
            "SOURCE_PRIORITY_GET_STOCK_QUOTE",
            "twelvedata, bloomberg ,finnhub",
        )];
        let config = GatewayConfig::from_lookup(lookup_from(&pairs));

        assert_eq!(
            config.custom_priority[&Operation::Quote],
            vec![ProviderId::Twelvedata, ProviderId::Finnhub]
        );
    }

    #[test]
    fn quote_alias_variable_is_honored() {
        let pairs = [("SOURCE_PRIORITY_GET_QUOTE", "tiingo")];
        let config = GatewayConfig::from_lookup(lookup_from(&pairs));
        assert_eq!(
            config.custom_priority[&Operation::Quote],
            vec![ProviderId::Tiingo]
        );
    }

    #[test]
    fn legacy_source_pair_builds_the_head() {
        let pairs = [
            ("PRIMARY_API_SOURCE", "alphavantage"),
            ("SECONDARY_API_SOURCE", "tiingo"),
        ];
        let config = GatewayConfig::from_lookup(lookup_from(&pairs));
        assert_eq!(
            config.legacy_head,
            vec![ProviderId::Alphavantage, ProviderId::Tiingo]
        );
    }

    #[test]
    fn market_sources_override_coverage() {
        let pairs = [("MARKET_SOURCES_HK", "eastmoney,sina")];
        let config = GatewayConfig::from_lookup(lookup_from(&pairs));
        assert_eq!(
            config.market_overrides[&Market::Hk],
            vec![ProviderId::Eastmoney, ProviderId::Sina]
        );
    }

    #[test]
    fn falsey_flags_disable_features() {
        let pairs = [
            ("API_FAILOVER_ENABLED", "false"),
            ("CIRCUIT_BREAKER_ENABLED", "0"),
            ("KEY_ROTATION_ENABLED", "off"),
            ("RETRY_ENABLED", "true"),
        ];
        let config = GatewayConfig::from_lookup(lookup_from(&pairs));

        assert!(!config.failover_enabled);
        assert!(!config.breaker.enabled);
        assert!(!config.key_rotation_enabled);
        assert!(config.retry.enabled);
    }
}
