//! Gateway context object and the cascading-failover dispatcher.
//!
//! One [`Gateway`] is built at startup from a [`GatewayConfig`] and lives for
//! the process. Per-provider mutable state (key pools, circuit breakers) is
//! owned here; the dispatcher serializes access through their own locks and
//! never holds a lock across an upstream call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};

use crate::adapters::{
    AlphaVantageAdapter, EastMoneyAdapter, FinnhubAdapter, SinaAdapter, TiingoAdapter,
    TwelveDataAdapter,
};
use crate::circuit_breaker::CircuitBreaker;
use crate::classify::FailureClass;
use crate::config::GatewayConfig;
use crate::dispatch::{failure_summary, Attempt, AttemptOutcome, Dispatched};
use crate::domain::Symbol;
use crate::error::GatewayError;
use crate::http_client::HttpClient;
use crate::key_pool::{ApiKey, KeyPool};
use crate::pacing::Pacer;
use crate::provider::{AdapterFuture, Operation, ProviderAdapter};
use crate::routing::SourceRouter;
use crate::source::ProviderId;

struct ProviderHandle {
    adapter: Arc<dyn ProviderAdapter>,
    /// `None` means the provider has no credentials and is unavailable.
    keys: Option<KeyPool>,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl ProviderHandle {
    fn available(&self) -> bool {
        self.keys.is_some()
    }
}

/// Process-wide gateway core: adapters, router, key pools, breakers.
pub struct Gateway {
    providers: HashMap<ProviderId, ProviderHandle>,
    router: SourceRouter,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(config: GatewayConfig, http: Arc<dyn HttpClient>) -> Self {
        let timeout_ms = |provider: ProviderId| config.timeout_for(provider).as_millis() as u64;

        let adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
            Arc::new(FinnhubAdapter::new(http.clone(), timeout_ms(ProviderId::Finnhub))),
            Arc::new(AlphaVantageAdapter::new(
                http.clone(),
                timeout_ms(ProviderId::Alphavantage),
            )),
            Arc::new(TwelveDataAdapter::new(
                http.clone(),
                timeout_ms(ProviderId::Twelvedata),
            )),
            Arc::new(TiingoAdapter::new(http.clone(), timeout_ms(ProviderId::Tiingo))),
            Arc::new(SinaAdapter::new(
                http.clone(),
                timeout_ms(ProviderId::Sina),
                Pacer::new(config.pacing_interval),
            )),
            Arc::new(EastMoneyAdapter::new(
                http,
                timeout_ms(ProviderId::Eastmoney),
                Pacer::new(config.pacing_interval),
            )),
        ];

        let capabilities: HashMap<_, _> = adapters
            .iter()
            .map(|adapter| (adapter.id(), adapter.capabilities()))
            .collect();

        let providers = adapters
            .into_iter()
            .map(|adapter| {
                let id = adapter.id();
                let keys = if id.is_keyless() {
                    Some(KeyPool::keyless())
                } else {
                    config.credentials.get(&id).and_then(|raw| {
                        KeyPool::from_credentials(
                            raw,
                            config.key_reset_window,
                            config.key_rotation_enabled,
                        )
                    })
                };
                let handle = ProviderHandle {
                    adapter,
                    keys,
                    breaker: CircuitBreaker::new(config.breaker),
                    timeout: config.timeout_for(id),
                };
                (id, handle)
            })
            .collect();

        let router = SourceRouter::new(
            config.custom_priority.clone(),
            config.market_overrides.clone(),
            config.legacy_head.clone(),
            capabilities,
        );

        Self {
            providers,
            router,
            config,
        }
    }

    /// Router output for one call; exposed for diagnostics and tests.
    pub fn candidates(&self, operation: Operation, symbol: Option<&str>) -> Vec<ProviderId> {
        self.router.candidates(operation, symbol)
    }

    pub fn is_provider_available(&self, provider: ProviderId) -> bool {
        self.providers
            .get(&provider)
            .is_some_and(ProviderHandle::available)
    }

    pub fn key_pool(&self, provider: ProviderId) -> Option<&KeyPool> {
        self.providers.get(&provider)?.keys.as_ref()
    }

    pub fn circuit(&self, provider: ProviderId) -> Option<&CircuitBreaker> {
        self.providers.get(&provider).map(|handle| &handle.breaker)
    }

    /// Walk the candidate list, rotating keys within a provider and failing
    /// over across providers per the classification policy.
    pub(crate) async fn dispatch<T, F>(
        &self,
        operation: Operation,
        symbol: Option<&Symbol>,
        mut invoke: F,
    ) -> Result<Dispatched<T>, GatewayError>
    where
        F: for<'a> FnMut(&'a dyn ProviderAdapter, ApiKey) -> AdapterFuture<'a, T>,
    {
        let started = Instant::now();
        let deadline = self.config.dispatch_deadline;
        let tool = operation.tool_name();

        let mut candidates = self.router.candidates(operation, symbol.map(Symbol::as_str));
        if candidates.is_empty() {
            return Err(GatewayError::ServiceUnavailable {
                tool: tool.to_owned(),
                attempts: Vec::new(),
            });
        }
        if !self.config.failover_enabled {
            candidates.truncate(1);
        }

        let mut attempts: Vec<Attempt> = Vec::new();

        'providers: for provider in candidates {
            let Some(handle) = self.providers.get(&provider) else {
                continue;
            };
            let Some(pool) = handle.keys.as_ref() else {
                debug!(%provider, tool, "provider has no credentials, skipping");
                continue;
            };

            if !handle.breaker.allow_request() {
                debug!(%provider, tool, "circuit open, skipping provider");
                attempts.push(Attempt::skipped(provider, format!("{provider}: circuit open")));
                continue;
            }

            for _ in 0..pool.len() {
                let Some(key) = pool.acquire() else {
                    debug!(%provider, tool, "all keys cooling down");
                    attempts.push(Attempt::skipped(
                        provider,
                        format!("{provider}: all keys cooling down"),
                    ));
                    continue 'providers;
                };

                let mut tries: u32 = 0;
                loop {
                    tries += 1;
                    let elapsed = started.elapsed();
                    if elapsed >= deadline {
                        return Err(self.deadline_error(tool, started, attempts));
                    }
                    let remaining = deadline - elapsed;
                    let per_call = handle.timeout.min(remaining);
                    let attempt_started = SystemTime::now();

                    let outcome =
                        tokio::time::timeout(per_call, invoke(handle.adapter.as_ref(), key.clone()))
                            .await;

                    match outcome {
                        Ok(Ok(data)) => {
                            handle.breaker.record_success();
                            pool.record_success(key.index);
                            attempts.push(Attempt::success(provider, key.index, attempt_started));
                            return Ok(Dispatched {
                                data,
                                provider,
                                attempts,
                                total_duration_ms: elapsed_ms(started),
                            });
                        }
                        Ok(Err(error)) => {
                            if error.is_unsupported() {
                                attempts.push(Attempt::skipped(provider, error.message()));
                                continue 'providers;
                            }

                            let class = error.class();
                            debug!(%provider, tool, ?class, error = error.message(), "attempt failed");
                            attempts.push(Attempt::failure(
                                provider,
                                key.index,
                                attempt_started,
                                error.message(),
                            ));

                            match class {
                                FailureClass::RateLimit => {
                                    pool.mark_rate_limited(key.index);
                                    if pool.rotate() {
                                        break; // next key on the same provider
                                    }
                                    continue 'providers;
                                }
                                FailureClass::Timeout | FailureClass::Transient => {
                                    handle.breaker.record_failure();
                                    if self.retry_in_place(started, deadline, tries).await {
                                        // The failure just recorded may have
                                        // opened the circuit; retried calls
                                        // re-enter the gate like any other.
                                        if handle.breaker.allow_request() {
                                            continue;
                                        }
                                        attempts.push(Attempt::skipped(
                                            provider,
                                            format!("{provider}: circuit open"),
                                        ));
                                    }
                                    continue 'providers;
                                }
                                FailureClass::Permanent => {
                                    return Err(GatewayError::UpstreamPermanent {
                                        provider,
                                        message: error.message().to_owned(),
                                        attempts,
                                    });
                                }
                            }
                        }
                        Err(_) => {
                            // Per-call timer fired. A window truncated by the
                            // request deadline is a caller abort: record it
                            // and stop without poisoning key or circuit.
                            if per_call < handle.timeout {
                                attempts.push(Attempt::failure(
                                    provider,
                                    key.index,
                                    attempt_started,
                                    format!("{provider}: aborted by request deadline"),
                                ));
                                return Err(self.deadline_error(tool, started, attempts));
                            }

                            let message =
                                format!("{provider}: request timed out after {} ms", per_call.as_millis());
                            attempts.push(Attempt::failure(
                                provider,
                                key.index,
                                attempt_started,
                                message,
                            ));
                            handle.breaker.record_failure();
                            if self.retry_in_place(started, deadline, tries).await {
                                if handle.breaker.allow_request() {
                                    continue;
                                }
                                attempts.push(Attempt::skipped(
                                    provider,
                                    format!("{provider}: circuit open"),
                                ));
                            }
                            continue 'providers;
                        }
                    }
                }
            }
        }

        let every_candidate_skipped = attempts
            .iter()
            .all(|attempt| attempt.outcome == AttemptOutcome::Skipped);
        if every_candidate_skipped {
            warn!(tool, "no candidate provider was callable");
            return Err(GatewayError::ServiceUnavailable {
                tool: tool.to_owned(),
                attempts,
            });
        }

        warn!(tool, attempts = attempts.len(), "all providers failed");
        Err(GatewayError::AggregateFailure {
            tool: tool.to_owned(),
            summary: failure_summary(&attempts),
            attempts,
        })
    }

    /// Sleep out the backoff for a same-provider retry when the policy and
    /// the request deadline both allow another try.
    async fn retry_in_place(&self, started: Instant, deadline: Duration, tries: u32) -> bool {
        if !self.config.retry.allows_retry(tries) {
            return false;
        }
        let delay = self.config.retry.backoff.delay(tries - 1);
        if started.elapsed() + delay >= deadline {
            return false;
        }
        tokio::time::sleep(delay).await;
        true
    }

    fn deadline_error(&self, tool: &str, started: Instant, attempts: Vec<Attempt>) -> GatewayError {
        warn!(tool, "request deadline exceeded mid-cascade");
        GatewayError::DeadlineExceeded {
            tool: tool.to_owned(),
            elapsed_ms: elapsed_ms(started),
            attempts,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}
