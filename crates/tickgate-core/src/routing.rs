//! Market-aware source routing.
//!
//! For a `(tool, symbol)` pair the router produces the ordered provider list
//! the dispatcher will walk. The base order comes from per-tool priority
//! tables (env-overridable), gets intersected with the symbol's market
//! coverage, then filtered by adapter capability. An empty result means no
//! provider can serve the call at all.

use std::collections::{HashMap, HashSet};

use crate::domain::Market;
use crate::provider::{CapabilitySet, Operation};
use crate::source::ProviderId;

/// Built-in per-operation candidate order.
pub fn default_priority(operation: Operation) -> &'static [ProviderId] {
    use Operation::*;
    use ProviderId::*;

    match operation {
        Quote => &[Finnhub, Twelvedata, Alphavantage, Tiingo, Sina, Eastmoney],
        Candles => &[Finnhub, Twelvedata, Tiingo, Eastmoney],
        DailyPrices => &[Alphavantage, Tiingo, Twelvedata, Eastmoney],
        News => &[Finnhub, Alphavantage, Tiingo],
        CompanyOverview => &[Finnhub, Alphavantage, Tiingo],
        BasicFinancials => &[Finnhub],
        CompanyMetrics => &[Finnhub, Alphavantage],
        IncomeStatement | BalanceSheet | CashFlow => &[Alphavantage],
        TechnicalIndicator => &[Twelvedata, Alphavantage],
    }
}

/// Built-in provider coverage per market, in canonical fallback order.
pub fn default_coverage(market: Market) -> &'static [ProviderId] {
    use ProviderId::*;

    match market {
        Market::Us => &[Finnhub, Alphavantage, Twelvedata, Tiingo],
        Market::Sh | Market::Sz | Market::Bj | Market::Hk => &[Sina, Eastmoney],
        Market::Unknown => &ProviderId::ALL,
    }
}

pub struct SourceRouter {
    custom_priority: HashMap<Operation, Vec<ProviderId>>,
    market_overrides: HashMap<Market, Vec<ProviderId>>,
    /// `PRIMARY_API_SOURCE`/`SECONDARY_API_SOURCE` head, applied to every tool.
    legacy_head: Vec<ProviderId>,
    capabilities: HashMap<ProviderId, CapabilitySet>,
}

impl SourceRouter {
    pub fn new(
        custom_priority: HashMap<Operation, Vec<ProviderId>>,
        market_overrides: HashMap<Market, Vec<ProviderId>>,
        legacy_head: Vec<ProviderId>,
        capabilities: HashMap<ProviderId, CapabilitySet>,
    ) -> Self {
        Self {
            custom_priority,
            market_overrides,
            legacy_head,
            capabilities,
        }
    }

    /// Ordered candidate providers for one call.
    pub fn candidates(&self, operation: Operation, symbol: Option<&str>) -> Vec<ProviderId> {
        let mut base: Vec<ProviderId> = self
            .custom_priority
            .get(&operation)
            .cloned()
            .unwrap_or_else(|| default_priority(operation).to_vec());

        if !self.legacy_head.is_empty() {
            let mut headed = self.legacy_head.clone();
            headed.extend(base);
            base = headed;
        }

        if let Some(symbol) = symbol {
            let market = Market::classify(symbol);
            let coverage = self.coverage(market);
            let covered: Vec<ProviderId> = base
                .iter()
                .copied()
                .filter(|provider| coverage.contains(provider))
                .collect();
            base = if covered.is_empty() { coverage } else { covered };
        }

        base.retain(|provider| {
            self.capabilities
                .get(provider)
                .is_some_and(|caps| caps.supports(operation))
        });

        dedupe(base)
    }

    fn coverage(&self, market: Market) -> Vec<ProviderId> {
        self.market_overrides
            .get(&market)
            .cloned()
            .unwrap_or_else(|| default_coverage(market).to_vec())
    }
}

fn dedupe(chain: Vec<ProviderId>) -> Vec<ProviderId> {
    let mut seen = HashSet::new();
    chain
        .into_iter()
        .filter(|provider| seen.insert(*provider))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::CapabilitySet;

    fn full_capabilities() -> HashMap<ProviderId, CapabilitySet> {
        use Operation::*;
        const FINNHUB: CapabilitySet = CapabilitySet::new(&[
            Quote,
            Candles,
            News,
            CompanyOverview,
            BasicFinancials,
            CompanyMetrics,
        ]);
        const ALPHAVANTAGE: CapabilitySet = CapabilitySet::new(&[
            Quote,
            DailyPrices,
            News,
            CompanyOverview,
            CompanyMetrics,
            IncomeStatement,
            BalanceSheet,
            CashFlow,
            TechnicalIndicator,
        ]);
        const TWELVEDATA: CapabilitySet =
            CapabilitySet::new(&[Quote, Candles, DailyPrices, TechnicalIndicator]);
        const TIINGO: CapabilitySet =
            CapabilitySet::new(&[Quote, Candles, DailyPrices, News, CompanyOverview]);
        const SINA: CapabilitySet = CapabilitySet::new(&[Quote]);
        const EASTMONEY: CapabilitySet = CapabilitySet::new(&[Quote, Candles, DailyPrices]);

        HashMap::from([
            (ProviderId::Finnhub, FINNHUB),
            (ProviderId::Alphavantage, ALPHAVANTAGE),
            (ProviderId::Twelvedata, TWELVEDATA),
            (ProviderId::Tiingo, TIINGO),
            (ProviderId::Sina, SINA),
            (ProviderId::Eastmoney, EASTMONEY),
        ])
    }

    fn router() -> SourceRouter {
        SourceRouter::new(
            HashMap::new(),
            HashMap::new(),
            Vec::new(),
            full_capabilities(),
        )
    }

    #[test]
    fn us_quote_keeps_the_default_order() {
        let chain = router().candidates(Operation::Quote, Some("AAPL"));
        assert_eq!(
            chain,
            vec![
                ProviderId::Finnhub,
                ProviderId::Twelvedata,
                ProviderId::Alphavantage,
                ProviderId::Tiingo,
            ]
        );
    }

    #[test]
    fn mainland_quote_routes_to_chinese_providers() {
        let chain = router().candidates(Operation::Quote, Some("601899.SH"));
        assert_eq!(chain, vec![ProviderId::Sina, ProviderId::Eastmoney]);
    }

    #[test]
    fn capability_filter_drops_quote_only_providers() {
        let chain = router().candidates(Operation::Candles, Some("601899.SH"));
        assert_eq!(chain, vec![ProviderId::Eastmoney]);
    }

    #[test]
    fn empty_intersection_falls_back_to_market_coverage() {
        let custom = HashMap::from([(Operation::Quote, vec![ProviderId::Finnhub])]);
        let router = SourceRouter::new(
            custom,
            HashMap::new(),
            Vec::new(),
            full_capabilities(),
        );

        let chain = router.candidates(Operation::Quote, Some("601899.SH"));
        assert_eq!(chain, vec![ProviderId::Sina, ProviderId::Eastmoney]);
    }

    #[test]
    fn custom_priority_overrides_the_default_order() {
        let custom = HashMap::from([(
            Operation::Quote,
            vec![ProviderId::Twelvedata, ProviderId::Finnhub],
        )]);
        let router = SourceRouter::new(custom, HashMap::new(), Vec::new(), full_capabilities());

        let chain = router.candidates(Operation::Quote, Some("AAPL"));
        assert_eq!(chain, vec![ProviderId::Twelvedata, ProviderId::Finnhub]);
    }

    #[test]
    fn legacy_head_is_prepended_for_every_tool() {
        let router = SourceRouter::new(
            HashMap::new(),
            HashMap::new(),
            vec![ProviderId::Tiingo],
            full_capabilities(),
        );

        let chain = router.candidates(Operation::Quote, Some("AAPL"));
        assert_eq!(chain[0], ProviderId::Tiingo);
        assert_eq!(chain[1], ProviderId::Finnhub);
        // No duplicate tiingo later in the chain.
        assert_eq!(chain.iter().filter(|p| **p == ProviderId::Tiingo).count(), 1);
    }

    #[test]
    fn market_override_replaces_builtin_coverage() {
        let overrides = HashMap::from([(Market::Hk, vec![ProviderId::Eastmoney])]);
        let router = SourceRouter::new(
            HashMap::new(),
            overrides,
            Vec::new(),
            full_capabilities(),
        );

        let chain = router.candidates(Operation::Quote, Some("00700.HK"));
        assert_eq!(chain, vec![ProviderId::Eastmoney]);
    }

    #[test]
    fn unknown_market_symbols_pass_the_full_base_list() {
        let chain = router().candidates(Operation::Quote, Some("brk.b"));
        assert_eq!(chain.len(), 6);
    }

    #[test]
    fn no_symbol_skips_the_market_filter() {
        let chain = router().candidates(Operation::TechnicalIndicator, None);
        assert_eq!(chain, vec![ProviderId::Twelvedata, ProviderId::Alphavantage]);
    }

    #[test]
    fn every_candidate_supports_the_tool_and_covers_the_market() {
        let router = router();
        let symbols = ["AAPL", "601899.SH", "000001.SZ", "00700.HK", "x y z"];

        for operation in Operation::ALL {
            for symbol in symbols {
                let market = Market::classify(symbol);
                let coverage = default_coverage(market);
                for provider in router.candidates(operation, Some(symbol)) {
                    assert!(
                        full_capabilities()[&provider].supports(operation),
                        "{provider} cannot serve {operation}"
                    );
                    assert!(
                        coverage.contains(&provider),
                        "{provider} does not cover {}",
                        market
                    );
                }
            }
        }
    }
}
