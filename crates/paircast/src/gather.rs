//! Gather phase: rank, select, compose.
//!
//! A single best-effort pass with no retries of its own; the outer cycle
//! owns trying again. Each step short-circuits on an empty answer, and all
//! three failures share one error kind so the orchestrator treats them
//! uniformly while the diagnostics stay distinct.

use tracing::info;

use crate::compose::{MessageComposer, PairSelector};
use crate::error::{GatherStage, PublishError, PublishResult};
use crate::store::PairSource;
use crate::types::Draft;

/// Run the three gather steps once and produce a draft to publish.
pub async fn gather(
    source: &dyn PairSource,
    selector: &dyn PairSelector,
    composer: &dyn MessageComposer,
) -> PublishResult<Draft> {
    let pairs = match source.fetch_top_pairs().await {
        Ok(pairs) => pairs,
        Err(e) => return Err(PublishError::empty(GatherStage::Ranking, format!("{e:#}"))),
    };
    if pairs.is_empty() {
        return Err(PublishError::empty(
            GatherStage::Ranking,
            "ranking source returned no pairs",
        ));
    }
    info!(count = pairs.len(), "[1/3] fetched ranked pairs");

    let Some(pair) = selector.select(&pairs) else {
        return Err(PublishError::empty(
            GatherStage::Selection,
            format!("no pair selected from {} candidates", pairs.len()),
        ));
    };
    info!(pair = %pair, "[2/3] selected pair to publish");

    let Some(text) = composer.compose(&pair) else {
        return Err(PublishError::empty(
            GatherStage::Composition,
            format!("composed message for {pair} was empty"),
        ));
    };
    info!(pair = %pair, chars = text.len(), "[3/3] composed update");

    Ok(Draft::new(pair, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{MockMessageComposer, MockPairSelector};
    use crate::store::MockPairSource;
    use crate::types::Pair;

    fn ranked_pairs() -> Vec<Pair> {
        vec![
            Pair::new("BTC/USDT", 9.0e8, &["binance", "kraken"]),
            Pair::new("ETH/USDT", 5.0e8, &["kraken"]),
        ]
    }

    #[tokio::test]
    async fn test_gather_produces_a_draft() {
        let mut source = MockPairSource::new();
        source
            .expect_fetch_top_pairs()
            .times(1)
            .returning(|| Ok(ranked_pairs()));

        let mut selector = MockPairSelector::new();
        selector
            .expect_select()
            .times(1)
            .returning(|pairs| Some(pairs[0].clone()));

        let mut composer = MockMessageComposer::new();
        composer
            .expect_compose()
            .times(1)
            .returning(|pair| Some(format!("update for {pair}")));

        let draft = gather(&source, &selector, &composer).await.unwrap();
        assert_eq!(draft.pair.symbol, "BTC/USDT");
        assert_eq!(draft.text, "update for BTC/USDT");
    }

    #[tokio::test]
    async fn test_empty_ranking_short_circuits_later_steps() {
        let mut source = MockPairSource::new();
        source.expect_fetch_top_pairs().returning(|| Ok(Vec::new()));

        let mut selector = MockPairSelector::new();
        selector.expect_select().times(0);
        let mut composer = MockMessageComposer::new();
        composer.expect_compose().times(0);

        let err = gather(&source, &selector, &composer).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::EmptyResult {
                stage: GatherStage::Ranking,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_ranking_error_reports_the_same_kind() {
        let mut source = MockPairSource::new();
        source
            .expect_fetch_top_pairs()
            .returning(|| Err(anyhow::anyhow!("connection refused")));

        let mut selector = MockPairSelector::new();
        selector.expect_select().times(0);
        let composer = MockMessageComposer::new();

        let err = gather(&source, &selector, &composer).await.unwrap_err();
        match err {
            PublishError::EmptyResult { stage, detail } => {
                assert_eq!(stage, GatherStage::Ranking);
                assert!(detail.contains("connection refused"));
            }
            other => panic!("expected EmptyResult, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_selector_declining_stops_before_compose() {
        let mut source = MockPairSource::new();
        source.expect_fetch_top_pairs().returning(|| Ok(ranked_pairs()));

        let mut selector = MockPairSelector::new();
        selector.expect_select().times(1).returning(|_| None);

        let mut composer = MockMessageComposer::new();
        composer.expect_compose().times(0);

        let err = gather(&source, &selector, &composer).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::EmptyResult {
                stage: GatherStage::Selection,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_composition_fails_the_phase() {
        let mut source = MockPairSource::new();
        source.expect_fetch_top_pairs().returning(|| Ok(ranked_pairs()));

        let mut selector = MockPairSelector::new();
        selector
            .expect_select()
            .returning(|pairs| Some(pairs[0].clone()));

        let mut composer = MockMessageComposer::new();
        composer.expect_compose().times(1).returning(|_| None);

        let err = gather(&source, &selector, &composer).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::EmptyResult {
                stage: GatherStage::Composition,
                ..
            }
        ));
    }
}
