use std::sync::Arc;

use tracing::info;

use crate::attention::MatrixSelector;
use crate::config::VizConfig;
use crate::model::{Dataset, Token, tokens_from};
use crate::render::PerformanceMode;
use crate::service::ReductionService;

/// Everything a visualization needs from the host, passed explicitly at
/// construction and on update.
#[derive(Clone)]
pub struct Session {
    pub dataset: Arc<Dataset>,
    pub tokens: Arc<[Token]>,
    pub config: Arc<VizConfig>,
    pub selector: MatrixSelector,
    pub performance_mode: PerformanceMode,
    pub reduction: Option<Arc<dyn ReductionService>>,
    /// One flag per token; empty when no search is active.
    pub search_matches: Arc<[bool]>,
}

impl Session {
    pub fn new(
        dataset: Dataset,
        config: Arc<VizConfig>,
        reduction: Option<Arc<dyn ReductionService>>,
    ) -> Self {
        info!(
            tokens = dataset.token_count(),
            layers = dataset.layer_count(),
            model = dataset.model_name(),
            "dataset accepted"
        );
        let tokens: Arc<[Token]> = tokens_from(&dataset.tokens).into();
        Self {
            dataset: Arc::new(dataset),
            tokens,
            performance_mode: config.performance_mode,
            config,
            selector: MatrixSelector::default(),
            reduction,
            search_matches: Arc::from(Vec::new()),
        }
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn same_dataset(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.dataset, &other.dataset)
    }

    pub fn is_match(&self, token: usize) -> bool {
        self.search_matches.get(token).copied().unwrap_or(false)
    }

    pub fn searching(&self) -> bool {
        self.search_matches.iter().any(|matched| *matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_dataset() {
        let dataset = Dataset {
            tokens: vec!["[CLS]".into(), "##ing".into()],
            ..Dataset::default()
        };
        let session = Session::new(dataset, Arc::new(VizConfig::default()), None);
        assert_eq!(session.tokens[1].label, "ing");
        assert!(session.same_dataset(&session.clone()));
        assert!(!session.searching());
    }
}
