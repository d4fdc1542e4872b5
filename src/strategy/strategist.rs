//! Best-of-N intervention selection.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::config::StrategistConfig;
use super::evaluator::DiscussionEvaluator;
use super::judge::DiscussionStateJudge;
use crate::debate::Panelist;
use crate::embedding::{argmax, Embedder};
use crate::error::{DebateError, DebateResult};
use crate::metrics::MetricsCollector;

/// State label recorded in metrics when no judge is configured.
const UNJUDGED_STATE: &str = "any";

/// One scored candidate, kept for the debug trial log.
#[derive(Debug, Clone, Serialize)]
pub struct Trial {
    pub prompt: String,
    pub response: String,
    pub reward: f64,
}

/// Picks the best of several tail-phrase interventions for a panelist turn.
///
/// Every candidate is generated speculatively from the panelist's committed
/// history, scored with the [`DiscussionEvaluator`], and only the winner is
/// committed back to the panelist.
pub struct DiscussionStrategist {
    tail_prompts: Vec<String>,
    legal_prompts: BTreeMap<String, Vec<usize>>,
    judge: Option<DiscussionStateJudge>,
    evaluator: DiscussionEvaluator,
    parallel_candidates: bool,
}

impl std::fmt::Debug for DiscussionStrategist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscussionStrategist")
            .field("tail_prompts", &self.tail_prompts.len())
            .field("judged", &self.judge.is_some())
            .field("parallel_candidates", &self.parallel_candidates)
            .finish()
    }
}

impl DiscussionStrategist {
    /// Build the strategist. A state judge is created only when the config
    /// lists state names; the judge and the evaluator share `embedder`.
    pub async fn new(
        config: &StrategistConfig,
        llm: Arc<dyn crate::llm::LlmProvider>,
        embedder: Arc<dyn Embedder>,
    ) -> DebateResult<Self> {
        let judge = if config.state_names().is_empty() {
            tracing::info!("No discussion states configured; every intervention is legal");
            None
        } else {
            Some(
                DiscussionStateJudge::new(
                    config.state_names().to_vec(),
                    config.state_judge_prompt.clone(),
                    llm,
                    embedder.clone(),
                )
                .await?,
            )
        };

        Ok(Self {
            tail_prompts: config.tail_prompts.clone(),
            legal_prompts: config.legal_prompts_dict.clone(),
            judge,
            evaluator: DiscussionEvaluator::new(embedder),
            parallel_candidates: config.parallel_candidates,
        })
    }

    /// Build the strategist with the embedder described by `config`.
    pub async fn from_config(
        config: &StrategistConfig,
        llm: Arc<dyn crate::llm::LlmProvider>,
    ) -> DebateResult<Self> {
        let embedder = config.build_embedder()?;
        Self::new(config, llm, embedder).await
    }

    pub fn has_judge(&self) -> bool {
        self.judge.is_some()
    }

    /// Indices of the tail prompts legal in `state`, in tail order.
    ///
    /// `None` means no judging: every tail is legal.
    pub fn legal_prompts(&self, state: Option<&str>) -> DebateResult<Vec<usize>> {
        let Some(state) = state else {
            return Ok((0..self.tail_prompts.len()).collect());
        };
        let allowed = self
            .legal_prompts
            .get(state)
            .ok_or_else(|| DebateError::UnknownState(state.to_string()))?;
        let legal: Vec<usize> = (0..self.tail_prompts.len())
            .filter(|i| allowed.contains(i))
            .collect();
        if legal.is_empty() {
            return Err(DebateError::UnknownState(state.to_string()));
        }
        Ok(legal)
    }

    /// Generate one candidate per legal intervention, keep the best, and
    /// commit only that exchange to `panelist`.
    pub async fn best_response(
        &self,
        previous_comments: &[String],
        base_prompt: &str,
        panelist: &mut Panelist,
    ) -> DebateResult<String> {
        let state = match &self.judge {
            Some(judge) => Some(judge.classify(previous_comments).await?),
            None => None,
        };
        let legal = self.legal_prompts(state.as_deref())?;

        let prompts: Vec<String> = legal
            .iter()
            .map(|&i| format!("{}{}", base_prompt, self.tail_prompts[i]))
            .collect();

        let responses = if self.parallel_candidates {
            panelist.generate_batch_concurrent(&prompts).await?
        } else {
            panelist.generate_batch_without_commit(&prompts).await?
        };

        let discussions: Vec<Vec<String>> = responses
            .iter()
            .map(|response| {
                let mut discussion = previous_comments.to_vec();
                discussion.push(response.clone());
                discussion
            })
            .collect();
        let rewards = self.evaluator.score(&discussions).await?;
        if rewards.len() != prompts.len() {
            return Err(DebateError::ScoreCountMismatch {
                expected: prompts.len(),
                actual: rewards.len(),
            });
        }

        let best = argmax(&rewards).ok_or_else(|| {
            DebateError::InvalidInput("no finite reward among candidates".to_string())
        })?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            let trials: Vec<Trial> = prompts
                .iter()
                .zip(&responses)
                .zip(&rewards)
                .map(|((prompt, response), reward)| Trial {
                    prompt: prompt.clone(),
                    response: response.clone(),
                    reward: *reward,
                })
                .collect();
            tracing::debug!(
                panelist = %panelist.id(),
                state = state.as_deref().unwrap_or(UNJUDGED_STATE),
                best,
                trials = %serde_json::to_string_pretty(&trials).unwrap_or_default(),
                "Strategist trial log"
            );
        }

        MetricsCollector::new().record_intervention(
            state.as_deref().unwrap_or(UNJUDGED_STATE),
            prompts.len(),
            rewards[best],
        );

        panelist.commit(&prompts[best], &responses[best]);
        Ok(responses[best].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::GenerationRequest;
    use crate::template::PromptTemplate;
    use crate::test_support::{MockLlmProvider, TableEmbedder};

    fn config(state_names: Option<Vec<&str>>) -> StrategistConfig {
        let mut legal = BTreeMap::new();
        legal.insert("escalating".to_string(), vec![2]);
        legal.insert("converging".to_string(), vec![0, 1]);
        StrategistConfig {
            tail_prompts: vec![" T0".to_string(), " T1".to_string(), " T2".to_string()],
            legal_prompts_dict: legal,
            state_names: state_names.map(|s| s.into_iter().map(String::from).collect()),
            state_judge_prompt: PromptTemplate::new("${__comments__}|${__options__}"),
            embedding_model_name: "table".to_string(),
            torch_device: "cpu".to_string(),
            embedding_api_base: None,
            embedding_api_key: None,
            embedding_dimension: None,
            max_embedding_chars: None,
            parallel_candidates: false,
        }
    }

    /// Panelist replies echo the tail: "base T1" -> "reply T1".
    fn echo_tail(request: &GenerationRequest) -> String {
        let prompt = request.messages.last().map(|m| m.content.as_str()).unwrap_or("");
        let tail = prompt.rsplit(' ').next().unwrap_or("");
        format!("reply {}", tail)
    }

    fn embedder() -> Arc<TableEmbedder> {
        // Impact is driven by the full text; the reply with the farthest
        // full-text embedding wins.
        Arc::new(TableEmbedder::new(
            2,
            vec![
                ("escalating", vec![0.0, 0.0]),
                ("converging", vec![10.0, 0.0]),
                ("calm", vec![9.0, 0.0]),
                ("hello", vec![0.0, 0.0]),
                ("helloreply T0", vec![1.0, 0.0]),
                ("helloreply T1", vec![4.0, 0.0]),
                ("helloreply T2", vec![2.0, 0.0]),
            ],
        ))
    }

    #[tokio::test]
    async fn test_legal_prompts_without_judge() {
        let llm = Arc::new(MockLlmProvider::new(vec![]));
        let strategist = DiscussionStrategist::new(&config(None), llm, embedder())
            .await
            .unwrap();
        assert!(!strategist.has_judge());
        assert_eq!(strategist.legal_prompts(None).unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_unknown_state_is_an_error() {
        let llm = Arc::new(MockLlmProvider::new(vec![]));
        let strategist = DiscussionStrategist::new(&config(None), llm, embedder())
            .await
            .unwrap();
        assert!(matches!(
            strategist.legal_prompts(Some("stalled")),
            Err(DebateError::UnknownState(s)) if s == "stalled"
        ));
    }

    #[tokio::test]
    async fn test_best_response_commits_single_winner() {
        let judge_llm = Arc::new(MockLlmProvider::new(vec![]));
        let strategist = DiscussionStrategist::new(&config(None), judge_llm, embedder())
            .await
            .unwrap();

        let panelist_llm = Arc::new(MockLlmProvider::with_responder(echo_tail));
        let mut panelist = Panelist::new("1", "Bob", "skeptic", "mock", panelist_llm.clone(), "sys");

        let best = strategist
            .best_response(&["hello".to_string()], "base", &mut panelist)
            .await
            .unwrap();

        assert_eq!(best, "reply T1");
        assert_eq!(panelist_llm.calls(), 3);
        assert_eq!(
            panelist_llm.user_prompts(),
            vec!["base T0", "base T1", "base T2"]
        );

        let history = panelist.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].content, "base T1");
        assert_eq!(history[2].content, "reply T1");
    }

    #[tokio::test]
    async fn test_judged_state_restricts_candidates() {
        let judge_llm = Arc::new(MockLlmProvider::new(vec!["calm"]));
        let strategist = DiscussionStrategist::new(
            &config(Some(vec!["escalating", "converging"])),
            judge_llm.clone(),
            embedder(),
        )
        .await
        .unwrap();
        assert!(strategist.has_judge());

        let panelist_llm = Arc::new(MockLlmProvider::with_responder(echo_tail));
        let mut panelist = Panelist::new("1", "Bob", "skeptic", "mock", panelist_llm.clone(), "sys");

        let best = strategist
            .best_response(&["hello".to_string()], "base", &mut panelist)
            .await
            .unwrap();

        // "calm" is nearest to "converging", which allows T0 and T1.
        assert_eq!(judge_llm.calls(), 1);
        assert_eq!(panelist_llm.user_prompts(), vec!["base T0", "base T1"]);
        assert_eq!(best, "reply T1");
        assert_eq!(panelist.history().len(), 3);
    }

    #[tokio::test]
    async fn test_tied_rewards_pick_first_candidate() {
        let judge_llm = Arc::new(MockLlmProvider::new(vec![]));
        let strategist = DiscussionStrategist::new(
            &config(None),
            judge_llm,
            Arc::new(TableEmbedder::new(2, vec![])),
        )
        .await
        .unwrap();

        let panelist_llm = Arc::new(MockLlmProvider::with_responder(echo_tail));
        let mut panelist = Panelist::new("1", "Bob", "skeptic", "mock", panelist_llm, "sys");
        let best = strategist
            .best_response(&[], "base", &mut panelist)
            .await
            .unwrap();
        assert_eq!(best, "reply T0");
    }

    #[tokio::test]
    async fn test_parallel_candidates_keep_order() {
        let mut cfg = config(None);
        cfg.parallel_candidates = true;
        let strategist = DiscussionStrategist::new(
            &cfg,
            Arc::new(MockLlmProvider::new(vec![])),
            embedder(),
        )
        .await
        .unwrap();

        let panelist_llm = Arc::new(MockLlmProvider::with_responder(echo_tail));
        let mut panelist = Panelist::new("1", "Bob", "skeptic", "mock", panelist_llm, "sys");
        let best = strategist
            .best_response(&["hello".to_string()], "base", &mut panelist)
            .await
            .unwrap();
        assert_eq!(best, "reply T1");
    }
}
