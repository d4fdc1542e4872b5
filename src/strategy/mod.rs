//! Discussion strategy optimizer.
//!
//! At an intervention turn the strategist:
//!
//! 1. asks the [`DiscussionStateJudge`] which state the discussion is in
//!    (skipped when no states are configured),
//! 2. builds one prompt per tail phrase legal in that state,
//! 3. has the panelist answer each prompt without committing,
//! 4. scores the resulting hypothetical discussions with the
//!    [`DiscussionEvaluator`], and
//! 5. commits and returns the highest-scoring answer.
//!
//! The judge and the evaluator share one injected [`crate::embedding::Embedder`].

pub mod config;
pub mod evaluator;
pub mod judge;
pub mod strategist;

pub use config::{StrategistConfig, StrategySetup};
pub use evaluator::DiscussionEvaluator;
pub use judge::DiscussionStateJudge;
pub use strategist::{DiscussionStrategist, Trial};
