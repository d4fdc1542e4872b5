//! Multi-panelist debate simulation.
//!
//! A [`Facilitator`] owns the [`DebateContext`] of one debate: the
//! [`Panelist`]s built from a [`DebateSpec`], the agenda stack and the
//! [`DiscussionLog`]. [`Facilitator::run`] plays one round and yields
//! [`DebateEvent`]s as they happen:
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let mut facilitator = Facilitator::new(&spec, &models, "OpenAI", Some(&setup)).await?;
//! let stream = facilitator.run("Should cities ban cars?", false, true, Lang::En);
//! futures::pin_mut!(stream);
//! while let Some(event) = stream.next().await {
//!     match event? {
//!         DebateEvent::RoundComplete => break,
//!         other => println!("{:?}", other),
//!     }
//! }
//! ```

pub mod config;
pub mod context;
pub mod event;
pub mod facilitator;
pub mod panelist;

pub use config::{DebateSpec, PanelistSpec, ParticipantConfig, PromptTemplates};
pub use context::{DebateContext, DiscussionLog, LogEntry};
pub use event::{DebateEvent, Lang, OPTIMIZER_SPEAKER, SYSTEM_SPEAKER};
pub use facilitator::Facilitator;
pub use panelist::{Panelist, SpeculativePrompt, SpeculativeResponse};
