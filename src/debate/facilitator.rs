//! Round-robin debate driver.

use futures::Stream;
use std::collections::HashMap;
use std::sync::Arc;

use super::config::DebateSpec;
use super::context::{DebateContext, LogEntry};
use super::event::{DebateEvent, Lang};
use super::panelist::Panelist;
use crate::error::{DebateError, DebateResult};
use crate::llm::{resolve_clients, ClientFactory, LlmProvider};
use crate::strategy::{DiscussionStrategist, StrategySetup};
use crate::template::PromptTemplate;

pub const PERSONA: &str = "__persona__";
pub const CHARACTERISTICS: &str = "__characteristics__";
pub const LAST_AGENDA: &str = "__last_agenda__";
pub const CURRENT_AGENDA: &str = "__current_agenda__";
pub const COMMENTS_ON_LAST_AGENDA: &str = "__opponents_comments_on_last_agenda__";
pub const COMMENTS_ON_CURRENT_AGENDA: &str = "__opponents_comments_on_current_agenda__";

const OPEN_QUOTE: &str = "「";
const CLOSE_QUOTE: &str = "」";

/// Drives panelists through debate rounds.
///
/// One facilitator serves one debate; continuation rounds reuse it so
/// panelists keep their memories and the discussion log keeps growing.
pub struct Facilitator {
    context: DebateContext,
    clients: HashMap<String, Arc<dyn LlmProvider>>,
    strategist: Option<Arc<DiscussionStrategist>>,
}

impl std::fmt::Debug for Facilitator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<_> = self.clients.keys().collect();
        tags.sort();
        f.debug_struct("Facilitator")
            .field("context", &self.context)
            .field("clients", &tags)
            .field("strategist", &self.strategist)
            .finish()
    }
}

impl Facilitator {
    /// Resolve one client per model tag, create the panelists, and build
    /// the strategist on the `default_tag` client when `strategy` is given.
    pub async fn new(
        spec: &DebateSpec,
        factory: &dyn ClientFactory,
        default_tag: &str,
        strategy: Option<&StrategySetup>,
    ) -> DebateResult<Self> {
        if spec.panelists.is_empty() {
            return Err(DebateError::NoPanelists);
        }

        let tags = spec.model_tags();
        let clients = resolve_clients(tags.iter().map(String::as_str), default_tag, factory)?;

        let mut panelists = Vec::with_capacity(spec.panelists.len());
        for (i, p) in spec.panelists.iter().enumerate() {
            let client = clients
                .get(&p.model)
                .cloned()
                .ok_or_else(|| crate::error::ConfigError::UnknownModel(p.model.clone()))?;
            let system_prompt = spec.prompts.system_prompt.safe_substitute(&[
                (PERSONA, p.persona.as_str()),
                (CHARACTERISTICS, p.characteristics.as_str()),
            ]);
            panelists.push(Panelist::new(
                i.to_string(),
                &p.name,
                &p.persona,
                &p.model,
                client,
                system_prompt,
            ));
        }

        let strategist = match strategy {
            Some(setup) => {
                let llm = clients
                    .get(default_tag)
                    .cloned()
                    .ok_or_else(|| crate::error::ConfigError::UnknownModel(default_tag.to_string()))?;
                Some(Arc::new(
                    DiscussionStrategist::new(&setup.config, llm, setup.embedder.clone()).await?,
                ))
            }
            None => None,
        };

        tracing::info!(
            panelists = panelists.len(),
            clients = clients.len(),
            turns = spec.num_discussion_turn,
            strategist = strategist.is_some(),
            "Facilitator ready"
        );

        Ok(Self {
            context: DebateContext::new(panelists, spec.prompts.clone(), spec.num_discussion_turn),
            clients,
            strategist,
        })
    }

    pub fn context(&self) -> &DebateContext {
        &self.context
    }

    pub fn has_strategist(&self) -> bool {
        self.strategist.is_some()
    }

    /// Template for `position` (0-based) in `turn` (1-based).
    pub fn prompt_template(&self, is_continuation: bool, turn: u32, position: usize) -> &PromptTemplate {
        let prompts = &self.context.prompts;
        let last = self.context.panelists.len().saturating_sub(1);
        match (is_continuation, turn, position) {
            (false, _, 0) => &prompts.first_user_prompt,
            (false, _, _) => &prompts.subsequent_user_prompt,
            (true, 1, 0) => &prompts.additional_first_user_prompt,
            (true, 1, p) if p == last => &prompts.additional_last_user_prompt,
            (true, 1, _) => &prompts.additional_subsequent_user_prompt,
            (true, _, _) => &prompts.subsequent_user_prompt,
        }
    }

    /// Fill agenda and comment-history placeholders for `panelist_id`.
    ///
    /// A history placeholder whose agenda is still empty is an error.
    pub fn substitute_placeholders(
        &self,
        template: &PromptTemplate,
        panelist_id: &str,
    ) -> DebateResult<String> {
        let current = self.context.current_agenda();
        let last = self.context.last_agenda();

        let mut histories: Vec<(&str, String)> = Vec::new();
        if template.references(COMMENTS_ON_LAST_AGENDA) {
            if last.is_empty() {
                return Err(DebateError::MissingAgenda {
                    placeholder: COMMENTS_ON_LAST_AGENDA,
                    agenda: "last_agenda",
                });
            }
            histories.push((COMMENTS_ON_LAST_AGENDA, self.unseen_comments(panelist_id, last)));
        }
        if template.references(COMMENTS_ON_CURRENT_AGENDA) {
            if current.is_empty() {
                return Err(DebateError::MissingAgenda {
                    placeholder: COMMENTS_ON_CURRENT_AGENDA,
                    agenda: "current_agenda",
                });
            }
            histories.push((COMMENTS_ON_CURRENT_AGENDA, self.unseen_comments(panelist_id, current)));
        }

        let mut mapping: Vec<(&str, &str)> = histories
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect();
        mapping.push((LAST_AGENDA, last));
        mapping.push((CURRENT_AGENDA, current));

        Ok(template.safe_substitute(&mapping))
    }

    fn unseen_comments(&self, panelist_id: &str, agenda: &str) -> String {
        self.context
            .discussion_log
            .unseen_by(panelist_id, agenda)
            .iter()
            .map(|e| format!("{} : {}", e.panelist_name, quote_comment(&e.comment)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Run one round of `num_discussion_turn` turns on `agenda`.
    ///
    /// The stream ends with [`DebateEvent::RoundComplete`] on success, or
    /// with a single error. Dropping it mid-round leaves the context with
    /// whatever was logged so far.
    pub fn run(
        &mut self,
        agenda: impl Into<String>,
        is_continuation: bool,
        use_strategy: bool,
        lang: Lang,
    ) -> impl Stream<Item = DebateResult<DebateEvent>> + '_ {
        let agenda = agenda.into();
        async_stream::try_stream! {
            self.context.agendas.push(agenda.clone());
            self.context.use_strategy = use_strategy;
            self.context.lang = lang;

            for turn in 1..=self.context.num_discussion_turn {
                yield DebateEvent::TurnAnnouncement {
                    turn,
                    text: lang.turn_announcement(turn),
                };

                for position in 0..self.context.panelists.len() {
                    let template = self.prompt_template(is_continuation, turn, position).clone();
                    let panelist_id = self.context.panelists[position].id().to_string();
                    let prompt = self.substitute_placeholders(&template, &panelist_id)?;

                    let response = if use_strategy && position >= 1 {
                        let strategist = self
                            .strategist
                            .clone()
                            .ok_or(DebateError::StrategistUnavailable)?;
                        tracing::info!(panelist = %panelist_id, position, "Response via strategist");
                        yield DebateEvent::InterventionNotice {
                            text: lang.intervention_notice().to_string(),
                        };
                        let previous = self.context.discussion_log.comments();
                        let panelist = &mut self.context.panelists[position];
                        strategist.best_response(&previous, &prompt, panelist).await?
                    } else {
                        tracing::info!(panelist = %panelist_id, position, "Response via panelist");
                        self.context.panelists[position]
                            .generate(&prompt)
                            .await
                            .map_err(DebateError::from)?
                    };

                    let panelist = &self.context.panelists[position];
                    let entry = LogEntry {
                        agenda: agenda.clone(),
                        panelist_id: panelist.id().to_string(),
                        panelist_name: panelist.name().to_string(),
                        panelist_persona: panelist.persona().to_string(),
                        comment: response.clone(),
                    };
                    tracing::debug!(
                        entry = %serde_json::to_string_pretty(&entry).unwrap_or_default(),
                        "Discussion response"
                    );
                    let speaker = entry.panelist_name.clone();
                    self.context.discussion_log.push(entry);

                    yield DebateEvent::Comment { speaker, text: response };
                }
            }

            tracing::debug!(
                history = %serde_json::to_string_pretty(&self.context.discussion_log).unwrap_or_default(),
                "Discussion history"
            );
            yield DebateEvent::RoundComplete;
        }
    }
}

/// Wrap a comment in 「」, collapsing a doubled mark at either end.
fn quote_comment(comment: &str) -> String {
    let quoted = format!("{}{}{}", OPEN_QUOTE, comment, CLOSE_QUOTE);
    let doubled_open = format!("{0}{0}", OPEN_QUOTE);
    let doubled_close = format!("{0}{0}", CLOSE_QUOTE);

    let quoted = match quoted.strip_prefix(&doubled_open) {
        Some(rest) => format!("{}{}", OPEN_QUOTE, rest),
        None => quoted,
    };
    match quoted.strip_suffix(&doubled_close) {
        Some(rest) => format!("{}{}", rest, CLOSE_QUOTE),
        None => quoted,
    }
}
