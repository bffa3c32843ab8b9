use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use shared::{
    domain::{EnvironmentId, ScriptIdeaId, SessionId, VoteKind},
    protocol::{Environment, ScriptIdea, VoteRecord},
};

use crate::{carousel::Carousel, error::ValidationError};

pub const MAX_SELECTED_ENVIRONMENTS: usize = 2;
pub const MAX_SCRIPT_IDEA_CHARS: usize = 500;

/// Vote counts keyed by target id; absent targets count 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VoteTally {
    counts: HashMap<String, u64>,
}

impl VoteTally {
    pub fn from_targets<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut counts = HashMap::new();
        for target in targets {
            *counts.entry(target.into()).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn count(&self, target_id: &str) -> u64 {
        self.counts.get(target_id).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Targets the current session has voted for, per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnVotes {
    pub environments: BTreeSet<EnvironmentId>,
    pub scripts: BTreeSet<ScriptIdeaId>,
}

impl OwnVotes {
    pub fn record(&mut self, kind: VoteKind, target_id: &str) {
        match kind {
            VoteKind::Environment => {
                self.environments.insert(EnvironmentId::new(target_id));
            }
            VoteKind::Script => {
                self.scripts.insert(ScriptIdeaId::new(target_id));
            }
        }
    }

    pub fn contains(&self, kind: VoteKind, target_id: &str) -> bool {
        match kind {
            VoteKind::Environment => self.environments.iter().any(|id| id.as_str() == target_id),
            VoteKind::Script => self.scripts.iter().any(|id| id.as_str() == target_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentVotePhase {
    NoneSelected,
    OneSelected,
    TwoSelected,
    Committed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    Added,
    AlreadySelected,
}

/// Everything the widget knows locally. Performs no I/O; callers sequence access.
#[derive(Debug, Clone)]
pub struct ClientState {
    session_id: SessionId,
    environments: Vec<Environment>,
    script_ideas: Vec<ScriptIdea>,
    selected_environments: Vec<EnvironmentId>,
    own_votes: OwnVotes,
    environment_tally: VoteTally,
    script_tally: VoteTally,
    carousel: Carousel,
    idea_draft: String,
}

impl ClientState {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            environments: Vec::new(),
            script_ideas: Vec::new(),
            selected_environments: Vec::new(),
            own_votes: OwnVotes::default(),
            environment_tally: VoteTally::default(),
            script_tally: VoteTally::default(),
            carousel: Carousel::default(),
            idea_draft: String::new(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn environments(&self) -> &[Environment] {
        &self.environments
    }

    pub fn set_environments(&mut self, environments: Vec<Environment>) {
        self.environments = environments;
    }

    pub fn environment(&self, id: &EnvironmentId) -> Option<&Environment> {
        self.environments.iter().find(|env| &env.id == id)
    }

    pub fn script_ideas(&self) -> &[ScriptIdea] {
        &self.script_ideas
    }

    pub fn set_script_ideas(&mut self, ideas: Vec<ScriptIdea>) {
        self.script_ideas = ideas;
    }

    pub fn selected_environments(&self) -> &[EnvironmentId] {
        &self.selected_environments
    }

    pub fn is_environment_selected(&self, id: &EnvironmentId) -> bool {
        self.selected_environments.contains(id)
    }

    pub fn can_select_more(&self) -> bool {
        self.selected_environments.len() < MAX_SELECTED_ENVIRONMENTS
    }

    pub fn is_valid_selection(&self) -> bool {
        self.selected_environments.len() == MAX_SELECTED_ENVIRONMENTS
    }

    pub fn has_voted(&self, kind: VoteKind, target_id: &str) -> bool {
        self.own_votes.contains(kind, target_id)
    }

    pub fn has_voted_for_environments(&self) -> bool {
        !self.own_votes.environments.is_empty()
    }

    pub fn environment_phase(&self) -> EnvironmentVotePhase {
        if self.has_voted_for_environments() {
            return EnvironmentVotePhase::Committed;
        }
        match self.selected_environments.len() {
            0 => EnvironmentVotePhase::NoneSelected,
            1 => EnvironmentVotePhase::OneSelected,
            _ => EnvironmentVotePhase::TwoSelected,
        }
    }

    /// Adds `id` to the selection; a third distinct id is rejected and leaves
    /// the selection untouched.
    pub fn select_environment(
        &mut self,
        id: &EnvironmentId,
    ) -> Result<SelectOutcome, ValidationError> {
        if self.has_voted_for_environments() {
            return Err(ValidationError::AlreadyVotedEnvironments);
        }
        if self.is_environment_selected(id) {
            return Ok(SelectOutcome::AlreadySelected);
        }
        if self.environment(id).is_none() {
            return Err(ValidationError::UnknownEnvironment(id.0.clone()));
        }
        if !self.can_select_more() {
            return Err(ValidationError::EnvironmentLimit);
        }
        self.selected_environments.push(id.clone());
        Ok(SelectOutcome::Added)
    }

    pub fn deselect_environment(&mut self, id: &EnvironmentId) -> bool {
        let before = self.selected_environments.len();
        self.selected_environments.retain(|selected| selected != id);
        before != self.selected_environments.len()
    }

    pub fn clear_selection(&mut self) {
        self.selected_environments.clear();
    }

    pub fn own_votes(&self) -> &OwnVotes {
        &self.own_votes
    }

    pub fn record_vote(&mut self, kind: VoteKind, target_id: &str) {
        self.own_votes.record(kind, target_id);
    }

    pub fn record_votes(&mut self, records: &[VoteRecord]) {
        for record in records {
            self.own_votes.record(record.vote_type, &record.target_id);
        }
    }

    pub fn tally(&self, kind: VoteKind) -> &VoteTally {
        match kind {
            VoteKind::Environment => &self.environment_tally,
            VoteKind::Script => &self.script_tally,
        }
    }

    pub fn set_tally(&mut self, kind: VoteKind, tally: VoteTally) {
        match kind {
            VoteKind::Environment => self.environment_tally = tally,
            VoteKind::Script => self.script_tally = tally,
        }
    }

    pub fn carousel(&self) -> &Carousel {
        &self.carousel
    }

    pub fn carousel_mut(&mut self) -> &mut Carousel {
        &mut self.carousel
    }

    pub fn idea_draft(&self) -> &str {
        &self.idea_draft
    }

    pub fn set_idea_draft(&mut self, text: impl Into<String>) {
        self.idea_draft = text.into();
    }

    pub fn clear_idea_draft(&mut self) {
        self.idea_draft.clear();
    }
}

/// Trims and checks an idea against the client-side length rule.
pub fn validate_script_idea(raw: &str) -> Result<&str, ValidationError> {
    let idea = raw.trim();
    if idea.is_empty() {
        return Err(ValidationError::EmptyScriptIdea);
    }
    if idea.chars().count() > MAX_SCRIPT_IDEA_CHARS {
        return Err(ValidationError::ScriptIdeaTooLong);
    }
    Ok(idea)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DraftStatus {
    pub count: usize,
    pub max: usize,
    pub within_limit: bool,
    pub can_submit: bool,
}

impl DraftStatus {
    pub fn for_text(text: &str) -> Self {
        let count = text.chars().count();
        let within_limit = count <= MAX_SCRIPT_IDEA_CHARS;
        Self {
            count,
            max: MAX_SCRIPT_IDEA_CHARS,
            within_limit,
            can_submit: within_limit && !text.trim().is_empty(),
        }
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
