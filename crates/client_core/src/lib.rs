use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use shared::{
    domain::{EnvironmentId, NotificationLevel, ScriptIdeaId, SessionId, VoteKind},
    protocol::{
        ChangeNotification, ChangeTable, Environment, ListObjectsRequest, NewScriptIdea, NewVote,
        ScriptIdea,
    },
};
use storage::LocalStore;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{error, info, warn};

pub mod carousel;
pub mod config;
pub mod debounce;
pub mod error;
pub mod gateway;
pub mod media;
pub mod realtime;
pub mod session;
pub mod state;

use crate::{
    carousel::{is_supported_image, Carousel, CarouselSnapshot},
    config::{Settings, DEFAULT_IMAGE_LIST_LIMIT},
    debounce::Debouncer,
    error::{ValidationError, WorkshopError},
    gateway::{RemoteGateway, RestGateway},
    realtime::ChangeSource,
    state::{
        validate_script_idea, ClientState, DraftStatus, EnvironmentVotePhase, SelectOutcome,
        VoteTally,
    },
};

pub const VOTE_SUCCESS_MESSAGE: &str = "Vote submitted successfully!";
pub const SCRIPT_VOTE_SUCCESS_MESSAGE: &str = "Vote submitted!";
pub const SCRIPT_SUCCESS_MESSAGE: &str = "Script idea submitted successfully!";
pub const VOTE_ERROR_MESSAGE: &str = "Error submitting vote";
pub const SCRIPT_ERROR_MESSAGE: &str = "Error submitting script idea";
pub const LOADING_ERROR_MESSAGE: &str = "Error loading application. Please refresh the page.";
pub const ENVIRONMENTS_ERROR_MESSAGE: &str = "Error loading environments";
pub const SCRIPT_IDEAS_ERROR_MESSAGE: &str = "Error loading script ideas";
pub const NO_IMAGES_MESSAGE: &str = "No images available for this environment";
pub const IMAGES_ERROR_MESSAGE: &str = "Error loading images";
pub const DEFAULT_DRAFT_DEBOUNCE: Duration = Duration::from_millis(100);
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    Notification(Notification),
    EnvironmentsUpdated(Vec<Environment>),
    ScriptIdeasUpdated(Vec<ScriptIdea>),
    EnvironmentVoteCounts(VoteTally),
    ScriptVoteCounts(VoteTally),
    SelectionChanged {
        selected: Vec<EnvironmentId>,
        can_submit: bool,
        has_voted: bool,
    },
    CarouselUpdated(CarouselSnapshot),
    CarouselUnavailable {
        environment_id: EnvironmentId,
        reason: String,
    },
    DraftStatus(DraftStatus),
    DraftCleared,
}

/// Input the presentation layer forwards without interpreting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyIntent {
    Escape,
    ArrowLeft,
    ArrowRight,
    Enter { modifier: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub image_list_limit: usize,
    pub draft_debounce: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            image_list_limit: DEFAULT_IMAGE_LIST_LIMIT,
            draft_debounce: DEFAULT_DRAFT_DEBOUNCE,
        }
    }
}

impl From<&Settings> for ClientOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            image_list_limit: settings.image_list_limit,
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait WorkshopHandle: Send + Sync {
    async fn initialize(&self) -> Result<(), WorkshopError>;
    async fn select_environment(&self, id: &EnvironmentId)
        -> Result<SelectOutcome, WorkshopError>;
    async fn deselect_environment(&self, id: &EnvironmentId) -> bool;
    async fn submit_environment_votes(&self) -> Result<(), WorkshopError>;
    async fn submit_script_idea(&self, text: &str) -> Result<(), WorkshopError>;
    async fn vote_for_idea(&self, id: &ScriptIdeaId) -> Result<(), WorkshopError>;
    async fn open_carousel(&self, id: &EnvironmentId)
        -> Result<CarouselSnapshot, WorkshopError>;
    async fn close_carousel(&self);
    async fn handle_key(&self, intent: KeyIntent) -> Result<bool, WorkshopError>;
    async fn update_draft(&self, text: &str);
    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent>;
}

pub struct WorkshopClient {
    session_id: SessionId,
    gateway: Arc<dyn RemoteGateway>,
    options: ClientOptions,
    inner: Mutex<ClientState>,
    submitting_environments: AtomicBool,
    submitting_idea: AtomicBool,
    pending_script_votes: StdMutex<HashSet<ScriptIdeaId>>,
    draft_debouncer: Debouncer,
    events: broadcast::Sender<ClientEvent>,
}

/// Clears an in-flight flag when the submission finishes, whatever the outcome.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct PendingScriptVote<'a> {
    pending: &'a StdMutex<HashSet<ScriptIdeaId>>,
    id: ScriptIdeaId,
}

impl<'a> PendingScriptVote<'a> {
    fn acquire(pending: &'a StdMutex<HashSet<ScriptIdeaId>>, id: &ScriptIdeaId) -> Option<Self> {
        let mut guard = pending.lock().unwrap_or_else(|p| p.into_inner());
        guard.insert(id.clone()).then(|| Self {
            pending,
            id: id.clone(),
        })
    }
}

impl Drop for PendingScriptVote<'_> {
    fn drop(&mut self) {
        let mut guard = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        guard.remove(&self.id);
    }
}

impl WorkshopClient {
    pub fn new(session_id: SessionId, gateway: Arc<dyn RemoteGateway>) -> Arc<Self> {
        Self::with_options(session_id, gateway, ClientOptions::default())
    }

    pub fn with_options(
        session_id: SessionId,
        gateway: Arc<dyn RemoteGateway>,
        options: ClientOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            inner: Mutex::new(ClientState::new(session_id.clone())),
            session_id,
            gateway,
            options,
            submitting_environments: AtomicBool::new(false),
            submitting_idea: AtomicBool::new(false),
            pending_script_votes: StdMutex::new(HashSet::new()),
            draft_debouncer: Debouncer::new(options.draft_debounce),
            events,
        })
    }

    /// Validates settings, opens the local store, resolves the session
    /// identity and wires the REST gateway.
    pub async fn bootstrap(settings: &Settings) -> Result<Arc<Self>, WorkshopError> {
        let credentials = settings.backend()?;
        let store = LocalStore::new(&settings.local_store_url)
            .await
            .map_err(|err| WorkshopError::storage("failed to open local store", err))?;
        let session_id = session::get_or_create_session_id(&store)
            .await
            .map_err(|err| WorkshopError::storage("failed to resolve session id", err))?;
        info!(
            "client: bootstrapped session={session_id} backend={}",
            credentials.url
        );
        Ok(Self::with_options(
            session_id,
            Arc::new(RestGateway::new(&credentials)),
            ClientOptions::from(settings),
        ))
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn options(&self) -> ClientOptions {
        self.options
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Copy of the current local state.
    pub async fn snapshot(&self) -> ClientState {
        self.inner.lock().await.clone()
    }

    pub async fn environments(&self) -> Vec<Environment> {
        self.inner.lock().await.environments().to_vec()
    }

    pub async fn script_ideas(&self) -> Vec<ScriptIdea> {
        self.inner.lock().await.script_ideas().to_vec()
    }

    pub async fn selected_environments(&self) -> Vec<EnvironmentId> {
        self.inner.lock().await.selected_environments().to_vec()
    }

    pub async fn environment_phase(&self) -> EnvironmentVotePhase {
        self.inner.lock().await.environment_phase()
    }

    pub async fn has_voted(&self, kind: VoteKind, target_id: &str) -> bool {
        self.inner.lock().await.has_voted(kind, target_id)
    }

    pub async fn vote_count(&self, kind: VoteKind, target_id: &str) -> u64 {
        self.inner.lock().await.tally(kind).count(target_id)
    }

    pub async fn carousel(&self) -> CarouselSnapshot {
        self.inner.lock().await.carousel().snapshot()
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        self.emit(ClientEvent::Notification(Notification {
            level,
            message: message.into(),
        }));
    }

    fn reject(&self, err: ValidationError) -> WorkshopError {
        info!("client: rejected intent: {err}");
        self.notify(NotificationLevel::Warning, err.to_string());
        err.into()
    }

    fn emit_selection(&self, state: &ClientState) {
        self.emit(ClientEvent::SelectionChanged {
            selected: state.selected_environments().to_vec(),
            can_submit: state.is_valid_selection() && !state.has_voted_for_environments(),
            has_voted: state.has_voted_for_environments(),
        });
    }

    /// Startup sequence: the three independent loads run concurrently, then
    /// both tallies are computed. Interaction wiring and the change feed
    /// belong after this returns.
    pub async fn initialize(&self) -> Result<(), WorkshopError> {
        let (environments, ideas, own_votes) = tokio::join!(
            self.load_environments(),
            self.load_script_ideas(),
            self.load_own_votes()
        );
        let _ = tokio::join!(
            self.load_vote_counts(VoteKind::Environment),
            self.load_vote_counts(VoteKind::Script)
        );
        {
            let state = self.inner.lock().await;
            self.emit_selection(&state);
        }
        environments?;
        ideas?;
        own_votes?;
        info!("client: initialized session={}", self.session_id);
        Ok(())
    }

    pub async fn load_environments(&self) -> Result<(), WorkshopError> {
        self.refresh_environments().await.inspect_err(|err| {
            error!("client: {err}");
            self.notify(NotificationLevel::Error, ENVIRONMENTS_ERROR_MESSAGE);
        })
    }

    pub async fn load_script_ideas(&self) -> Result<(), WorkshopError> {
        self.refresh_script_ideas().await.inspect_err(|err| {
            error!("client: {err}");
            self.notify(NotificationLevel::Error, SCRIPT_IDEAS_ERROR_MESSAGE);
        })
    }

    /// Fetches the votes this session already cast so re-votes are gated
    /// across restarts.
    pub async fn load_own_votes(&self) -> Result<(), WorkshopError> {
        let records = match self.gateway.fetch_votes_by_voter(&self.session_id).await {
            Ok(records) => records,
            Err(err) => {
                let err = WorkshopError::gateway("failed to load own votes", err);
                error!("client: {err}");
                self.notify(NotificationLevel::Error, LOADING_ERROR_MESSAGE);
                return Err(err);
            }
        };
        let mut state = self.inner.lock().await;
        state.record_votes(&records);
        info!(
            "client: session has {} environment and {} script votes",
            state.own_votes().environments.len(),
            state.own_votes().scripts.len()
        );
        Ok(())
    }

    /// Full recount of one vote kind. Failures only leave the previous
    /// counts in place.
    pub async fn load_vote_counts(&self, kind: VoteKind) -> Result<(), WorkshopError> {
        self.refresh_vote_counts(kind)
            .await
            .inspect_err(|err| warn!("client: {err}"))
    }

    async fn refresh_environments(&self) -> Result<(), WorkshopError> {
        let environments = self
            .gateway
            .fetch_environments()
            .await
            .map_err(|err| WorkshopError::gateway("failed to load environments", err))?;
        self.inner
            .lock()
            .await
            .set_environments(environments.clone());
        self.emit(ClientEvent::EnvironmentsUpdated(environments));
        Ok(())
    }

    async fn refresh_script_ideas(&self) -> Result<(), WorkshopError> {
        let ideas = self
            .gateway
            .fetch_script_ideas()
            .await
            .map_err(|err| WorkshopError::gateway("failed to load script ideas", err))?;
        self.inner.lock().await.set_script_ideas(ideas.clone());
        self.emit(ClientEvent::ScriptIdeasUpdated(ideas));
        Ok(())
    }

    async fn refresh_vote_counts(&self, kind: VoteKind) -> Result<(), WorkshopError> {
        let targets = self
            .gateway
            .fetch_vote_targets(kind)
            .await
            .map_err(|err| WorkshopError::gateway("failed to load vote counts", err))?;
        let tally = VoteTally::from_targets(targets);
        self.inner.lock().await.set_tally(kind, tally.clone());
        self.emit(match kind {
            VoteKind::Environment => ClientEvent::EnvironmentVoteCounts(tally),
            VoteKind::Script => ClientEvent::ScriptVoteCounts(tally),
        });
        Ok(())
    }

    pub async fn select_environment(
        &self,
        id: &EnvironmentId,
    ) -> Result<SelectOutcome, WorkshopError> {
        let mut state = self.inner.lock().await;
        let outcome = state
            .select_environment(id)
            .map_err(|err| self.reject(err))?;
        if outcome == SelectOutcome::Added {
            self.emit_selection(&state);
        }
        Ok(outcome)
    }

    pub async fn deselect_environment(&self, id: &EnvironmentId) -> bool {
        let mut state = self.inner.lock().await;
        let removed = state.deselect_environment(id);
        if removed {
            self.emit_selection(&state);
        }
        removed
    }

    /// Card click: deselects a selected environment, selects otherwise.
    /// Returns whether the environment ends up selected.
    pub async fn toggle_environment(&self, id: &EnvironmentId) -> Result<bool, WorkshopError> {
        if self.deselect_environment(id).await {
            return Ok(false);
        }
        self.select_environment(id).await.map(|_| true)
    }

    /// Casts the session's single environment vote event: one batch insert
    /// covering exactly the two selected environments.
    pub async fn submit_environment_votes(&self) -> Result<(), WorkshopError> {
        let Some(_in_flight) = InFlight::acquire(&self.submitting_environments) else {
            return Err(self.reject(ValidationError::SubmissionInFlight));
        };

        let selection = {
            let state = self.inner.lock().await;
            if state.has_voted_for_environments() {
                return Err(self.reject(ValidationError::AlreadyVotedEnvironments));
            }
            if !state.is_valid_selection() {
                return Err(self.reject(ValidationError::IncompleteSelection));
            }
            state.selected_environments().to_vec()
        };

        let votes: Vec<NewVote> = selection
            .iter()
            .map(|id| NewVote::environment(&self.session_id, id))
            .collect();
        if let Err(err) = self.gateway.insert_votes(&votes).await {
            let err = WorkshopError::gateway("failed to submit environment votes", err);
            error!("client: {err}");
            self.notify(NotificationLevel::Error, VOTE_ERROR_MESSAGE);
            return Err(err);
        }

        {
            let mut state = self.inner.lock().await;
            for id in &selection {
                state.record_vote(VoteKind::Environment, id.as_str());
            }
            state.clear_selection();
            self.emit_selection(&state);
        }
        info!(
            "client: session={} voted for environments {:?}",
            self.session_id, selection
        );
        self.notify(NotificationLevel::Success, VOTE_SUCCESS_MESSAGE);
        let _ = self.load_vote_counts(VoteKind::Environment).await;
        Ok(())
    }

    /// Validates and inserts one idea, then re-fetches the idea list once.
    /// The list is never patched locally.
    pub async fn submit_script_idea(&self, text: &str) -> Result<(), WorkshopError> {
        let idea = validate_script_idea(text).map_err(|err| self.reject(err))?;
        let Some(_in_flight) = InFlight::acquire(&self.submitting_idea) else {
            return Err(self.reject(ValidationError::SubmissionInFlight));
        };

        let row = NewScriptIdea {
            idea: idea.to_string(),
            author_session: self.session_id.clone(),
        };
        if let Err(err) = self.gateway.insert_script_idea(&row).await {
            let err = WorkshopError::gateway("failed to submit script idea", err);
            error!("client: {err}");
            self.notify(NotificationLevel::Error, SCRIPT_ERROR_MESSAGE);
            return Err(err);
        }

        self.draft_debouncer.cancel();
        self.inner.lock().await.clear_idea_draft();
        self.emit(ClientEvent::DraftCleared);
        self.emit(ClientEvent::DraftStatus(DraftStatus::for_text("")));
        self.notify(NotificationLevel::Success, SCRIPT_SUCCESS_MESSAGE);
        if let Err(err) = self.refresh_script_ideas().await {
            warn!("client: idea stored but list refresh failed: {err}");
        }
        Ok(())
    }

    /// Submits whatever the draft currently holds.
    pub async fn submit_draft(&self) -> Result<(), WorkshopError> {
        let draft = self.inner.lock().await.idea_draft().to_string();
        self.submit_script_idea(&draft).await
    }

    pub async fn vote_for_idea(&self, id: &ScriptIdeaId) -> Result<(), WorkshopError> {
        if self.inner.lock().await.has_voted(VoteKind::Script, id.as_str()) {
            return Err(self.reject(ValidationError::AlreadyVotedScript));
        }
        let Some(_pending) = PendingScriptVote::acquire(&self.pending_script_votes, id) else {
            return Err(self.reject(ValidationError::SubmissionInFlight));
        };

        let vote = NewVote::script(&self.session_id, id);
        if let Err(err) = self.gateway.insert_votes(std::slice::from_ref(&vote)).await {
            let err = WorkshopError::gateway("failed to submit script vote", err);
            error!("client: {err}");
            self.notify(NotificationLevel::Error, VOTE_ERROR_MESSAGE);
            return Err(err);
        }

        self.inner
            .lock()
            .await
            .record_vote(VoteKind::Script, id.as_str());
        self.notify(NotificationLevel::Success, SCRIPT_VOTE_SUCCESS_MESSAGE);
        let _ = self.load_vote_counts(VoteKind::Script).await;
        Ok(())
    }

    /// Lists the environment's bucket, keeps supported images and resets the
    /// position to the first one. A bucket with no usable images leaves the
    /// view open in its unavailable state.
    pub async fn open_carousel(
        &self,
        id: &EnvironmentId,
    ) -> Result<CarouselSnapshot, WorkshopError> {
        {
            let mut state = self.inner.lock().await;
            state.carousel_mut().load(id.clone(), Vec::new());
            self.emit(ClientEvent::CarouselUpdated(state.carousel().snapshot()));
        }

        let request = ListObjectsRequest::by_name(self.options.image_list_limit);
        let objects = match self.gateway.list_objects(id.as_str(), &request).await {
            Ok(objects) => objects,
            Err(err) => {
                let err = WorkshopError::gateway("failed to list environment images", err);
                error!("client: {err}");
                self.emit(ClientEvent::CarouselUnavailable {
                    environment_id: id.clone(),
                    reason: IMAGES_ERROR_MESSAGE.to_string(),
                });
                return Err(err);
            }
        };
        let images: Vec<String> = objects
            .iter()
            .filter(|object| is_supported_image(&object.name))
            .map(|object| self.gateway.public_url(id.as_str(), &object.name))
            .collect();

        let mut state = self.inner.lock().await;
        if state.carousel().environment_id() != Some(id) {
            // Closed or reopened elsewhere while the listing was in flight.
            return Ok(state.carousel().snapshot());
        }
        if images.is_empty() {
            self.emit(ClientEvent::CarouselUnavailable {
                environment_id: id.clone(),
                reason: NO_IMAGES_MESSAGE.to_string(),
            });
        }
        state.carousel_mut().load(id.clone(), images);
        let snapshot = state.carousel().snapshot();
        self.emit(ClientEvent::CarouselUpdated(snapshot.clone()));
        Ok(snapshot)
    }

    pub async fn next_image(&self) -> bool {
        self.navigate_carousel(|carousel| carousel.next()).await
    }

    pub async fn prev_image(&self) -> bool {
        self.navigate_carousel(|carousel| carousel.prev()).await
    }

    pub async fn jump_to_image(&self, index: usize) -> bool {
        self.navigate_carousel(|carousel| carousel.jump_to(index)).await
    }

    async fn navigate_carousel(&self, step: impl FnOnce(&mut Carousel) -> bool) -> bool {
        let mut state = self.inner.lock().await;
        let moved = step(state.carousel_mut());
        if moved {
            self.emit(ClientEvent::CarouselUpdated(state.carousel().snapshot()));
        }
        moved
    }

    pub async fn close_carousel(&self) {
        let mut state = self.inner.lock().await;
        if !state.carousel().is_open() {
            return;
        }
        state.carousel_mut().clear();
        self.emit(ClientEvent::CarouselUpdated(state.carousel().snapshot()));
    }

    /// First supported image of the environment's bucket, if any. Failures
    /// only mean "no cover".
    pub async fn cover_image_url(&self, id: &EnvironmentId) -> Option<String> {
        let objects = match self
            .gateway
            .list_objects(id.as_str(), &ListObjectsRequest::by_name(1))
            .await
        {
            Ok(objects) => objects,
            Err(err) => {
                warn!("client: cover image for {id} unavailable: {err:#}");
                return None;
            }
        };
        objects
            .iter()
            .find(|object| is_supported_image(&object.name))
            .map(|object| self.gateway.public_url(id.as_str(), &object.name))
    }

    /// Returns whether the key did anything.
    pub async fn handle_key(&self, intent: KeyIntent) -> Result<bool, WorkshopError> {
        match intent {
            KeyIntent::Escape => {
                let open = self.inner.lock().await.carousel().is_open();
                if open {
                    self.close_carousel().await;
                }
                Ok(open)
            }
            KeyIntent::ArrowLeft => Ok(self.carousel_is_open().await && self.prev_image().await),
            KeyIntent::ArrowRight => Ok(self.carousel_is_open().await && self.next_image().await),
            KeyIntent::Enter { modifier: true } => self.submit_draft().await.map(|_| true),
            KeyIntent::Enter { modifier: false } => Ok(false),
        }
    }

    async fn carousel_is_open(&self) -> bool {
        self.inner.lock().await.carousel().is_open()
    }

    /// Stores the draft right away and reports its status once edits settle.
    pub async fn update_draft(self: &Arc<Self>, text: &str) {
        self.inner.lock().await.set_idea_draft(text);
        let client = Arc::clone(self);
        self.draft_debouncer.call(async move {
            let status = DraftStatus::for_text(client.inner.lock().await.idea_draft());
            client.emit(ClientEvent::DraftStatus(status));
        });
    }

    /// Re-fetches whatever a change notification invalidates. Errors are
    /// logged only; stale data stays until the next successful refresh.
    pub async fn handle_change(&self, table: ChangeTable) {
        match table {
            ChangeTable::Votes => {
                let _ = tokio::join!(
                    self.load_vote_counts(VoteKind::Environment),
                    self.load_vote_counts(VoteKind::Script)
                );
            }
            ChangeTable::ScriptIdeas => {
                if let Err(err) = self.refresh_script_ideas().await {
                    warn!("client: reconciliation failed: {err}");
                }
            }
        }
    }

    pub fn spawn_reconciliation(
        self: &Arc<Self>,
        mut changes: broadcast::Receiver<ChangeNotification>,
    ) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(notification) => client.handle_change(notification.table).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("client: change feed lagged by {skipped}; refreshing everything");
                        for table in ChangeTable::ALL {
                            client.handle_change(table).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("client: change feed closed");
                        break;
                    }
                }
            }
        })
    }

    pub fn attach_change_source(self: &Arc<Self>, source: &dyn ChangeSource) -> JoinHandle<()> {
        self.spawn_reconciliation(source.subscribe())
    }
}

#[async_trait]
impl WorkshopHandle for Arc<WorkshopClient> {
    async fn initialize(&self) -> Result<(), WorkshopError> {
        WorkshopClient::initialize(self).await
    }

    async fn select_environment(
        &self,
        id: &EnvironmentId,
    ) -> Result<SelectOutcome, WorkshopError> {
        WorkshopClient::select_environment(self, id).await
    }

    async fn deselect_environment(&self, id: &EnvironmentId) -> bool {
        WorkshopClient::deselect_environment(self, id).await
    }

    async fn submit_environment_votes(&self) -> Result<(), WorkshopError> {
        WorkshopClient::submit_environment_votes(self).await
    }

    async fn submit_script_idea(&self, text: &str) -> Result<(), WorkshopError> {
        WorkshopClient::submit_script_idea(self, text).await
    }

    async fn vote_for_idea(&self, id: &ScriptIdeaId) -> Result<(), WorkshopError> {
        WorkshopClient::vote_for_idea(self, id).await
    }

    async fn open_carousel(
        &self,
        id: &EnvironmentId,
    ) -> Result<CarouselSnapshot, WorkshopError> {
        WorkshopClient::open_carousel(self, id).await
    }

    async fn close_carousel(&self) {
        WorkshopClient::close_carousel(self).await
    }

    async fn handle_key(&self, intent: KeyIntent) -> Result<bool, WorkshopError> {
        WorkshopClient::handle_key(self, intent).await
    }

    async fn update_draft(&self, text: &str) {
        WorkshopClient::update_draft(self, text).await
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        WorkshopClient::subscribe_events(self)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
