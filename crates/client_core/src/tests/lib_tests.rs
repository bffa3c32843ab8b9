use std::{collections::HashMap, sync::atomic::AtomicUsize};

use anyhow::{anyhow, Result};
use chrono::Utc;
use shared::protocol::{StorageObject, VoteRecord};
use tokio::time::timeout;

use super::*;
use crate::{config::ConfigError, gateway::public_object_url, realtime::LocalChangeSource};

const BASE_URL: &str = "https://workshop.example.co";
const SESSION: &str = "user-1700000000000-abcdefghi";

#[derive(Default)]
struct TestGateway {
    environments: Vec<Environment>,
    ideas: Mutex<Vec<ScriptIdea>>,
    votes: Mutex<Vec<NewVote>>,
    vote_batches: Mutex<Vec<Vec<NewVote>>>,
    idea_inserts: Mutex<Vec<NewScriptIdea>>,
    objects: HashMap<String, Vec<StorageObject>>,
    list_limits: Mutex<Vec<usize>>,
    fail_reads: AtomicBool,
    fail_inserts: AtomicBool,
    fail_listing: AtomicBool,
    insert_delay: Option<Duration>,
    idea_fetches: AtomicUsize,
    vote_target_fetches: AtomicUsize,
}

impl TestGateway {
    fn seeded() -> Self {
        Self {
            environments: vec![environment("a"), environment("b"), environment("c")],
            ideas: Mutex::new(vec![idea("2", "a lighthouse keeper"), idea("1", "a heist")]),
            objects: HashMap::from([
                (
                    "a".to_string(),
                    vec![
                        object("01.jpg"),
                        object("notes.txt"),
                        object("02.PNG"),
                        object("03.webp"),
                    ],
                ),
                (
                    "c".to_string(),
                    vec![object("README.md"), object("cover.png")],
                ),
            ]),
            ..Self::default()
        }
    }

    fn with_insert_delay(mut self, delay: Duration) -> Self {
        self.insert_delay = Some(delay);
        self
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("backend returned 503: unavailable"));
        }
        Ok(())
    }

    async fn before_insert(&self) -> Result<()> {
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(anyhow!("backend returned 500: insert failed"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteGateway for TestGateway {
    async fn fetch_environments(&self) -> Result<Vec<Environment>> {
        self.check_reads()?;
        Ok(self.environments.clone())
    }

    async fn fetch_script_ideas(&self) -> Result<Vec<ScriptIdea>> {
        self.idea_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;
        Ok(self.ideas.lock().await.clone())
    }

    async fn fetch_vote_targets(&self, kind: VoteKind) -> Result<Vec<String>> {
        self.vote_target_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;
        Ok(self
            .votes
            .lock()
            .await
            .iter()
            .filter(|vote| vote.vote_type == kind)
            .map(|vote| vote.target_id.clone())
            .collect())
    }

    async fn fetch_votes_by_voter(&self, voter: &SessionId) -> Result<Vec<VoteRecord>> {
        self.check_reads()?;
        Ok(self
            .votes
            .lock()
            .await
            .iter()
            .filter(|vote| &vote.voter_session == voter)
            .map(|vote| VoteRecord {
                vote_type: vote.vote_type,
                target_id: vote.target_id.clone(),
            })
            .collect())
    }

    async fn insert_votes(&self, votes: &[NewVote]) -> Result<()> {
        self.before_insert().await?;
        self.vote_batches.lock().await.push(votes.to_vec());
        self.votes.lock().await.extend_from_slice(votes);
        Ok(())
    }

    async fn insert_script_idea(&self, row: &NewScriptIdea) -> Result<()> {
        self.before_insert().await?;
        self.idea_inserts.lock().await.push(row.clone());
        let mut ideas = self.ideas.lock().await;
        let id = (ideas.len() + 1).to_string();
        ideas.insert(
            0,
            ScriptIdea {
                id: ScriptIdeaId::new(id),
                idea: row.idea.clone(),
                author_session: Some(row.author_session.clone()),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        request: &ListObjectsRequest,
    ) -> Result<Vec<StorageObject>> {
        self.list_limits.lock().await.push(request.limit);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(anyhow!("bucket {bucket} not found"));
        }
        Ok(self
            .objects
            .get(bucket)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(request.limit)
            .collect())
    }

    fn public_url(&self, bucket: &str, object_name: &str) -> String {
        public_object_url(BASE_URL, bucket, object_name)
    }
}

fn environment(id: &str) -> Environment {
    Environment {
        id: EnvironmentId::new(id),
        name: format!("Environment {id}"),
        emoji: "🌲".to_string(),
        description: format!("The {id} set"),
        created_at: "2025-03-01T10:00:00Z".parse().expect("timestamp"),
    }
}

fn idea(id: &str, text: &str) -> ScriptIdea {
    ScriptIdea {
        id: ScriptIdeaId::new(id),
        idea: text.to_string(),
        author_session: Some(SessionId::new("user-2-other")),
        created_at: "2025-03-01T10:00:00Z".parse().expect("timestamp"),
    }
}

fn object(name: &str) -> StorageObject {
    StorageObject {
        name: name.to_string(),
        id: None,
    }
}

fn client_with(gateway: TestGateway) -> (Arc<WorkshopClient>, Arc<TestGateway>) {
    let gateway = Arc::new(gateway);
    let client = WorkshopClient::new(SessionId::new(SESSION), gateway.clone());
    (client, gateway)
}

fn drain(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn notifications(events: &[ClientEvent]) -> Vec<Notification> {
    events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::Notification(notification) => Some(notification.clone()),
            _ => None,
        })
        .collect()
}

async fn wait_for(
    rx: &mut broadcast::Receiver<ClientEvent>,
    predicate: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => {}
                Err(err) => panic!("event stream ended: {err}"),
            }
        }
    })
    .await
    .expect("expected event in time")
}

fn id(value: &str) -> EnvironmentId {
    EnvironmentId::new(value)
}

#[tokio::test]
async fn initialize_loads_collections_counts_and_own_votes() {
    let gateway = TestGateway::seeded();
    gateway.votes.lock().await.extend([
        NewVote::environment(&SessionId::new(SESSION), &id("a")),
        NewVote::environment(&SessionId::new(SESSION), &id("b")),
        NewVote::environment(&SessionId::new("user-2-other"), &id("a")),
        NewVote::script(&SessionId::new("user-2-other"), &ScriptIdeaId::new("1")),
    ]);
    let (client, _gateway) = client_with(gateway);

    client.initialize().await.expect("initialize");

    assert_eq!(client.environments().await.len(), 3);
    assert_eq!(client.script_ideas().await[0].idea, "a lighthouse keeper");
    assert_eq!(client.environment_phase().await, EnvironmentVotePhase::Committed);
    assert!(client.has_voted(VoteKind::Environment, "a").await);
    assert!(!client.has_voted(VoteKind::Script, "1").await);
    assert_eq!(client.vote_count(VoteKind::Environment, "a").await, 2);
    assert_eq!(client.vote_count(VoteKind::Environment, "c").await, 0);
    assert_eq!(client.vote_count(VoteKind::Script, "1").await, 1);
}

#[tokio::test]
async fn selecting_three_then_submitting_inserts_one_batch_of_two() {
    let (client, gateway) = client_with(TestGateway::seeded());
    client.initialize().await.expect("initialize");
    let mut rx = client.subscribe_events();

    assert_eq!(
        client.select_environment(&id("a")).await.expect("select a"),
        SelectOutcome::Added
    );
    client.select_environment(&id("b")).await.expect("select b");
    let err = client
        .select_environment(&id("c"))
        .await
        .expect_err("third selection");
    assert_eq!(err.validation(), Some(&ValidationError::EnvironmentLimit));
    assert_eq!(client.selected_environments().await, vec![id("a"), id("b")]);

    client
        .submit_environment_votes()
        .await
        .expect("submit votes");

    let batches = gateway.vote_batches.lock().await.clone();
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0],
        vec![
            NewVote::environment(&SessionId::new(SESSION), &id("a")),
            NewVote::environment(&SessionId::new(SESSION), &id("b")),
        ]
    );
    assert_eq!(client.environment_phase().await, EnvironmentVotePhase::Committed);
    assert!(client.selected_environments().await.is_empty());
    assert_eq!(client.vote_count(VoteKind::Environment, "a").await, 1);

    let notes = notifications(&drain(&mut rx));
    assert_eq!(
        notes[0],
        Notification {
            level: NotificationLevel::Warning,
            message: "You can only select 2 environments".to_string(),
        }
    );
    assert!(notes.contains(&Notification {
        level: NotificationLevel::Success,
        message: VOTE_SUCCESS_MESSAGE.to_string(),
    }));
}

#[tokio::test]
async fn committed_session_cannot_vote_again() {
    let (client, gateway) = client_with(TestGateway::seeded());
    client.initialize().await.expect("initialize");
    client.select_environment(&id("a")).await.expect("select a");
    client.select_environment(&id("b")).await.expect("select b");
    client.submit_environment_votes().await.expect("first submit");

    let err = client
        .select_environment(&id("c"))
        .await
        .expect_err("selection after commit");
    assert_eq!(
        err.validation(),
        Some(&ValidationError::AlreadyVotedEnvironments)
    );
    let err = client
        .submit_environment_votes()
        .await
        .expect_err("second submit");
    assert_eq!(
        err.validation(),
        Some(&ValidationError::AlreadyVotedEnvironments)
    );
    assert_eq!(gateway.vote_batches.lock().await.len(), 1);
}

#[tokio::test]
async fn incomplete_selection_sends_nothing() {
    let (client, gateway) = client_with(TestGateway::seeded());
    client.initialize().await.expect("initialize");
    client.select_environment(&id("a")).await.expect("select a");

    let err = client
        .submit_environment_votes()
        .await
        .expect_err("one selection");
    assert_eq!(err.validation(), Some(&ValidationError::IncompleteSelection));
    assert!(gateway.vote_batches.lock().await.is_empty());
}

#[tokio::test]
async fn toggling_a_selected_environment_deselects_it() {
    let (client, _gateway) = client_with(TestGateway::seeded());
    client.initialize().await.expect("initialize");

    assert!(client.toggle_environment(&id("a")).await.expect("toggle on"));
    assert!(!client.toggle_environment(&id("a")).await.expect("toggle off"));
    assert_eq!(client.environment_phase().await, EnvironmentVotePhase::NoneSelected);
}

#[tokio::test]
async fn failed_vote_insert_keeps_selection_for_retry() {
    let (client, gateway) = client_with(TestGateway::seeded());
    client.initialize().await.expect("initialize");
    client.select_environment(&id("a")).await.expect("select a");
    client.select_environment(&id("b")).await.expect("select b");
    let mut rx = client.subscribe_events();

    gateway.fail_inserts.store(true, Ordering::SeqCst);
    let err = client
        .submit_environment_votes()
        .await
        .expect_err("insert fails");
    assert!(matches!(err, WorkshopError::Gateway { .. }));
    assert_eq!(client.environment_phase().await, EnvironmentVotePhase::TwoSelected);
    assert_eq!(client.selected_environments().await, vec![id("a"), id("b")]);
    assert_eq!(
        notifications(&drain(&mut rx)),
        vec![Notification {
            level: NotificationLevel::Error,
            message: VOTE_ERROR_MESSAGE.to_string(),
        }]
    );

    gateway.fail_inserts.store(false, Ordering::SeqCst);
    client.submit_environment_votes().await.expect("retry");
    assert_eq!(client.environment_phase().await, EnvironmentVotePhase::Committed);
}

#[tokio::test]
async fn double_submit_while_in_flight_sends_one_batch() {
    let (client, gateway) =
        client_with(TestGateway::seeded().with_insert_delay(Duration::from_millis(50)));
    client.initialize().await.expect("initialize");
    client.select_environment(&id("a")).await.expect("select a");
    client.select_environment(&id("b")).await.expect("select b");

    let (first, second) = tokio::join!(
        client.submit_environment_votes(),
        client.submit_environment_votes()
    );
    assert!(first.is_ok());
    assert_eq!(
        second.expect_err("second click").validation(),
        Some(&ValidationError::SubmissionInFlight)
    );
    assert_eq!(gateway.vote_batches.lock().await.len(), 1);
}

#[tokio::test]
async fn voting_for_an_idea_twice_inserts_once() {
    let (client, gateway) = client_with(TestGateway::seeded());
    client.initialize().await.expect("initialize");
    let mut rx = client.subscribe_events();
    let idea_id = ScriptIdeaId::new("1");

    client.vote_for_idea(&idea_id).await.expect("first vote");
    let err = client
        .vote_for_idea(&idea_id)
        .await
        .expect_err("second vote");
    assert_eq!(err.validation(), Some(&ValidationError::AlreadyVotedScript));

    let batches = gateway.vote_batches.lock().await.clone();
    assert_eq!(
        batches,
        vec![vec![NewVote::script(&SessionId::new(SESSION), &idea_id)]]
    );
    assert_eq!(client.vote_count(VoteKind::Script, "1").await, 1);

    // Other ideas stay open to this session.
    client
        .vote_for_idea(&ScriptIdeaId::new("2"))
        .await
        .expect("vote for another idea");

    let notes = notifications(&drain(&mut rx));
    assert_eq!(notes[0].message, SCRIPT_VOTE_SUCCESS_MESSAGE);
    assert_eq!(notes[1].message, "You have already voted for this idea");
}

#[tokio::test]
async fn concurrent_votes_for_one_idea_insert_once() {
    let (client, gateway) =
        client_with(TestGateway::seeded().with_insert_delay(Duration::from_millis(50)));
    client.initialize().await.expect("initialize");
    let idea_id = ScriptIdeaId::new("1");

    let (first, second) = tokio::join!(
        client.vote_for_idea(&idea_id),
        client.vote_for_idea(&idea_id)
    );
    assert!(first.is_ok());
    assert_eq!(
        second.expect_err("duplicate click").validation(),
        Some(&ValidationError::SubmissionInFlight)
    );
    assert_eq!(gateway.vote_batches.lock().await.len(), 1);
}

#[tokio::test]
async fn idea_length_limit_is_inclusive() {
    let (client, gateway) = client_with(TestGateway::seeded());
    client.initialize().await.expect("initialize");

    client
        .submit_script_idea(&"x".repeat(500))
        .await
        .expect("500 characters");
    let err = client
        .submit_script_idea(&"x".repeat(501))
        .await
        .expect_err("501 characters");
    assert_eq!(err.validation(), Some(&ValidationError::ScriptIdeaTooLong));
    assert_eq!(gateway.idea_inserts.lock().await.len(), 1);
}

#[tokio::test]
async fn accepted_idea_triggers_exactly_one_idea_refetch() {
    let (client, gateway) = client_with(TestGateway::seeded());
    client.initialize().await.expect("initialize");
    let mut rx = client.subscribe_events();
    let before = gateway.idea_fetches.load(Ordering::SeqCst);

    client
        .submit_script_idea("  a robot learns to paint \n")
        .await
        .expect("submit idea");

    assert_eq!(gateway.idea_fetches.load(Ordering::SeqCst), before + 1);
    let inserts = gateway.idea_inserts.lock().await.clone();
    assert_eq!(
        inserts,
        vec![NewScriptIdea {
            idea: "a robot learns to paint".to_string(),
            author_session: SessionId::new(SESSION),
        }]
    );
    assert_eq!(client.script_ideas().await[0].idea, "a robot learns to paint");

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|event| matches!(event, ClientEvent::DraftCleared)));
    assert!(notifications(&events).contains(&Notification {
        level: NotificationLevel::Success,
        message: SCRIPT_SUCCESS_MESSAGE.to_string(),
    }));
}

#[tokio::test]
async fn blank_idea_is_rejected_before_any_request() {
    let (client, gateway) = client_with(TestGateway::seeded());
    let mut rx = client.subscribe_events();

    let err = client
        .submit_script_idea("   \t")
        .await
        .expect_err("blank idea");
    assert_eq!(err.validation(), Some(&ValidationError::EmptyScriptIdea));
    assert!(gateway.idea_inserts.lock().await.is_empty());
    assert_eq!(gateway.idea_fetches.load(Ordering::SeqCst), 0);
    assert_eq!(
        notifications(&drain(&mut rx)),
        vec![Notification {
            level: NotificationLevel::Warning,
            message: "Please enter a script idea".to_string(),
        }]
    );
}

#[tokio::test]
async fn failed_idea_insert_keeps_the_draft() {
    let (client, gateway) = client_with(TestGateway::seeded());
    gateway.fail_inserts.store(true, Ordering::SeqCst);
    let mut rx = client.subscribe_events();

    client.update_draft("keep me around").await;
    client.submit_draft().await.expect_err("insert fails");

    assert_eq!(client.snapshot().await.idea_draft(), "keep me around");
    assert!(notifications(&drain(&mut rx)).contains(&Notification {
        level: NotificationLevel::Error,
        message: SCRIPT_ERROR_MESSAGE.to_string(),
    }));
}

#[tokio::test(start_paused = true)]
async fn draft_status_is_reported_once_edits_settle() {
    let (client, _gateway) = client_with(TestGateway::seeded());
    let mut rx = client.subscribe_events();

    for text in ["a", "a ro", "a robot"] {
        client.update_draft(text).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(150)).await;

    let statuses: Vec<DraftStatus> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            ClientEvent::DraftStatus(status) => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![DraftStatus::for_text("a robot")]);
    assert!(statuses[0].can_submit);
}

#[tokio::test]
async fn carousel_filters_resolves_and_wraps() {
    let (client, gateway) = client_with(TestGateway::seeded());

    let snapshot = client.open_carousel(&id("a")).await.expect("open");
    assert_eq!(
        snapshot.images,
        vec![
            format!("{BASE_URL}/storage/v1/object/public/a/01.jpg"),
            format!("{BASE_URL}/storage/v1/object/public/a/02.PNG"),
            format!("{BASE_URL}/storage/v1/object/public/a/03.webp"),
        ]
    );
    assert_eq!(snapshot.index, 0);
    assert_eq!(
        gateway.list_limits.lock().await.as_slice(),
        &[DEFAULT_IMAGE_LIST_LIMIT]
    );

    assert!(client.prev_image().await);
    assert_eq!(client.carousel().await.index, 2);
    assert!(client.next_image().await);
    assert_eq!(client.carousel().await.index, 0);
    assert!(!client.jump_to_image(3).await);
    assert!(client.jump_to_image(1).await);
    assert_eq!(
        client.carousel().await.current_image(),
        Some(format!("{BASE_URL}/storage/v1/object/public/a/02.PNG").as_str())
    );

    client.close_carousel().await;
    let closed = client.carousel().await;
    assert!(closed.images.is_empty());
    assert_eq!(closed.index, 0);
    assert_eq!(closed.environment_id, None);
}

#[tokio::test]
async fn reopening_resets_position() {
    let (client, _gateway) = client_with(TestGateway::seeded());
    client.open_carousel(&id("a")).await.expect("open");
    client.next_image().await;
    client.next_image().await;

    let reopened = client.open_carousel(&id("a")).await.expect("reopen");
    assert_eq!(reopened.index, 0);
}

#[tokio::test]
async fn carousel_without_images_is_unavailable() {
    let (client, _gateway) = client_with(TestGateway::seeded());
    let mut rx = client.subscribe_events();

    let snapshot = client.open_carousel(&id("b")).await.expect("open");
    assert!(snapshot.images.is_empty());
    assert!(!client.next_image().await);

    let unavailable = drain(&mut rx).into_iter().find_map(|event| match event {
        ClientEvent::CarouselUnavailable { reason, .. } => Some(reason),
        _ => None,
    });
    assert_eq!(unavailable.as_deref(), Some(NO_IMAGES_MESSAGE));
}

#[tokio::test]
async fn carousel_listing_failure_is_reported() {
    let (client, gateway) = client_with(TestGateway::seeded());
    gateway.fail_listing.store(true, Ordering::SeqCst);
    let mut rx = client.subscribe_events();

    let err = client.open_carousel(&id("a")).await.expect_err("listing");
    assert!(matches!(err, WorkshopError::Gateway { .. }));
    assert!(drain(&mut rx).iter().any(|event| matches!(
        event,
        ClientEvent::CarouselUnavailable { reason, .. } if reason == IMAGES_ERROR_MESSAGE
    )));
}

#[tokio::test]
async fn cover_image_is_the_first_listed_supported_image() {
    let (client, gateway) = client_with(TestGateway::seeded());

    assert_eq!(
        client.cover_image_url(&id("a")).await,
        Some(format!("{BASE_URL}/storage/v1/object/public/a/01.jpg"))
    );
    // Only one object is listed; a non-image first entry means no cover.
    assert_eq!(client.cover_image_url(&id("c")).await, None);
    assert_eq!(client.cover_image_url(&id("b")).await, None);
    assert_eq!(gateway.list_limits.lock().await.as_slice(), &[1, 1, 1]);

    gateway.fail_listing.store(true, Ordering::SeqCst);
    assert_eq!(client.cover_image_url(&id("a")).await, None);
}

#[tokio::test]
async fn arrow_keys_only_navigate_an_open_carousel() {
    let (client, _gateway) = client_with(TestGateway::seeded());

    assert!(!client.handle_key(KeyIntent::ArrowRight).await.expect("key"));
    assert!(!client.handle_key(KeyIntent::Escape).await.expect("key"));

    client.open_carousel(&id("a")).await.expect("open");
    assert!(client.handle_key(KeyIntent::ArrowRight).await.expect("key"));
    assert_eq!(client.carousel().await.index, 1);
    assert!(client.handle_key(KeyIntent::ArrowLeft).await.expect("key"));
    assert_eq!(client.carousel().await.index, 0);
    assert!(!client
        .handle_key(KeyIntent::Enter { modifier: false })
        .await
        .expect("key"));

    assert!(client.handle_key(KeyIntent::Escape).await.expect("key"));
    assert_eq!(client.carousel().await.environment_id, None);
}

#[tokio::test]
async fn modifier_enter_submits_the_draft() {
    let (client, gateway) = client_with(TestGateway::seeded());

    client.update_draft("a heist on the moon").await;
    assert!(client
        .handle_key(KeyIntent::Enter { modifier: true })
        .await
        .expect("submit"));
    assert_eq!(gateway.idea_inserts.lock().await[0].idea, "a heist on the moon");
    assert_eq!(client.snapshot().await.idea_draft(), "");
}

#[tokio::test]
async fn vote_notifications_trigger_a_full_recount() {
    let (client, gateway) = client_with(TestGateway::seeded());
    client.initialize().await.expect("initialize");
    let source = LocalChangeSource::default();
    let _task = client.attach_change_source(&source);
    let mut rx = client.subscribe_events();
    let before = gateway.vote_target_fetches.load(Ordering::SeqCst);

    gateway
        .votes
        .lock()
        .await
        .push(NewVote::environment(&SessionId::new("user-3"), &id("b")));
    source.publish(ChangeNotification {
        table: ChangeTable::Votes,
        record: None,
    });

    let (mut environments_seen, mut scripts_seen) = (false, false);
    while !(environments_seen && scripts_seen) {
        let event = wait_for(&mut rx, |event| {
            matches!(
                event,
                ClientEvent::EnvironmentVoteCounts(_) | ClientEvent::ScriptVoteCounts(_)
            )
        })
        .await;
        match event {
            ClientEvent::EnvironmentVoteCounts(tally) => {
                assert_eq!(tally.count("b"), 1);
                environments_seen = true;
            }
            _ => scripts_seen = true,
        }
    }
    assert_eq!(
        gateway.vote_target_fetches.load(Ordering::SeqCst),
        before + 2
    );
    assert_eq!(client.vote_count(VoteKind::Environment, "b").await, 1);
}

#[tokio::test]
async fn idea_notifications_refetch_the_list() {
    let (client, gateway) = client_with(TestGateway::seeded());
    client.initialize().await.expect("initialize");
    let source = LocalChangeSource::default();
    let _task = client.attach_change_source(&source);
    let mut rx = client.subscribe_events();

    gateway
        .ideas
        .lock()
        .await
        .insert(0, idea("3", "submitted elsewhere"));
    source.publish(ChangeNotification {
        table: ChangeTable::ScriptIdeas,
        record: None,
    });

    let event = wait_for(&mut rx, |event| {
        matches!(event, ClientEvent::ScriptIdeasUpdated(_))
    })
    .await;
    let ClientEvent::ScriptIdeasUpdated(ideas) = event else {
        unreachable!();
    };
    assert_eq!(ideas.len(), 3);
    assert_eq!(ideas[0].idea, "submitted elsewhere");
}

#[tokio::test]
async fn lagged_feed_refreshes_everything() {
    let (client, gateway) = client_with(TestGateway::seeded());
    let mut rx = client.subscribe_events();
    let (tx, changes) = broadcast::channel(1);
    for _ in 0..3 {
        tx.send(ChangeNotification {
            table: ChangeTable::Votes,
            record: None,
        })
        .expect("send");
    }

    let task = client.spawn_reconciliation(changes);
    wait_for(&mut rx, |event| {
        matches!(event, ClientEvent::ScriptIdeasUpdated(_))
    })
    .await;
    assert!(gateway.idea_fetches.load(Ordering::SeqCst) >= 1);

    drop(tx);
    timeout(Duration::from_secs(2), task)
        .await
        .expect("task ends when the feed closes")
        .expect("task join");
}

#[tokio::test]
async fn reconciliation_failures_are_logged_only() {
    let (client, gateway) = client_with(TestGateway::seeded());
    gateway.fail_reads.store(true, Ordering::SeqCst);
    let mut rx = client.subscribe_events();

    client.handle_change(ChangeTable::Votes).await;
    client.handle_change(ChangeTable::ScriptIdeas).await;

    assert!(notifications(&drain(&mut rx)).is_empty());
}

#[tokio::test]
async fn user_triggered_load_failures_are_reported() {
    let (client, gateway) = client_with(TestGateway::seeded());
    gateway.fail_reads.store(true, Ordering::SeqCst);
    let mut rx = client.subscribe_events();

    client.initialize().await.expect_err("backend down");

    let messages: Vec<String> = notifications(&drain(&mut rx))
        .into_iter()
        .map(|notification| notification.message)
        .collect();
    assert!(messages.contains(&ENVIRONMENTS_ERROR_MESSAGE.to_string()));
    assert!(messages.contains(&SCRIPT_IDEAS_ERROR_MESSAGE.to_string()));
    assert!(messages.contains(&LOADING_ERROR_MESSAGE.to_string()));
}

#[tokio::test]
async fn handle_trait_drives_the_client() {
    let (client, gateway) = client_with(TestGateway::seeded());
    let handle: Box<dyn WorkshopHandle> = Box::new(client.clone());

    handle.initialize().await.expect("initialize");
    handle.select_environment(&id("a")).await.expect("select a");
    handle.select_environment(&id("c")).await.expect("select c");
    handle.submit_environment_votes().await.expect("submit");
    handle
        .vote_for_idea(&ScriptIdeaId::new("2"))
        .await
        .expect("vote idea");

    assert_eq!(gateway.vote_batches.lock().await.len(), 2);
    assert_eq!(client.environment_phase().await, EnvironmentVotePhase::Committed);
}

#[tokio::test]
async fn bootstrap_reuses_the_persisted_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = Settings {
        backend_url: Some(BASE_URL.to_string()),
        anon_key: Some("anon-key".to_string()),
        local_store_url: LocalStore::sqlite_url_for_data_dir(dir.path()),
        ..Settings::default()
    };

    let first = WorkshopClient::bootstrap(&settings)
        .await
        .expect("first boot")
        .session_id()
        .clone();
    let second = WorkshopClient::bootstrap(&settings)
        .await
        .expect("second boot")
        .session_id()
        .clone();

    assert!(first.as_str().starts_with("user-"));
    assert_eq!(first, second);
}

#[tokio::test]
async fn bootstrap_without_backend_url_is_a_config_error() {
    let settings = Settings {
        backend_url: None,
        anon_key: Some("anon-key".to_string()),
        ..Settings::default()
    };
    let err = WorkshopClient::bootstrap(&settings)
        .await
        .err()
        .expect("missing url");
    assert!(matches!(
        err,
        WorkshopError::Config(ConfigError::MissingBackendUrl)
    ));
}
