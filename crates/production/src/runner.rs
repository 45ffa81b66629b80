//! Async event loop around the consensus dispatcher.

use crate::config::{load_signing_key, ConfigError, NodeConfig};
use crate::storage::FileSafetyStore;
use crate::timers::TimerManager;
use chainbft_bft::{
    BftConfig, ConsensusServices, Dispatcher, EpochManager, SafetyRulesError, SafetyStateStore,
    StoreError,
};
use chainbft_core::{Action, Event, Ledger, Mempool, NetworkSender, OutboundMessage};
use chainbft_types::{Hash, KeyPair, PublicKey, ValidatorSet, Vertex};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, debug_span, info, warn};

/// Errors from the consensus runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Event channel full")]
    ChannelFull,

    #[error("Missing runner component: {0}")]
    MissingComponent(&'static str),

    #[error("Safety state unusable: {0}")]
    SafetyState(#[from] SafetyRulesError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to open safety state store: {0}")]
    Storage(#[from] StoreError),
}

/// Handle for shutting down a running [`ConsensusRunner`].
///
/// When dropped, signals the runner to exit.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl ShutdownHandle {
    /// Trigger shutdown (consumes the handle).
    pub fn shutdown(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Cloneable producer side of the runner's event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    /// Wait for capacity and enqueue `event`.
    pub async fn send(&self, event: Event) -> Result<(), RunnerError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| RunnerError::ChannelClosed)
    }

    /// Enqueue `event` without waiting.
    pub fn try_send(&self, event: Event) -> Result<(), RunnerError> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => RunnerError::ChannelFull,
            TrySendError::Closed(_) => RunnerError::ChannelClosed,
        })
    }

    /// Enqueue `event` from a thread outside the tokio runtime.
    pub fn blocking_send(&self, event: Event) -> Result<(), RunnerError> {
        self.tx
            .blocking_send(event)
            .map_err(|_| RunnerError::ChannelClosed)
    }
}

/// Builder for constructing a [`ConsensusRunner`].
///
/// Required: `signing_key`, `safety_store`, `mempool`, `network`, `ledger`.
/// Optional: `bft_config` (defaults), `channel_capacity` (10,000) and an
/// initial validator set, delivered as the first epoch.
pub struct ConsensusRunnerBuilder {
    signing_key: Option<KeyPair>,
    bft_config: BftConfig,
    safety_store: Option<Box<dyn SafetyStateStore>>,
    mempool: Option<Arc<dyn Mempool>>,
    network: Option<Arc<dyn NetworkSender>>,
    ledger: Option<Arc<dyn Ledger>>,
    channel_capacity: usize,
    validator_set: Option<Arc<ValidatorSet>>,
}

impl Default for ConsensusRunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsensusRunnerBuilder {
    pub fn new() -> Self {
        Self {
            signing_key: None,
            bft_config: BftConfig::default(),
            safety_store: None,
            mempool: None,
            network: None,
            ledger: None,
            channel_capacity: 10_000,
            validator_set: None,
        }
    }

    /// Start a builder from node configuration.
    ///
    /// Loads the signing key, opens the file safety store and applies the
    /// consensus parameters, channel capacity and initial validator set. The
    /// collaborators still have to be supplied.
    pub fn from_config(config: &NodeConfig) -> Result<Self, RunnerError> {
        config.validate()?;
        let signing_key = load_signing_key(&config.node.key_path)?;
        let safety_store = FileSafetyStore::open(&config.node.safety_path)?;
        info!(
            public_key = %signing_key.public_key(),
            key_path = %config.node.key_path.display(),
            validators = config.validators.len(),
            "Loaded node configuration"
        );

        let mut builder = Self::new()
            .signing_key(signing_key)
            .bft_config(config.bft_config())
            .safety_store(Box::new(safety_store))
            .channel_capacity(config.runner.channel_capacity);
        if let Some(validator_set) = config.validator_set()? {
            builder = builder.validator_set(Arc::new(validator_set));
        }
        Ok(builder)
    }

    pub fn signing_key(mut self, key: KeyPair) -> Self {
        self.signing_key = Some(key);
        self
    }

    pub fn bft_config(mut self, config: BftConfig) -> Self {
        self.bft_config = config;
        self
    }

    pub fn safety_store(mut self, store: Box<dyn SafetyStateStore>) -> Self {
        self.safety_store = Some(store);
        self
    }

    pub fn mempool(mut self, mempool: Arc<dyn Mempool>) -> Self {
        self.mempool = Some(mempool);
        self
    }

    pub fn network(mut self, network: Arc<dyn NetworkSender>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn validator_set(mut self, validators: Arc<ValidatorSet>) -> Self {
        self.validator_set = Some(validators);
        self
    }

    /// Load safety state and assemble the runner.
    ///
    /// Fails if a component is missing or the persisted safety state cannot
    /// be trusted.
    pub fn build(self) -> Result<ConsensusRunner, RunnerError> {
        let signing_key = self
            .signing_key
            .ok_or(RunnerError::MissingComponent("signing_key"))?;
        let safety_store = self
            .safety_store
            .ok_or(RunnerError::MissingComponent("safety_store"))?;
        let mempool = self
            .mempool
            .ok_or(RunnerError::MissingComponent("mempool"))?;
        let network = self
            .network
            .ok_or(RunnerError::MissingComponent("network"))?;
        let ledger = self.ledger.ok_or(RunnerError::MissingComponent("ledger"))?;

        let services = ConsensusServices::new(
            &self.bft_config,
            signing_key,
            safety_store,
            Arc::clone(&mempool),
        )?;
        let dispatcher = Dispatcher::new(EpochManager::new(services));

        let (event_tx, event_rx) = mpsc::channel(self.channel_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let mut internal = VecDeque::new();
        if let Some(validator_set) = self.validator_set {
            internal.push_back(Event::EpochChange { validator_set });
        }

        Ok(ConsensusRunner {
            dispatcher,
            network,
            ledger,
            mempool,
            timers: TimerManager::new(event_tx.clone()),
            event_tx,
            event_rx,
            internal,
            shutdown_rx,
            shutdown_tx: Some(shutdown_tx),
        })
    }
}

/// Drives the [`Dispatcher`] from a single tokio task.
///
/// Producers on any thread push events through [`EventSender`]s; the runner
/// consumes them one at a time in arrival order and executes the resulting
/// actions. Events the state machine addresses to itself run before the next
/// channel event.
pub struct ConsensusRunner {
    dispatcher: Dispatcher,
    network: Arc<dyn NetworkSender>,
    ledger: Arc<dyn Ledger>,
    mempool: Arc<dyn Mempool>,
    timers: TimerManager,
    event_tx: mpsc::Sender<Event>,
    event_rx: mpsc::Receiver<Event>,
    internal: VecDeque<Event>,
    shutdown_rx: oneshot::Receiver<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ConsensusRunner {
    pub fn builder() -> ConsensusRunnerBuilder {
        ConsensusRunnerBuilder::new()
    }

    pub fn event_sender(&self) -> EventSender {
        EventSender {
            tx: self.event_tx.clone(),
        }
    }

    /// Take the shutdown handle. Dropping it stops the runner.
    pub fn shutdown_handle(&mut self) -> Option<ShutdownHandle> {
        self.shutdown_tx
            .take()
            .map(|tx| ShutdownHandle { tx: Some(tx) })
    }

    pub fn public_key(&self) -> PublicKey {
        self.dispatcher.services().public_key()
    }

    /// Run until shutdown is signalled.
    ///
    /// Shutdown is checked before every event, so no further event is
    /// consumed once it is signalled. The armed timer is cancelled on exit.
    pub async fn run(mut self) -> Result<(), RunnerError> {
        info!(public_key = %self.public_key(), "Starting consensus runner");

        loop {
            if let Some(event) = self.internal.pop_front() {
                if self.shutdown_signalled() {
                    info!("Shutdown signal received");
                    break;
                }
                self.handle_event(event);
                // Keep the runtime responsive while self-addressed events chain
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                biased;

                _ = &mut self.shutdown_rx => {
                    info!("Shutdown signal received");
                    break;
                }

                event = self.event_rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        warn!("Event channel closed");
                        break;
                    }
                },
            }
        }

        self.timers.cancel();
        info!(dropped_internal = self.internal.len(), "Consensus runner stopped");
        Ok(())
    }

    fn shutdown_signalled(&mut self) -> bool {
        !matches!(
            self.shutdown_rx.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        )
    }

    fn handle_event(&mut self, event: Event) {
        let span = debug_span!("handle_event", event.type = event.type_name());
        let _guard = span.enter();

        let actions = self.dispatcher.dispatch(event);
        for action in actions {
            self.process_action(action);
        }
    }

    fn process_action(&mut self, action: Action) {
        match action {
            Action::Send { to, message } => self.send(&to, &message),
            Action::Broadcast {
                recipients,
                message,
            } => {
                for to in &recipients {
                    self.send(to, &message);
                }
            }
            Action::Commit { vertex } => self.deliver(&vertex),
            Action::ScheduleTimeout { view, duration } => {
                self.timers.schedule_local_timeout(view, duration)
            }
            Action::EnqueueInternal { event } => self.internal.push_back(event),
        }
    }

    fn send(&self, to: &PublicKey, message: &OutboundMessage) {
        debug!(to = %to, message = message.type_name(), "Sending");
        match message {
            OutboundMessage::Proposal(proposal) => self.network.send_proposal(to, proposal),
            OutboundMessage::Vote(vote) => self.network.send_vote(to, vote),
            OutboundMessage::NewView(new_view) => self.network.send_new_view(to, new_view),
        }
    }

    /// Hand a committed vertex to the ledger and settle its commands in the
    /// mempool.
    fn deliver(&self, vertex: &Vertex) {
        let rejected: HashSet<Hash> = self.ledger.deliver(vertex).into_iter().collect();
        for command in vertex.commands() {
            let id = command.id();
            if rejected.contains(&id) {
                self.mempool.remove_rejected(&id);
            } else {
                self.mempool.remove_committed(&id);
            }
        }
        info!(
            vertex = ?vertex.id(),
            view = vertex.view().0,
            commands = vertex.commands().len(),
            rejected = rejected.len(),
            "Delivered committed vertex"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainbft_bft::{MemorySafetyStore, RotatingLeaders};
    use chainbft_test_helpers::{RecordingLedger, RecordingMempool, RecordingNetwork, TestValidators};
    use chainbft_types::{Command, View};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        network: Arc<RecordingNetwork>,
        ledger: Arc<RecordingLedger>,
        mempool: Arc<RecordingMempool>,
    }

    impl Harness {
        fn new(commands: Vec<Command>) -> Self {
            Self {
                network: Arc::new(RecordingNetwork::new()),
                ledger: Arc::new(RecordingLedger::new()),
                mempool: Arc::new(RecordingMempool::with_commands(commands)),
            }
        }

        fn builder(&self, key: KeyPair) -> ConsensusRunnerBuilder {
            ConsensusRunner::builder()
                .signing_key(key)
                .bft_config(BftConfig::default().with_base_timeout(Duration::from_millis(50)))
                .safety_store(Box::new(MemorySafetyStore::new()))
                .mempool(Arc::clone(&self.mempool) as Arc<dyn Mempool>)
                .network(Arc::clone(&self.network) as Arc<dyn NetworkSender>)
                .ledger(Arc::clone(&self.ledger) as Arc<dyn Ledger>)
        }
    }

    async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..300 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_single_validator_commits_over_channel() {
        let validators = TestValidators::new(1);
        let commands: Vec<Command> = (0..4u8).map(|i| Command::new(vec![i])).collect();
        let harness = Harness::new(commands);

        let mut runner = harness.builder(validators.key(0).clone()).build().unwrap();
        let sender = runner.event_sender();
        let shutdown = runner.shutdown_handle().unwrap();
        let task = tokio::spawn(runner.run());

        sender
            .send(Event::EpochChange {
                validator_set: validators.shared_set(),
            })
            .await
            .unwrap();

        let mempool = Arc::clone(&harness.mempool);
        assert!(eventually(|| mempool.committed().len() == 4).await);
        assert!(!harness.ledger.delivered().is_empty());
        assert!(harness.network.sent().is_empty());

        shutdown.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_leader_broadcasts_then_times_out() {
        let validators = TestValidators::new(4);
        let election = RotatingLeaders::from_validator_set(validators.set());
        let leader = validators.index_of(election.proposer(View(1))).unwrap();
        let next_leader = *election.proposer(View(2));
        let harness = Harness::new(vec![]);

        let mut runner = harness
            .builder(validators.key(leader).clone())
            .validator_set(validators.shared_set())
            .build()
            .unwrap();
        let shutdown = runner.shutdown_handle().unwrap();
        let task = tokio::spawn(runner.run());

        let network = Arc::clone(&harness.network);
        assert!(
            eventually(|| network
                .sent()
                .iter()
                .any(|(_, m)| matches!(m, OutboundMessage::NewView(_))))
            .await
        );

        let sent = harness.network.sent();
        let proposals = sent
            .iter()
            .filter(|(_, m)| matches!(m, OutboundMessage::Proposal(_)))
            .count();
        assert_eq!(proposals, 3);
        assert!(sent
            .iter()
            .any(|(to, m)| *to == next_leader && matches!(m, OutboundMessage::Vote(_))));
        assert!(sent.iter().any(|(to, m)| {
            *to == next_leader
                && matches!(m, OutboundMessage::NewView(nv) if nv.new_view().view == View(2))
        }));

        drop(shutdown);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_before_any_event() {
        let validators = TestValidators::new(4);
        let harness = Harness::new(vec![]);
        let mut runner = harness.builder(validators.key(0).clone()).build().unwrap();
        let shutdown = runner.shutdown_handle().unwrap();
        assert!(runner.shutdown_handle().is_none());

        shutdown.shutdown();
        runner.run().await.unwrap();
        assert!(harness.network.sent().is_empty());
    }

    #[tokio::test]
    async fn test_event_sender_reports_closed_channel() {
        let validators = TestValidators::new(1);
        let harness = Harness::new(vec![]);
        let mut runner = harness.builder(validators.key(0).clone()).build().unwrap();
        let sender = runner.event_sender();
        drop(runner.shutdown_handle());
        runner.run().await.unwrap();

        let result = sender.try_send(Event::LocalTimeout { view: View(1) });
        assert!(matches!(result, Err(RunnerError::ChannelClosed)));
    }

    #[test]
    fn test_build_requires_components() {
        let result = ConsensusRunner::builder()
            .safety_store(Box::new(MemorySafetyStore::new()))
            .build();
        assert!(matches!(
            result,
            Err(RunnerError::MissingComponent("signing_key"))
        ));
    }

    #[test]
    fn test_build_fails_on_corrupt_safety_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("safety.json");
        std::fs::write(&path, b"garbage").unwrap();

        let validators = TestValidators::new(1);
        let harness = Harness::new(vec![]);
        let result = harness
            .builder(validators.key(0).clone())
            .safety_store(Box::new(FileSafetyStore::open(&path).unwrap()))
            .build();
        assert!(matches!(result, Err(RunnerError::SafetyState(_))));
    }

    /// Config for a single-validator node whose key is `seed`. The key file
    /// is written only if `with_key`.
    fn write_config(dir: &TempDir, seed: [u8; 32], with_key: bool) -> NodeConfig {
        let key_path = dir.path().join("validator.key");
        if with_key {
            std::fs::write(&key_path, hex::encode(seed)).unwrap();
        }
        let toml = format!(
            r#"
            [node]
            key_path = '{}'
            safety_path = '{}'

            [consensus]
            base_timeout_ms = 50
            max_timeout_ms = 400

            [runner]
            channel_capacity = 64

            [[validators]]
            public_key = "{}"
            "#,
            key_path.display(),
            dir.path().join("data").join("safety.json").display(),
            hex::encode(KeyPair::from_seed(&seed).public_key().as_bytes()),
        );
        NodeConfig::from_toml_str(&toml).unwrap()
    }

    #[test]
    fn test_from_config_requires_signing_key() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, [1u8; 32], false);

        let result = ConsensusRunnerBuilder::from_config(&config);
        assert!(matches!(
            result,
            Err(RunnerError::Config(ConfigError::MissingKey(_)))
        ));
    }

    #[tokio::test]
    async fn test_runner_from_config_starts_first_epoch() {
        let dir = TempDir::new().unwrap();
        let seed = [1u8; 32];
        let config = write_config(&dir, seed, true);

        let harness = Harness::new(vec![Command::new(vec![9])]);
        let mut runner = ConsensusRunnerBuilder::from_config(&config)
            .unwrap()
            .mempool(Arc::clone(&harness.mempool) as Arc<dyn Mempool>)
            .network(Arc::clone(&harness.network) as Arc<dyn NetworkSender>)
            .ledger(Arc::clone(&harness.ledger) as Arc<dyn Ledger>)
            .build()
            .unwrap();
        assert_eq!(runner.public_key(), KeyPair::from_seed(&seed).public_key());
        let shutdown = runner.shutdown_handle().unwrap();
        let task = tokio::spawn(runner.run());

        // No EpochChange is sent; the configured set starts the first epoch
        let mempool = Arc::clone(&harness.mempool);
        assert!(eventually(|| mempool.committed().len() == 1).await);
        shutdown.shutdown();
        task.await.unwrap().unwrap();

        let stored = FileSafetyStore::open(&config.node.safety_path)
            .unwrap()
            .load()
            .unwrap()
            .unwrap();
        assert!(stored.last_voted_view > View::GENESIS);
    }
}
