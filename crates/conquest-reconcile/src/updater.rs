//! Update sequencer - the reconciliation orchestrator.
//!
//! Snapshots from the transport are queued and processed one at a time by a
//! single drain task that owns the whole session: baseline, elimination
//! bookkeeping, banner state machine and the replay guard. Nothing else
//! writes that state, so ordering is guaranteed by the queue alone.

use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use conquest_protocol::{PlayerSlot, RegionGraph, Snapshot};
use futures::FutureExt;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::banner::{complete_my_turn_banner, BannerCoordinator, BannerState};
use crate::config::ReconcileConfig;
use crate::detector::{detect, Move};
use crate::effects::{ReplayEffects, SessionHooks};
use crate::error::ReconcileError;
use crate::events::ReconcileEvent;
use crate::replay::MoveReplayer;
use crate::sequencer::TaskSequencer;

const EVENT_CAPACITY: usize = 256;

enum Command {
    Snapshot(Arc<Snapshot>),
    Load(Arc<Snapshot>),
    Settled(oneshot::Sender<()>),
    Shutdown,
}

enum Pending {
    Snapshot(Arc<Snapshot>),
    Barrier(oneshot::Sender<()>),
}

enum Next {
    Wait,
    Barrier,
    Snapshot,
}

/// Per-session reconciliation state. Reset on game (re)load.
#[derive(Debug)]
struct Session {
    baseline: Option<Arc<Snapshot>>,
    local: PlayerSlot,
    eliminated: HashSet<PlayerSlot>,
    game_over: bool,
}

impl Session {
    fn new(local: PlayerSlot) -> Self {
        Self {
            baseline: None,
            local,
            eliminated: HashSet::new(),
            game_over: false,
        }
    }
}

/// Drain task of one reconciliation session.
pub struct Reconciler {
    id: Uuid,
    config: ReconcileConfig,
    rx: mpsc::UnboundedReceiver<Command>,
    closed: bool,
    stopping: bool,
    queue: VecDeque<Pending>,
    session: Session,
    regions: RegionGraph,
    sequencer: TaskSequencer,
    replayer: MoveReplayer,
    banner: BannerCoordinator,
    hooks: Arc<dyn SessionHooks>,
    replaying: Arc<watch::Sender<bool>>,
    committed: Arc<watch::Sender<Option<Arc<Snapshot>>>>,
    events: broadcast::Sender<ReconcileEvent>,
}

impl Reconciler {
    /// Create a session for `local` and the handle used to feed and observe it.
    ///
    /// Must be called inside a tokio runtime (the animation timeline is
    /// spawned here).
    pub fn new(
        config: ReconcileConfig,
        local: PlayerSlot,
        effects: Arc<dyn ReplayEffects>,
        hooks: Arc<dyn SessionHooks>,
    ) -> (Self, ReconcilerHandle) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let replaying = Arc::new(watch::channel(false).0);
        let committed = Arc::new(watch::channel(None).0);
        let banner_state = Arc::new(watch::channel(BannerState::Idle).0);

        let sequencer = TaskSequencer::spawn();
        let replayer = MoveReplayer::new(sequencer.clone(), effects, &config);
        let banner = BannerCoordinator::new(Arc::clone(&banner_state), events.clone());

        let handle = ReconcilerHandle {
            session_id: id,
            tx,
            replaying: Arc::clone(&replaying),
            committed: Arc::clone(&committed),
            banner: banner_state,
            events: events.clone(),
            hooks: Arc::clone(&hooks),
        };

        let reconciler = Self {
            id,
            config,
            rx,
            closed: false,
            stopping: false,
            queue: VecDeque::new(),
            session: Session::new(local),
            regions: RegionGraph::new(),
            sequencer,
            replayer,
            banner,
            hooks,
            replaying,
            committed,
            events,
        };
        (reconciler, handle)
    }

    /// Adjacency used for movement pairing when snapshots carry none.
    pub fn with_regions(mut self, regions: RegionGraph) -> Self {
        self.regions = regions;
        self
    }

    /// Run the drain loop on the current runtime inside a session span.
    pub fn spawn(self) -> JoinHandle<()> {
        let span = info_span!("reconcile", session = %self.id);
        tokio::spawn(self.run().instrument(span))
    }

    /// Drain loop. Returns after shutdown, or once every handle is dropped
    /// and the queue is empty.
    pub async fn run(mut self) {
        info!(local = %self.session.local, "reconciler started");
        loop {
            self.accept_pending();
            if self.stopping {
                break;
            }

            let next = match self.queue.front() {
                None => Next::Wait,
                Some(Pending::Barrier(_)) => Next::Barrier,
                Some(Pending::Snapshot(_)) => Next::Snapshot,
            };

            match next {
                Next::Wait => {
                    if self.closed {
                        break;
                    }
                    match self.rx.recv().await {
                        Some(cmd) => self.accept(cmd),
                        None => self.closed = true,
                    }
                }
                Next::Barrier => {
                    if let Some(Pending::Barrier(done)) = self.queue.pop_front() {
                        let _ = done.send(());
                    }
                }
                Next::Snapshot => {
                    if let Some(reason) = self.defer_reason() {
                        if self.closed && self.session.baseline.is_none() {
                            warn!(
                                dropped = self.queued_snapshots(),
                                "handles dropped before any game was loaded"
                            );
                            break;
                        }
                        debug!(reason, "deferring snapshot");
                        self.wait_backoff().await;
                        continue;
                    }
                    if let Some(Pending::Snapshot(snapshot)) = self.queue.pop_front() {
                        self.process(snapshot).await;
                    }
                }
            }
        }

        self.sequencer.clear();
        self.replaying.send_replace(false);
        info!("reconciler stopped");
    }

    fn accept(&mut self, cmd: Command) {
        match cmd {
            Command::Snapshot(snapshot) => {
                self.queue.push_back(Pending::Snapshot(snapshot));
                debug!(queued = self.queue.len(), "snapshot queued");
            }
            Command::Load(snapshot) => self.load(snapshot),
            Command::Settled(done) => self.queue.push_back(Pending::Barrier(done)),
            Command::Shutdown => self.stopping = true,
        }
    }

    fn accept_pending(&mut self) {
        while !self.closed {
            match self.rx.try_recv() {
                Ok(cmd) => self.accept(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.closed = true,
            }
        }
    }

    fn defer_reason(&self) -> Option<&'static str> {
        if self.session.baseline.is_none() {
            Some("no baseline")
        } else if self.hooks.local_battle_in_flight() {
            Some("local battle in flight")
        } else {
            None
        }
    }

    /// Sleep for the backoff, waking early if a command arrives.
    async fn wait_backoff(&mut self) {
        let backoff = self.config.defer_backoff();
        if self.closed {
            tokio::time::sleep(backoff).await;
            return;
        }
        let received = tokio::select! {
            _ = tokio::time::sleep(backoff) => None,
            cmd = self.rx.recv() => Some(cmd),
        };
        match received {
            Some(Some(cmd)) => self.accept(cmd),
            Some(None) => self.closed = true,
            None => {}
        }
    }

    fn queued_snapshots(&self) -> usize {
        self.queue
            .iter()
            .filter(|p| matches!(p, Pending::Snapshot(_)))
            .count()
    }

    fn load(&mut self, snapshot: Arc<Snapshot>) {
        let local = self.session.local;
        info!(
            turn = snapshot.turn_number,
            current = %snapshot.current_player,
            "game loaded"
        );

        // Pushes queued before a reload belong to the game being replaced.
        // Before the first load they are kept and diffed against it.
        if self.session.baseline.is_some() {
            let before = self.queue.len();
            self.queue.retain(|p| matches!(p, Pending::Barrier(_)));
            let dropped = before - self.queue.len();
            if dropped > 0 {
                info!(dropped, "discarding snapshots queued before reload");
            }
        }

        self.session = Session::new(local);
        self.session.eliminated = snapshot
            .players
            .iter()
            .filter(|p| snapshot.region_count(p.slot) == 0)
            .map(|p| p.slot)
            .collect();
        self.session.game_over = snapshot.is_finished() || self.hooks.game_ended(&snapshot);

        self.banner.reset();
        if !self.session.game_over && snapshot.current_player == local {
            self.banner.begin_local_turn();
        }
        self.commit(&snapshot);
        self.session.baseline = Some(snapshot);
    }

    async fn process(&mut self, incoming: Arc<Snapshot>) {
        let Some(baseline) = self.session.baseline.clone() else {
            return;
        };
        let behind = self.queued_snapshots();
        let coalesce = self
            .config
            .coalesce_after
            .is_some_and(|limit| behind > limit);

        let outcome = AssertUnwindSafe(self.reconcile(&baseline, &incoming, coalesce))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(turn = incoming.turn_number, error = %err, "reconciliation incomplete; applying snapshot");
                self.recover(&incoming);
            }
            Err(panic) => {
                let err = ReconcileError::Panicked(panic_message(panic.as_ref()));
                error!(turn = incoming.turn_number, error = %err, "reconciliation failed; applying snapshot");
                self.recover(&incoming);
            }
        }

        // Future diffs are always against the last snapshot actually received.
        self.session.baseline = Some(incoming);
    }

    async fn reconcile(
        &mut self,
        baseline: &Snapshot,
        incoming: &Arc<Snapshot>,
        coalesce: bool,
    ) -> Result<(), ReconcileError> {
        self.announce_eliminations(incoming);

        if self.session.game_over {
            debug!(turn = incoming.turn_number, "game over; committing without replay");
            self.commit(incoming);
            return Ok(());
        }

        if incoming.is_finished() || self.hooks.game_ended(incoming) {
            info!(result = ?incoming.end_result, "game ended");
            self.session.game_over = true;
            self.banner.reset();
            self.commit(incoming);
            let _ = self.events.send(ReconcileEvent::GameEnded(incoming.end_result));
            return Ok(());
        }

        let local = self.session.local;
        let acting = baseline.current_player;
        let next = incoming.current_player;
        let turn_passed_to = (acting != next).then_some(next);

        let moves = if coalesce {
            info!(turn = incoming.turn_number, "snapshot burst; skipping replay");
            Vec::new()
        } else {
            detect(baseline, incoming, &self.regions)
        };

        if acting != local && !moves.is_empty() {
            if self.banner.begin_remote_replay(acting) {
                tokio::time::sleep(self.config.replay_banner()).await;
            }
            self.banner.start_transition();
            let regions = incoming.regions.as_ref().unwrap_or(&self.regions);
            replay_moves(&self.replayer, &self.replaying, &moves, regions).await?;
        }

        self.commit(incoming);
        self.banner.finish(local, turn_passed_to);

        if let Some(next) = turn_passed_to {
            if next != local && incoming.is_ai(next) {
                self.trigger_ai(next);
            }
        }
        Ok(())
    }

    /// Bring observable state in line with `incoming` after a failed iteration.
    fn recover(&mut self, incoming: &Arc<Snapshot>) {
        self.replaying.send_replace(false);
        let already = self
            .committed
            .borrow()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, incoming));
        if !already {
            self.commit(incoming);
        }
        if self.banner.state() != BannerState::ShowingMyTurnBanner {
            self.banner.reset();
        }
    }

    fn announce_eliminations(&mut self, incoming: &Snapshot) {
        for player in &incoming.players {
            if incoming.region_count(player.slot) == 0 && self.session.eliminated.insert(player.slot)
            {
                info!(player = %player.slot, "player eliminated");
                let _ = self.events.send(ReconcileEvent::PlayerEliminated(player.slot));
            }
        }
    }

    fn commit(&self, snapshot: &Arc<Snapshot>) {
        self.committed.send_replace(Some(Arc::clone(snapshot)));
        debug!(
            turn = snapshot.turn_number,
            current = %snapshot.current_player,
            "state committed"
        );
        let _ = self
            .events
            .send(ReconcileEvent::StateCommitted(Arc::clone(snapshot)));
    }

    fn trigger_ai(&self, player: PlayerSlot) {
        info!(player = %player, "turn passed to AI");
        let hooks = Arc::clone(&self.hooks);
        tokio::spawn(
            async move {
                if let Err(err) = hooks.trigger_ai_turn(player).await {
                    warn!(player = %player, error = %err, "AI turn trigger failed");
                }
            }
            .in_current_span(),
        );
    }
}

/// Replay `moves` in order with the replay guard raised.
async fn replay_moves(
    replayer: &MoveReplayer,
    replaying: &watch::Sender<bool>,
    moves: &[Move],
    regions: &RegionGraph,
) -> Result<(), ReconcileError> {
    replaying.send_replace(true);
    let mut result = Ok(());
    for mv in moves {
        if let Err(err) = replayer.play(mv, regions).await {
            result = Err(err.into());
            break;
        }
    }
    replaying.send_replace(false);
    result
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Feeds and observes a running [`Reconciler`]. Cheap to clone.
#[derive(Clone)]
pub struct ReconcilerHandle {
    session_id: Uuid,
    tx: mpsc::UnboundedSender<Command>,
    replaying: Arc<watch::Sender<bool>>,
    committed: Arc<watch::Sender<Option<Arc<Snapshot>>>>,
    banner: Arc<watch::Sender<BannerState>>,
    events: broadcast::Sender<ReconcileEvent>,
    hooks: Arc<dyn SessionHooks>,
}

impl ReconcilerHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Queue a pushed snapshot. Never blocks.
    pub fn on_snapshot_received(&self, snapshot: impl Into<Arc<Snapshot>>) {
        if self.tx.send(Command::Snapshot(snapshot.into())).is_err() {
            debug!(session = %self.session_id, "reconciler stopped; snapshot ignored");
        }
    }

    /// Start (or restart) the session from a freshly loaded game state.
    ///
    /// On a reload, snapshots still queued from the previous game are discarded.
    pub fn load_game(&self, snapshot: impl Into<Arc<Snapshot>>) {
        if self.tx.send(Command::Load(snapshot.into())).is_err() {
            debug!(session = %self.session_id, "reconciler stopped; load ignored");
        }
    }

    /// Resolves once every snapshot queued before this call has been processed.
    pub async fn settled(&self) {
        let (done, rx) = oneshot::channel();
        if self.tx.send(Command::Settled(done)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Stop the session and drop any animation that has not started.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }

    /// UI signal: the my-turn banner has finished. Returns `false` if none was up.
    pub fn banner_complete(&self) -> bool {
        complete_my_turn_banner(&self.banner, &self.events, self.hooks.as_ref())
    }

    /// True while remote moves are being replayed; live state is transient then.
    pub fn is_replaying(&self) -> bool {
        *self.replaying.borrow()
    }

    pub fn watch_replaying(&self) -> watch::Receiver<bool> {
        self.replaying.subscribe()
    }

    /// Last committed (displayed) snapshot.
    pub fn committed(&self) -> Option<Arc<Snapshot>> {
        self.committed.borrow().clone()
    }

    pub fn watch_committed(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.committed.subscribe()
    }

    pub fn banner_state(&self) -> BannerState {
        *self.banner.borrow()
    }

    pub fn watch_banner(&self) -> watch::Receiver<BannerState> {
        self.banner.subscribe()
    }

    /// Regions may be highlighted for interaction only when no banner or
    /// transition is pending.
    pub fn interaction_enabled(&self) -> bool {
        self.banner_state() == BannerState::Idle && !self.is_replaying()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReconcileEvent> {
        self.events.subscribe()
    }
}
