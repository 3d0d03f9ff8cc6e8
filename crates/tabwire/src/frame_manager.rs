// Frame lifecycle reconciliation.
//
// The manager consumes a page's event stream — frame attached / navigated
// / detached / swapped, execution-context created / destroyed — and keeps
// the frame tree and world bindings consistent under out-of-order and
// cross-session delivery. Two ordering rules do the heavy lifting:
//
// 1. The initial frame-tree snapshot is processed exactly once per
//    (re)initialization, and every live event handler waits behind the
//    snapshot gate, so no event ever runs against an unpopulated tree.
// 2. A "navigated already received" set, updated at message-arrival time,
//    suppresses the snapshot's stale navigation for any frame the live
//    stream got to first.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::deferred::Deferred;
use crate::device_prompt::DeviceRequestPromptManager;
use crate::error::{Error, Result};
use crate::events::EventEmitter;
use crate::frame::{Frame, FrameEvent};
use crate::frame_tree::FrameTree;
use crate::message::{
    CdpEvent, ContextDescription, DetachReason, ExecutionContextId, FrameId, FramePayload,
    FrameTreeSnapshot, NavigationType, SessionId,
};
use crate::network::NetworkManager;
use crate::session::{Session, SessionEvent};
use crate::target::{Target, TargetType};
use crate::world::{ExecutionContext, WorldKind, INTERNAL_URL, UTILITY_WORLD_NAME};

/// How long to wait for an activation swap after the client disconnects
/// before concluding the page is really gone.
const TIME_FOR_WAITING_FOR_SWAP: Duration = Duration::from_millis(100);

/// Events emitted by the frame manager, all carrying the affected frame.
#[derive(Clone)]
pub enum FrameManagerEvent {
    FrameAttached(Arc<Frame>),
    FrameNavigated(Arc<Frame>),
    FrameDetached(Arc<Frame>),
    FrameSwapped(Arc<Frame>),
    LifecycleEvent(Arc<Frame>),
}

#[derive(Clone)]
pub struct FrameManager {
    inner: Arc<FrameManagerInner>,
}

/// Non-owning handle; used by event listeners that must not keep the
/// manager (and through it the session) alive.
#[derive(Clone)]
pub struct WeakFrameManager {
    inner: Weak<FrameManagerInner>,
}

impl WeakFrameManager {
    pub fn upgrade(&self) -> Option<FrameManager> {
        self.inner.upgrade().map(|inner| FrameManager { inner })
    }
}

struct FrameManagerInner {
    client: RwLock<Arc<Session>>,
    frame_tree: FrameTree,
    emitter: EventEmitter<FrameManagerEvent>,
    network: NetworkManager,
    /// Frame ids whose live `frameNavigated` arrived before snapshot replay
    /// got to them; consulted and cleared per id during replay.
    frame_navigated_received: Mutex<HashSet<FrameId>>,
    /// Gate the live event stream waits behind during (re)initialization.
    frame_tree_handled: Mutex<Deferred<()>>,
    /// `session_id:world_name` pairs already bootstrapped.
    isolated_worlds: Mutex<HashSet<String>>,
    /// Live context registry: (session, context id) -> (frame, world).
    contexts: Mutex<HashMap<(SessionId, ExecutionContextId), (FrameId, WorldKind)>>,
    device_prompt_managers: Mutex<HashMap<SessionId, Arc<DeviceRequestPromptManager>>>,
    /// Sessions whose event streams already feed the intake queue.
    listened_sessions: Mutex<HashSet<SessionId>>,
    intake_tx: mpsc::UnboundedSender<(Arc<Session>, Arc<CdpEvent>)>,
}

impl FrameManager {
    /// Build a manager for the given page session. `initialize` must be
    /// called before the controller reads frame state.
    pub fn new(client: Arc<Session>) -> FrameManager {
        let (intake_tx, intake_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(FrameManagerInner {
            client: RwLock::new(Arc::clone(&client)),
            frame_tree: FrameTree::new(),
            emitter: EventEmitter::new(),
            network: NetworkManager::new(),
            frame_navigated_received: Mutex::new(HashSet::new()),
            // Until the first initialize arms a real gate, events pass
            // straight through.
            frame_tree_handled: Mutex::new(Deferred::resolved(())),
            isolated_worlds: Mutex::new(HashSet::new()),
            contexts: Mutex::new(HashMap::new()),
            device_prompt_managers: Mutex::new(HashMap::new()),
            listened_sessions: Mutex::new(HashSet::new()),
            intake_tx,
        });

        tokio::spawn(FrameManagerInner::run_worker(
            Arc::downgrade(&inner),
            intake_rx,
        ));

        let manager = FrameManager { inner };
        manager.inner.setup_event_listeners(&client);
        manager.inner.watch_disconnect(&client);
        manager
    }

    pub fn downgrade(&self) -> WeakFrameManager {
        WeakFrameManager {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// The session currently driving the main frame.
    pub fn client(&self) -> Arc<Session> {
        self.inner.client.read().clone()
    }

    pub fn network_manager(&self) -> &NetworkManager {
        &self.inner.network
    }

    pub fn main_frame(&self) -> Result<Arc<Frame>> {
        self.inner
            .frame_tree
            .get_main_frame()
            .ok_or_else(|| Error::FrameNotFound("main frame requested too early".to_string()))
    }

    pub fn frames(&self) -> Vec<Arc<Frame>> {
        self.inner.frame_tree.frames()
    }

    pub fn frame(&self, frame_id: &str) -> Option<Arc<Frame>> {
        self.inner.frame_tree.get_by_id(frame_id)
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<FrameManagerEvent> {
        self.inner.emitter.subscribe()
    }

    /// Per-session device prompt manager, created on first use.
    pub fn device_request_prompt_manager(
        &self,
        session: &Arc<Session>,
    ) -> Arc<DeviceRequestPromptManager> {
        let mut managers = self.inner.device_prompt_managers.lock();
        Arc::clone(
            managers
                .entry(session.id().to_string())
                .or_insert_with(|| Arc::new(DeviceRequestPromptManager::new(session))),
        )
    }

    /// Fetch the authoritative frame-tree snapshot and enable the event
    /// domains on `client`. All live handlers queue behind the snapshot
    /// gate until the replay completes. Target-closed failures are
    /// swallowed — the target may legitimately die mid-handshake.
    pub async fn initialize(&self, client: &Arc<Session>) -> Result<()> {
        self.inner.rearm_gate();

        let inner = &self.inner;
        let result: Result<()> = async {
            let (network, page_enable, tree, lifecycle, runtime) = tokio::join!(
                inner.network.add_client(client),
                client.send("Page.enable", None),
                async {
                    let reply = client.send("Page.getFrameTree", None).await?;
                    let snapshot: FrameTreeSnapshot =
                        serde_json::from_value(reply["frameTree"].clone())
                            .map_err(Error::json)?;
                    inner.handle_frame_tree(client, &snapshot).await;
                    inner.release_gate();
                    Ok::<(), Error>(())
                },
                client.send(
                    "Page.setLifecycleEventsEnabled",
                    Some(serde_json::json!({ "enabled": true })),
                ),
                async {
                    client.send("Runtime.enable", None).await?;
                    inner.create_isolated_world(client, UTILITY_WORLD_NAME).await
                },
            );
            network?;
            page_enable?;
            tree?;
            lifecycle?;
            runtime?;
            Ok(())
        }
        .await;

        if let Err(err) = result {
            // Never leave the gate armed; queued events must not hang.
            self.inner.release_gate();
            if err.is_target_closed() {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    /// Adopt the session of an iframe that moved out of process: rebind the
    /// frame's client and initialize the new session into this manager.
    pub fn on_attached_to_target(&self, target: &Arc<Target>) {
        if target.kind() != TargetType::Iframe {
            return;
        }
        let Some(session) = target.session() else {
            return;
        };
        if let Some(frame) = self.inner.frame_tree.get_by_id(&target.target_id()) {
            frame.update_client(Arc::clone(&session));
        }
        self.inner.setup_event_listeners(&session);
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(err) = manager.initialize(&session).await {
                tracing::warn!("OOP iframe initialization failed: {err}");
            }
        });
    }

    /// Activation of a prerendered page: the target keeps its identity but
    /// a new session takes over. Rebind the main frame in place — the
    /// controller's `Frame` handle stays valid — and re-run initialization
    /// against the new session.
    pub async fn swap_frame_tree(&self, client: Arc<Session>) -> Result<()> {
        *self.inner.client.write() = Arc::clone(&client);

        let frame = self.inner.frame_tree.get_main_frame();
        if let Some(frame) = &frame {
            match client.target() {
                Some(target) => {
                    let target_id = target.target_id();
                    // The upcoming snapshot replay must not re-apply a stale
                    // navigation for the swapped-in frame.
                    self.inner
                        .frame_navigated_received
                        .lock()
                        .insert(target_id.clone());
                    self.inner.frame_tree.remove_frame(frame);
                    frame.update_id(&target_id);
                    self.inner.frame_tree.add_frame(Arc::clone(frame));
                    frame.update_client(Arc::clone(&client));
                }
                None => {
                    tracing::warn!("activated session has no target; keeping old main frame id");
                    frame.update_client(Arc::clone(&client));
                }
            }
        }

        self.inner.setup_event_listeners(&client);
        self.inner.watch_disconnect(&client);
        self.initialize(&client).await?;
        self.inner.network.add_client(&client).await?;
        if let Some(frame) = frame {
            frame.emitter().emit(FrameEvent::SwappedByActivation);
        }
        Ok(())
    }

    /// Let the network layer see a speculative (prerender) session before
    /// it is activated. The session may vanish at any time, so failures are
    /// logged, not raised.
    pub async fn register_speculative_session(&self, client: &Arc<Session>) {
        if let Err(err) = self.inner.network.add_client(client).await {
            tracing::debug!("speculative session registration failed: {err}");
        }
    }
}

impl FrameManagerInner {
    fn rearm_gate(&self) {
        let mut gate = self.frame_tree_handled.lock();
        // Release anything still queued behind the previous gate before
        // arming a fresh one.
        gate.resolve(());
        *gate = Deferred::new();
    }

    fn release_gate(&self) {
        self.frame_tree_handled.lock().resolve(());
    }

    fn current_gate(&self) -> Deferred<()> {
        self.frame_tree_handled.lock().clone()
    }

    /// Wire a session's event stream into the intake queue. The closure
    /// runs synchronously on the dispatch path: the navigated-dedup set
    /// must reflect arrival order relative to the snapshot reply, which
    /// flows through the same dispatch.
    fn setup_event_listeners(self: &Arc<Self>, session: &Arc<Session>) {
        if !self
            .listened_sessions
            .lock()
            .insert(session.id().to_string())
        {
            return;
        }
        let weak = Arc::downgrade(self);
        let weak_session = Arc::downgrade(session);
        session.emitter().on(move |event| {
            let (Some(inner), Some(session)) = (weak.upgrade(), weak_session.upgrade()) else {
                return;
            };
            if let SessionEvent::Event(event) = event {
                if let CdpEvent::FrameNavigated { frame, .. } = &**event {
                    inner
                        .frame_navigated_received
                        .lock()
                        .insert(frame.id.clone());
                }
                if is_frame_event(event) {
                    let _ = inner.intake_tx.send((session, Arc::clone(event)));
                }
            }
        });
    }

    /// A disconnect of the driving session usually precedes an activation
    /// swap; defer teardown until the swap window closes.
    fn watch_disconnect(self: &Arc<Self>, session: &Arc<Session>) {
        let weak = Arc::downgrade(self);
        session.emitter().on(move |event| {
            if matches!(event, SessionEvent::Disconnected) {
                if let Some(inner) = weak.upgrade() {
                    tokio::spawn(async move { inner.on_client_disconnect().await });
                }
            }
        });
    }

    async fn run_worker(
        inner: Weak<FrameManagerInner>,
        mut intake: mpsc::UnboundedReceiver<(Arc<Session>, Arc<CdpEvent>)>,
    ) {
        while let Some((session, event)) = intake.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            // Queue behind the snapshot replay; a rejected gate (never the
            // normal case) must not wedge the stream.
            let _ = inner.current_gate().wait().await;
            inner.handle_event(&session, &event);
        }
    }

    fn handle_event(self: &Arc<Self>, session: &Arc<Session>, event: &CdpEvent) {
        match event {
            CdpEvent::FrameAttached {
                frame_id,
                parent_frame_id,
            } => self.on_frame_attached(session, frame_id, parent_frame_id),
            CdpEvent::FrameNavigated {
                frame,
                navigation_type,
            } => {
                // The apply step may need to wait for a frame that is still
                // in this queue (attach behind navigate); run it off-queue
                // so the wait cannot deadlock the stream.
                let inner = Arc::clone(self);
                let frame = frame.clone();
                let navigation_type = *navigation_type;
                tokio::spawn(async move {
                    if let Err(err) = inner.on_frame_navigated(frame, navigation_type).await {
                        tracing::debug!("frame navigation dropped: {err}");
                    }
                });
            }
            CdpEvent::NavigatedWithinDocument { frame_id, url } => {
                self.on_navigated_within_document(frame_id, url)
            }
            CdpEvent::FrameDetached { frame_id, reason } => {
                self.on_frame_detached(frame_id, *reason)
            }
            CdpEvent::FrameStartedLoading { frame_id } => self.on_frame_started_loading(frame_id),
            CdpEvent::FrameStoppedLoading { frame_id } => self.on_frame_stopped_loading(frame_id),
            CdpEvent::LifecycleEvent {
                frame_id,
                loader_id,
                name,
            } => self.on_lifecycle_event(frame_id, loader_id, name),
            CdpEvent::ExecutionContextCreated { context } => {
                self.on_execution_context_created(session, context)
            }
            CdpEvent::ExecutionContextDestroyed {
                execution_context_id,
            } => self.on_execution_context_destroyed(session, *execution_context_id),
            CdpEvent::ExecutionContextsCleared {} => self.on_execution_contexts_cleared(session),
            _ => {}
        }
    }

    /// Replay the snapshot: attach parents before children, and apply the
    /// snapshot's navigation only for frames the live stream has not
    /// already reported.
    async fn handle_frame_tree(
        self: &Arc<Self>,
        session: &Arc<Session>,
        snapshot: &FrameTreeSnapshot,
    ) {
        if let Some(parent_id) = &snapshot.frame.parent_id {
            self.on_frame_attached(session, &snapshot.frame.id, parent_id);
        }
        if !self
            .frame_navigated_received
            .lock()
            .remove(&snapshot.frame.id)
        {
            if let Err(err) = self
                .on_frame_navigated(snapshot.frame.clone(), NavigationType::Navigation)
                .await
            {
                tracing::debug!("snapshot navigation dropped: {err}");
            }
        }
        let Some(children) = &snapshot.child_frames else {
            return;
        };
        for child in children {
            Box::pin(self.handle_frame_tree(session, child)).await;
        }
    }

    fn on_frame_attached(self: &Arc<Self>, session: &Arc<Session>, frame_id: &str, parent_frame_id: &str) {
        if let Some(frame) = self.frame_tree.get_by_id(frame_id) {
            // An OOP iframe becoming in-process again attaches to the page
            // before its old target goes away; just take the client back.
            if self.is_oop_frame(&frame) {
                frame.update_client(Arc::clone(session));
            }
            return;
        }
        let frame = Frame::new(frame_id, Some(parent_frame_id), Arc::clone(session));
        self.frame_tree.add_frame(Arc::clone(&frame));
        self.emitter.emit(FrameManagerEvent::FrameAttached(frame));
    }

    async fn on_frame_navigated(
        self: &Arc<Self>,
        payload: FramePayload,
        _navigation_type: NavigationType,
    ) -> Result<()> {
        let frame_id = payload.id.clone();
        let is_main = payload.parent_id.is_none();

        let existing = if is_main {
            // Main frame is matched as the tree's root, not by id: a
            // cross-process navigation reassigns the id while the logical
            // frame (and the controller's handle to it) lives on.
            self.frame_tree
                .get_main_frame()
                .or_else(|| self.frame_tree.get_by_id(&frame_id))
        } else {
            self.frame_tree.get_by_id(&frame_id)
        };

        // A committed navigation invalidates the previous document's
        // subtree even if same-id frames reattach later.
        if let Some(frame) = &existing {
            for child in self.frame_tree.child_frames(&frame.id()) {
                self.remove_frames_recursively(&child);
            }
        }

        if is_main {
            match existing {
                Some(frame) => {
                    self.frame_tree.remove_frame(&frame);
                    frame.update_id(&frame_id);
                    self.frame_tree.add_frame(frame);
                }
                None => {
                    let frame = Frame::new(&frame_id, None, self.client.read().clone());
                    self.frame_tree.add_frame(frame);
                }
            }
        }

        // The frame may not exist yet when navigate outruns attach; wait
        // for the attach handler to insert it.
        let frame = self.frame_tree.wait_for_frame(&frame_id).await?;
        frame.navigated(&payload);
        self.emitter
            .emit(FrameManagerEvent::FrameNavigated(Arc::clone(&frame)));
        frame.emitter().emit(FrameEvent::Navigated);
        Ok(())
    }

    fn on_navigated_within_document(&self, frame_id: &str, url: &str) {
        let Some(frame) = self.frame_tree.get_by_id(frame_id) else {
            return;
        };
        frame.navigated_within_document(url);
        frame.emitter().emit(FrameEvent::NavigatedWithinDocument);
        self.emitter
            .emit(FrameManagerEvent::FrameNavigated(Arc::clone(&frame)));
        frame.emitter().emit(FrameEvent::Navigated);
    }

    fn on_frame_detached(self: &Arc<Self>, frame_id: &str, reason: DetachReason) {
        let Some(frame) = self.frame_tree.get_by_id(frame_id) else {
            return;
        };
        match reason {
            DetachReason::Remove => self.remove_frames_recursively(&frame),
            DetachReason::Swap => {
                // The node survives; ownership of this id's events moves to
                // another session, which will attach it there.
                self.emitter
                    .emit(FrameManagerEvent::FrameSwapped(Arc::clone(&frame)));
                frame.emitter().emit(FrameEvent::Swapped);
            }
            DetachReason::Other => {
                tracing::debug!("ignoring frame detach with unknown reason for {frame_id}");
            }
        }
    }

    fn on_frame_started_loading(&self, frame_id: &str) {
        if let Some(frame) = self.frame_tree.get_by_id(frame_id) {
            frame.on_loading_started();
        }
    }

    fn on_frame_stopped_loading(&self, frame_id: &str) {
        if let Some(frame) = self.frame_tree.get_by_id(frame_id) {
            frame.on_loading_stopped();
            self.emitter
                .emit(FrameManagerEvent::LifecycleEvent(Arc::clone(&frame)));
            frame.emitter().emit(FrameEvent::LifecycleEvent);
        }
    }

    fn on_lifecycle_event(&self, frame_id: &str, loader_id: &str, name: &str) {
        if let Some(frame) = self.frame_tree.get_by_id(frame_id) {
            frame.on_lifecycle_event(loader_id, name);
            self.emitter
                .emit(FrameManagerEvent::LifecycleEvent(Arc::clone(&frame)));
            frame.emitter().emit(FrameEvent::LifecycleEvent);
        }
    }

    fn on_execution_context_created(
        &self,
        session: &Arc<Session>,
        context: &ContextDescription,
    ) {
        let frame_id = context
            .aux_data
            .as_ref()
            .and_then(|aux| aux.frame_id.clone());
        let frame = frame_id.and_then(|id| self.frame_tree.get_by_id(&id));
        let Some(frame) = frame else {
            // Not a frame realm (worker scope, extension); not ours to track.
            return;
        };
        // A context from a session that no longer hosts the frame is stale:
        // multiple sessions can race around a swap.
        if frame.client().id() != session.id() {
            return;
        }

        let is_default = context
            .aux_data
            .as_ref()
            .map(|aux| aux.is_default)
            .unwrap_or(false);
        let kind = if is_default {
            WorldKind::Main
        } else if context.name == UTILITY_WORLD_NAME {
            WorldKind::Utility
        } else {
            return;
        };

        let world = match kind {
            WorldKind::Main => frame.main_world(),
            WorldKind::Utility => frame.utility_world(),
        };
        world.set_context(ExecutionContext::new(context.id, session));
        self.contexts.lock().insert(
            (session.id().to_string(), context.id),
            (frame.id(), kind),
        );
    }

    fn on_execution_context_destroyed(
        &self,
        session: &Arc<Session>,
        context_id: ExecutionContextId,
    ) {
        let entry = self
            .contexts
            .lock()
            .remove(&(session.id().to_string(), context_id));
        let Some((frame_id, kind)) = entry else {
            return;
        };
        let Some(frame) = self.frame_tree.get_by_id(&frame_id) else {
            return;
        };
        let world = match kind {
            WorldKind::Main => frame.main_world(),
            WorldKind::Utility => frame.utility_world(),
        };
        world.clear_context_if(context_id);
    }

    fn on_execution_contexts_cleared(&self, session: &Arc<Session>) {
        let drained: Vec<((SessionId, ExecutionContextId), (FrameId, WorldKind))> = {
            let mut contexts = self.contexts.lock();
            let keys: Vec<_> = contexts
                .keys()
                .filter(|(session_id, _)| session_id == session.id())
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| contexts.remove(&key).map(|value| (key, value)))
                .collect()
        };
        for ((_, context_id), (frame_id, kind)) in drained {
            if let Some(frame) = self.frame_tree.get_by_id(&frame_id) {
                let world = match kind {
                    WorldKind::Main => frame.main_world(),
                    WorldKind::Utility => frame.utility_world(),
                };
                world.clear_context_if(context_id);
            }
        }
    }

    fn remove_frames_recursively(self: &Arc<Self>, frame: &Arc<Frame>) {
        for child in self.frame_tree.child_frames(&frame.id()) {
            self.remove_frames_recursively(&child);
        }
        frame.dispose();
        self.frame_tree.remove_frame(frame);
        self.emitter
            .emit(FrameManagerEvent::FrameDetached(Arc::clone(frame)));
        frame.emitter().emit(FrameEvent::Detached);
    }

    /// The driving session disconnected. Child frames cannot survive a
    /// session swap, so drop them now; give the main frame a short window
    /// to be swapped in by an activation before tearing it down too.
    async fn on_client_disconnect(self: Arc<Self>) {
        let Some(main_frame) = self.frame_tree.get_main_frame() else {
            return;
        };
        for child in self.frame_tree.child_frames(&main_frame.id()) {
            self.remove_frames_recursively(&child);
        }

        let swapped = Deferred::<()>::new();
        let signal = swapped.clone();
        main_frame.emitter().on(move |event| {
            if matches!(event, FrameEvent::SwappedByActivation) {
                signal.resolve(());
            }
        });
        if tokio::time::timeout(TIME_FOR_WAITING_FOR_SWAP, swapped.wait())
            .await
            .is_err()
        {
            self.remove_frames_recursively(&main_frame);
        }
    }

    fn is_oop_frame(&self, frame: &Arc<Frame>) -> bool {
        frame.client().id() != self.client.read().id()
    }

    /// Install the utility world for new documents and create it in every
    /// frame the session currently hosts. Individual frames may vanish
    /// mid-flight; those failures are races, not errors.
    async fn create_isolated_world(
        self: &Arc<Self>,
        session: &Arc<Session>,
        name: &str,
    ) -> Result<()> {
        let key = format!("{}:{}", session.id(), name);
        if self.isolated_worlds.lock().contains(&key) {
            return Ok(());
        }

        session
            .send(
                "Page.addScriptToEvaluateOnNewDocument",
                Some(serde_json::json!({
                    "source": format!("//# sourceURL={INTERNAL_URL}"),
                    "worldName": name,
                })),
            )
            .await?;

        let frames: Vec<Arc<Frame>> = self
            .frame_tree
            .frames()
            .into_iter()
            .filter(|frame| frame.client().id() == session.id())
            .collect();
        for frame in frames {
            let result = session
                .send(
                    "Page.createIsolatedWorld",
                    Some(serde_json::json!({
                        "frameId": frame.id(),
                        "worldName": name,
                        "grantUniveralAccess": true,
                    })),
                )
                .await;
            if let Err(err) = result {
                tracing::debug!("isolated world creation raced frame teardown: {err}");
            }
        }

        self.isolated_worlds.lock().insert(key);
        Ok(())
    }
}

fn is_frame_event(event: &CdpEvent) -> bool {
    matches!(
        event,
        CdpEvent::FrameAttached { .. }
            | CdpEvent::FrameNavigated { .. }
            | CdpEvent::NavigatedWithinDocument { .. }
            | CdpEvent::FrameDetached { .. }
            | CdpEvent::FrameStartedLoading { .. }
            | CdpEvent::FrameStoppedLoading { .. }
            | CdpEvent::LifecycleEvent { .. }
            | CdpEvent::ExecutionContextCreated { .. }
            | CdpEvent::ExecutionContextDestroyed { .. }
            | CdpEvent::ExecutionContextsCleared {}
    )
}
