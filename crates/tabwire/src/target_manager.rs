// Target discovery and auto-attach.
//
// The browser is asked to auto-attach every qualifying target before the
// controller can race it; this manager tracks the handshake per target id
// (discovered -> attached-pending-init -> available | ignored | aborted)
// and exposes the surviving set. Top-level pages are excluded from the
// auto-attach filter — they are attached through the explicit
// `Connection::create_session` flow — so the same page is never attached
// twice through two mechanisms.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

use crate::connection::{Connection, ConnectionEvent};
use crate::deferred::Deferred;
use crate::error::Result;
use crate::events::EventEmitter;
use crate::message::{CdpEvent, SessionId, TargetId, TargetInfo};
use crate::session::{Session, SessionEvent};
use crate::target::{Target, TargetType};

/// User-supplied predicate deciding which targets the controller sees.
pub type TargetFilter = Arc<dyn Fn(&TargetInfo) -> bool + Send + Sync>;

/// Events emitted by the target manager.
#[derive(Clone)]
pub enum TargetEvent {
    /// A target was reported by the browser. Fires for every target,
    /// filtered or not.
    Discovered(TargetInfo),
    /// A target completed its attach handshake and is usable. Fires once
    /// per target id.
    Available(Arc<Target>),
    /// An available target went away.
    Gone(Arc<Target>),
    /// An initialized target's URL changed.
    Changed {
        target: Arc<Target>,
        previous_url: String,
    },
}

/// Where an attach/detach notification was observed: the root connection
/// or a parent session.
#[derive(Clone)]
enum AttachSource {
    Root,
    Session(Arc<Session>),
}

impl AttachSource {
    fn parent_target(&self) -> Option<Arc<Target>> {
        match self {
            AttachSource::Root => None,
            AttachSource::Session(session) => session.target(),
        }
    }
}

#[derive(Clone)]
pub struct TargetManager {
    inner: Arc<TargetManagerInner>,
}

struct TargetManagerInner {
    connection: Connection,
    /// Every target the browser has reported, by id. Filtering does not
    /// affect this map.
    discovered: Mutex<HashMap<TargetId, TargetInfo>>,
    /// Targets that have attached at least once.
    attached_by_target: Mutex<HashMap<TargetId, Arc<Target>>>,
    attached_by_session: Mutex<HashMap<SessionId, Arc<Target>>>,
    /// Filter-rejected targets; events about them keep arriving and are
    /// dropped here.
    ignored: Mutex<HashSet<TargetId>>,
    filter: Option<TargetFilter>,
    emitter: EventEmitter<TargetEvent>,
    /// Target ids still awaiting their first attach; `initialize` resolves
    /// once this drains.
    targets_for_init: Mutex<HashSet<TargetId>>,
    initialized: Deferred<()>,
    wait_for_initially_discovered: bool,
    listened_sessions: Mutex<HashSet<SessionId>>,
    disposed: AtomicBool,
    intake_tx: mpsc::UnboundedSender<(AttachSource, Arc<CdpEvent>)>,
}

impl TargetManager {
    pub fn new(connection: Connection, filter: Option<TargetFilter>) -> TargetManager {
        Self::with_options(connection, filter, true)
    }

    pub fn with_options(
        connection: Connection,
        filter: Option<TargetFilter>,
        wait_for_initially_discovered: bool,
    ) -> TargetManager {
        let (intake_tx, intake_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(TargetManagerInner {
            connection,
            discovered: Mutex::new(HashMap::new()),
            attached_by_target: Mutex::new(HashMap::new()),
            attached_by_session: Mutex::new(HashMap::new()),
            ignored: Mutex::new(HashSet::new()),
            filter,
            emitter: EventEmitter::new(),
            targets_for_init: Mutex::new(HashSet::new()),
            initialized: Deferred::new(),
            wait_for_initially_discovered,
            listened_sessions: Mutex::new(HashSet::new()),
            disposed: AtomicBool::new(false),
            intake_tx,
        });

        // Root-connection events feed the same serialized intake as
        // per-session attachment events.
        let weak = Arc::downgrade(&inner);
        inner.connection.emitter().on(move |event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.disposed.load(Ordering::SeqCst) {
                return;
            }
            if let ConnectionEvent::Event(event) = event {
                if is_target_event(event) {
                    let _ = inner.intake_tx.send((AttachSource::Root, Arc::clone(event)));
                }
            }
        });

        tokio::spawn(TargetManagerInner::run_worker(
            Arc::downgrade(&inner),
            intake_rx,
        ));

        TargetManager { inner }
    }

    /// Ask the browser to report targets and auto-attach to them, then wait
    /// until every target that existed at this moment has been given its
    /// chance to attach. After this resolves, enumerating targets cannot
    /// race the initial handshakes.
    pub async fn initialize(&self) -> Result<()> {
        let inner = &self.inner;
        inner
            .connection
            .send(
                "Target.setDiscoverTargets",
                Some(json!({ "discover": true, "filter": [{}] })),
            )
            .await?;

        inner.store_existing_targets_for_init();

        inner
            .connection
            .send(
                "Target.setAutoAttach",
                Some(json!({
                    "waitForDebuggerOnStart": true,
                    "flatten": true,
                    "autoAttach": true,
                    "filter": [
                        { "type": "page", "exclude": true },
                        {},
                    ],
                })),
            )
            .await?;

        inner.finish_initialization_if_ready(None);
        inner.initialized.wait().await
    }

    /// Targets that are attached and exposed, by id.
    pub fn available_targets(&self) -> Vec<Arc<Target>> {
        self.inner.attached_by_target.lock().values().cloned().collect()
    }

    pub fn target(&self, target_id: &str) -> Option<Arc<Target>> {
        self.inner.attached_by_target.lock().get(target_id).cloned()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TargetEvent> {
        self.inner.emitter.subscribe()
    }

    /// Stop reacting to protocol events. The session registry and browser
    /// state are left as they are.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
    }
}

impl TargetManagerInner {
    fn store_existing_targets_for_init(&self) {
        if !self.wait_for_initially_discovered {
            return;
        }
        let discovered = self.discovered.lock();
        let mut for_init = self.targets_for_init.lock();
        for (target_id, info) in discovered.iter() {
            // Browser targets and extensions never auto-attach; waiting on
            // them would wedge initialization.
            let skip_target = info.kind == TargetType::Browser
                || info.url.starts_with("chrome-extension://");
            let accepted = self.filter.as_ref().map(|f| f(info)).unwrap_or(true);
            if accepted && !skip_target {
                for_init.insert(target_id.clone());
            }
        }
    }

    fn finish_initialization_if_ready(&self, target_id: Option<&str>) {
        if let Some(target_id) = target_id {
            self.targets_for_init.lock().remove(target_id);
        }
        if self.targets_for_init.lock().is_empty() {
            self.initialized.resolve(());
        }
    }

    async fn run_worker(
        inner: Weak<TargetManagerInner>,
        mut intake: mpsc::UnboundedReceiver<(AttachSource, Arc<CdpEvent>)>,
    ) {
        while let Some((source, event)) = intake.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            if inner.disposed.load(Ordering::SeqCst) {
                continue;
            }
            match &*event {
                CdpEvent::TargetCreated { target_info } => inner.on_target_created(target_info),
                CdpEvent::TargetDestroyed { target_id } => inner.on_target_destroyed(target_id),
                CdpEvent::TargetInfoChanged { target_info } => {
                    inner.on_target_info_changed(target_info)
                }
                CdpEvent::AttachedToTarget {
                    session_id,
                    target_info,
                    ..
                } => {
                    inner
                        .on_attached_to_target(&source, session_id, target_info)
                        .await
                }
                CdpEvent::DetachedFromTarget { session_id } => {
                    inner.on_detached_from_target(&source, session_id)
                }
                _ => {}
            }
        }
    }

    fn on_target_created(&self, target_info: &TargetInfo) {
        self.discovered
            .lock()
            .insert(target_info.target_id.clone(), target_info.clone());
        self.emitter
            .emit(TargetEvent::Discovered(target_info.clone()));

        // The connection is already implicitly attached to the browser
        // target; no session will ever be announced for it.
        if target_info.kind == TargetType::Browser && target_info.attached {
            let mut attached = self.attached_by_target.lock();
            if attached.contains_key(&target_info.target_id) {
                return;
            }
            let target = Target::new(target_info.clone(), None);
            target.initialize();
            attached.insert(target_info.target_id.clone(), target);
        }
    }

    fn on_target_destroyed(&self, target_id: &str) {
        let target_info = self.discovered.lock().remove(target_id);
        self.finish_initialization_if_ready(Some(target_id));
        // Service workers detach silently right after attach, so their
        // destruction is the only moment to report them gone.
        if target_info.map(|info| info.kind) == Some(TargetType::ServiceWorker) {
            let target = self.attached_by_target.lock().remove(target_id);
            if let Some(target) = target {
                target.closed.resolve(());
                self.emitter.emit(TargetEvent::Gone(target));
            }
        }
    }

    fn on_target_info_changed(&self, target_info: &TargetInfo) {
        self.discovered
            .lock()
            .insert(target_info.target_id.clone(), target_info.clone());

        if self.ignored.lock().contains(&target_info.target_id) || !target_info.attached {
            return;
        }
        let Some(target) = self
            .attached_by_target
            .lock()
            .get(&target_info.target_id)
            .cloned()
        else {
            return;
        };

        let previous_url = target.url();
        let was_initialized = target.is_initialized();

        // A prerendered page becoming primary reuses the target but swaps
        // the driving session; tell the parent session first so listeners
        // can rebind before anyone uses the target again.
        if is_page_target_becoming_primary(&target, target_info) {
            if let Some(session) = target.session() {
                if let Some(parent) = session.parent_session() {
                    parent.emitter().emit(SessionEvent::Swapped(session));
                }
            } else {
                tracing::warn!("target being activated has no session");
            }
        }

        target.target_info_changed(target_info.clone());

        if was_initialized && previous_url != target.url() {
            self.emitter.emit(TargetEvent::Changed {
                target,
                previous_url,
            });
        }
    }

    async fn on_attached_to_target(
        self: &Arc<Self>,
        source: &AttachSource,
        session_id: &str,
        target_info: &TargetInfo,
    ) {
        let Some(session) = self.connection.session(session_id) else {
            // The connection creates the session before this event can be
            // observed here; missing means teardown raced us.
            tracing::warn!("attach notification for unknown session {session_id}");
            return;
        };

        if !self.connection.is_auto_attached(&target_info.target_id) {
            // Manual attach in flight via create_session; not ours.
            return;
        }

        // Being attached to a service worker pins its lifetime, so let it
        // run and detach again immediately, while still exposing a target.
        if target_info.kind == TargetType::ServiceWorker {
            self.finish_initialization_if_ready(Some(&target_info.target_id));
            self.silent_detach(source, &session).await;
            if self
                .attached_by_target
                .lock()
                .contains_key(&target_info.target_id)
            {
                return;
            }
            let target = Target::new(target_info.clone(), None);
            target.initialize();
            self.attached_by_target
                .lock()
                .insert(target_info.target_id.clone(), Arc::clone(&target));
            self.emitter.emit(TargetEvent::Available(target));
            return;
        }

        if let Some(filter) = &self.filter {
            if !filter(target_info) {
                self.ignored.lock().insert(target_info.target_id.clone());
                self.finish_initialization_if_ready(Some(&target_info.target_id));
                self.silent_detach(source, &session).await;
                return;
            }
        }

        let existing = self
            .attached_by_target
            .lock()
            .get(&target_info.target_id)
            .cloned();
        let is_existing = existing.is_some();
        let target = match existing {
            // Re-attachment (a second session to the same target) must not
            // re-fire availability; just link the new session.
            Some(target) => {
                session.set_target(Arc::downgrade(&target));
                self.attached_by_session
                    .lock()
                    .insert(session_id.to_string(), Arc::clone(&target));
                target
            }
            None => {
                let target = Target::new(target_info.clone(), Some(Arc::clone(&session)));
                target.initialize();
                self.attached_by_target
                    .lock()
                    .insert(target_info.target_id.clone(), Arc::clone(&target));
                self.attached_by_session
                    .lock()
                    .insert(session_id.to_string(), Arc::clone(&target));
                target
            }
        };

        self.setup_attachment_listeners(&session);

        if let Some(parent_target) = source.parent_target() {
            parent_target.add_child_target(Arc::clone(&target));
        }
        match source {
            AttachSource::Session(parent) => {
                parent.emitter().emit(SessionEvent::Ready(Arc::clone(&session)));
            }
            AttachSource::Root => {
                self.connection.inner().emit_ready(Arc::clone(&session));
            }
        }

        self.targets_for_init.lock().remove(&target_info.target_id);
        if !is_existing {
            self.emitter.emit(TargetEvent::Available(Arc::clone(&target)));
        }
        self.finish_initialization_if_ready(None);

        // Propagate auto-attach into the new session and release the
        // debugger pause. The target may already be shutting down; nothing
        // to do about failures here but log them.
        let (auto_attach, run) = tokio::join!(
            session.send(
                "Target.setAutoAttach",
                Some(json!({
                    "waitForDebuggerOnStart": true,
                    "flatten": true,
                    "autoAttach": true,
                    "filter": [{}],
                })),
            ),
            session.send("Runtime.runIfWaitingForDebugger", None),
        );
        for result in [auto_attach, run] {
            if let Err(err) = result {
                tracing::debug!("post-attach setup failed: {err}");
            }
        }
    }

    fn on_detached_from_target(&self, source: &AttachSource, session_id: &str) {
        let target = self.attached_by_session.lock().remove(session_id);
        let Some(target) = target else {
            return;
        };
        if let Some(parent_target) = source.parent_target() {
            parent_target.remove_child_target(&target);
        }
        self.attached_by_target.lock().remove(&target.target_id());
        target.abort_initialization();
        target.closed.resolve(());
        self.emitter.emit(TargetEvent::Gone(target));
    }

    /// Watch a session for attachments of its own children.
    fn setup_attachment_listeners(self: &Arc<Self>, session: &Arc<Session>) {
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
            if inner.disposed.load(Ordering::SeqCst) {
                return;
            }
            if let SessionEvent::Event(event) = event {
                if matches!(
                    &**event,
                    CdpEvent::AttachedToTarget { .. } | CdpEvent::DetachedFromTarget { .. }
                ) {
                    let _ = inner
                        .intake_tx
                        .send((AttachSource::Session(session), Arc::clone(event)));
                }
            }
        });
    }

    /// Detach a session the controller should never see. The target may be
    /// gone already; errors are logged, never raised.
    async fn silent_detach(&self, source: &AttachSource, session: &Arc<Session>) {
        if let Err(err) = session.send("Runtime.runIfWaitingForDebugger", None).await {
            tracing::debug!("runIfWaitingForDebugger during silent detach failed: {err}");
        }
        // Not `session.detach()`: the command must go through the parent,
        // not through the session being discarded.
        let params = Some(json!({ "sessionId": session.id() }));
        let result = match source {
            AttachSource::Session(parent) => {
                parent.send("Target.detachFromTarget", params).await
            }
            AttachSource::Root => {
                self.connection
                    .send("Target.detachFromTarget", params)
                    .await
            }
        };
        if let Err(err) = result {
            tracing::debug!("silent detach failed: {err}");
        }
    }
}

fn is_page_target_becoming_primary(target: &Arc<Target>, new_info: &TargetInfo) -> bool {
    target.subtype().is_some() && new_info.subtype.is_none()
}

fn is_target_event(event: &CdpEvent) -> bool {
    matches!(
        event,
        CdpEvent::TargetCreated { .. }
            | CdpEvent::TargetDestroyed { .. }
            | CdpEvent::TargetInfoChanged { .. }
            | CdpEvent::AttachedToTarget { .. }
            | CdpEvent::DetachedFromTarget { .. }
    )
}
