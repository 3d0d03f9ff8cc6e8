// Frame entity.
//
// A frame's identity is the object, not its id: controllers hold
// `Arc<Frame>` handles that stay valid across navigations, cross-process
// swaps, and even the main-frame id reassignment that comes with a
// cross-process main-frame navigation. Everything mutable is rebindable
// in place.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::error::Result;
use crate::events::EventEmitter;
use crate::message::{FrameId, FramePayload};
use crate::session::Session;
use crate::world::{IsolatedWorld, WorldKind};

/// Events emitted by an individual frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    Navigated,
    NavigatedWithinDocument,
    Detached,
    Swapped,
    /// The frame was swapped in by a prerender activation; the manager's
    /// disconnect handling waits on this to distinguish a swap from a real
    /// teardown.
    SwappedByActivation,
    LifecycleEvent,
}

pub struct Frame {
    id: RwLock<FrameId>,
    parent_id: RwLock<Option<FrameId>>,
    client: RwLock<Arc<Session>>,
    url: RwLock<String>,
    name: RwLock<Option<String>>,
    loader_id: RwLock<String>,
    lifecycle_events: Mutex<HashSet<String>>,
    has_started_loading: AtomicBool,
    detached: AtomicBool,
    main_world: IsolatedWorld,
    utility_world: IsolatedWorld,
    emitter: EventEmitter<FrameEvent>,
}

impl Frame {
    pub(crate) fn new(
        id: &str,
        parent_id: Option<&str>,
        client: Arc<Session>,
    ) -> Arc<Frame> {
        Arc::new_cyclic(|weak| Frame {
            id: RwLock::new(id.to_string()),
            parent_id: RwLock::new(parent_id.map(str::to_string)),
            client: RwLock::new(client),
            url: RwLock::new(String::new()),
            name: RwLock::new(None),
            loader_id: RwLock::new(String::new()),
            lifecycle_events: Mutex::new(HashSet::new()),
            has_started_loading: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            main_world: IsolatedWorld::new(weak.clone(), WorldKind::Main),
            utility_world: IsolatedWorld::new(weak.clone(), WorldKind::Utility),
            emitter: EventEmitter::new(),
        })
    }

    pub fn id(&self) -> FrameId {
        self.id.read().clone()
    }

    pub fn parent_id(&self) -> Option<FrameId> {
        self.parent_id.read().clone()
    }

    pub fn is_main(&self) -> bool {
        self.parent_id.read().is_none()
    }

    pub fn url(&self) -> String {
        self.url.read().clone()
    }

    pub fn name(&self) -> Option<String> {
        self.name.read().clone()
    }

    pub fn loader_id(&self) -> String {
        self.loader_id.read().clone()
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    pub fn has_started_loading(&self) -> bool {
        self.has_started_loading.load(Ordering::SeqCst)
    }

    /// The session currently hosting this frame. Changes on cross-process
    /// swaps.
    pub fn client(&self) -> Arc<Session> {
        self.client.read().clone()
    }

    pub fn main_world(&self) -> &IsolatedWorld {
        &self.main_world
    }

    pub fn utility_world(&self) -> &IsolatedWorld {
        &self.utility_world
    }

    /// Lifecycle event names seen for the current document.
    pub fn lifecycle_events(&self) -> HashSet<String> {
        self.lifecycle_events.lock().clone()
    }

    pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<FrameEvent> {
        self.emitter.subscribe()
    }

    pub(crate) fn emitter(&self) -> &EventEmitter<FrameEvent> {
        &self.emitter
    }

    /// Evaluate in the frame's main world.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        self.main_world.evaluate(expression).await
    }

    /// Rebind to a new session (cross-process swap, OOP adoption).
    pub(crate) fn update_client(&self, client: Arc<Session>) {
        *self.client.write() = client;
    }

    /// Reassign the frame id; main frame only, on cross-process navigation.
    pub(crate) fn update_id(&self, id: &str) {
        *self.id.write() = id.to_string();
    }

    /// Apply a committed navigation payload.
    pub(crate) fn navigated(&self, payload: &FramePayload) {
        *self.name.write() = payload.name.clone();
        let mut url = payload.url.clone();
        if let Some(fragment) = &payload.url_fragment {
            url.push_str(fragment);
        }
        *self.url.write() = url;
        *self.loader_id.write() = payload.loader_id.clone();
    }

    pub(crate) fn navigated_within_document(&self, url: &str) {
        *self.url.write() = url.to_string();
    }

    pub(crate) fn on_loading_started(&self) {
        self.has_started_loading.store(true, Ordering::SeqCst);
    }

    pub(crate) fn on_loading_stopped(&self) {
        let mut events = self.lifecycle_events.lock();
        events.insert("DOMContentLoaded".to_string());
        events.insert("load".to_string());
    }

    /// "init" marks a new document for a new loader; it resets the set.
    pub(crate) fn on_lifecycle_event(&self, loader_id: &str, name: &str) {
        if name == "init" {
            *self.loader_id.write() = loader_id.to_string();
            self.lifecycle_events.lock().clear();
        }
        self.lifecycle_events.lock().insert(name.to_string());
    }

    /// Mark detached and tear down both worlds. In-flight evaluations fail
    /// instead of hanging.
    pub(crate) fn dispose(&self) {
        self.detached.store(true, Ordering::SeqCst);
        self.main_world.dispose();
        self.utility_world.dispose();
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("id", &*self.id.read())
            .field("parent_id", &*self.parent_id.read())
            .field("url", &*self.url.read())
            .field("detached", &self.is_detached())
            .finish()
    }
}
