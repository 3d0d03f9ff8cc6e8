// Target entity: one debuggable thing the browser exposes (tab, worker,
// iframe target, the browser itself).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::deferred::Deferred;
use crate::message::{TargetId, TargetInfo};
use crate::session::Session;

/// Closed set of target types the protocol reports. Unknown strings map to
/// `Other` so a newer browser cannot produce an unrepresentable target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Page,
    BackgroundPage,
    ServiceWorker,
    SharedWorker,
    Browser,
    Webview,
    Tab,
    Iframe,
    Worker,
    #[serde(other)]
    Other,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Page => "page",
            TargetType::BackgroundPage => "background_page",
            TargetType::ServiceWorker => "service_worker",
            TargetType::SharedWorker => "shared_worker",
            TargetType::Browser => "browser",
            TargetType::Webview => "webview",
            TargetType::Tab => "tab",
            TargetType::Iframe => "iframe",
            TargetType::Worker => "worker",
            TargetType::Other => "other",
        }
    }
}

/// Terminal outcome of a target's attach handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializationStatus {
    Success,
    Aborted,
}

/// A browser-level target. Becomes available to controllers only after the
/// auto-attach handshake completes; see `TargetManager`.
pub struct Target {
    target_info: RwLock<TargetInfo>,
    session: Mutex<Option<Arc<Session>>>,
    child_targets: Mutex<HashMap<TargetId, Arc<Target>>>,
    /// Settles exactly once: Success or Aborted. Terminal thereafter.
    pub(crate) initialized: Deferred<InitializationStatus>,
    pub(crate) closed: Deferred<()>,
}

impl Target {
    pub(crate) fn new(target_info: TargetInfo, session: Option<Arc<Session>>) -> Arc<Target> {
        let target = Arc::new(Target {
            target_info: RwLock::new(target_info),
            session: Mutex::new(session.clone()),
            child_targets: Mutex::new(HashMap::new()),
            initialized: Deferred::new(),
            closed: Deferred::new(),
        });
        if let Some(session) = session {
            session.set_target(Arc::downgrade(&target));
        }
        target
    }

    pub fn target_id(&self) -> TargetId {
        self.target_info.read().target_id.clone()
    }

    pub fn kind(&self) -> TargetType {
        self.target_info.read().kind
    }

    pub fn url(&self) -> String {
        self.target_info.read().url.clone()
    }

    pub fn browser_context_id(&self) -> Option<String> {
        self.target_info.read().browser_context_id.clone()
    }

    /// Page subtype (e.g. "prerender"); a page with a subtype is not yet
    /// the primary page of its tab.
    pub fn subtype(&self) -> Option<String> {
        self.target_info.read().subtype.clone()
    }

    pub fn target_info(&self) -> TargetInfo {
        self.target_info.read().clone()
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.lock().clone()
    }

    pub(crate) fn set_session(&self, session: Arc<Session>) {
        *self.session.lock() = Some(session);
    }

    pub fn child_targets(&self) -> Vec<Arc<Target>> {
        self.child_targets.lock().values().cloned().collect()
    }

    pub(crate) fn add_child_target(&self, child: Arc<Target>) {
        self.child_targets.lock().insert(child.target_id(), child);
    }

    pub(crate) fn remove_child_target(&self, child: &Arc<Target>) {
        self.child_targets.lock().remove(&child.target_id());
    }

    /// Wait until the attach handshake reaches a terminal state.
    pub async fn initialized(&self) -> InitializationStatus {
        self.initialized
            .wait()
            .await
            .unwrap_or(InitializationStatus::Aborted)
    }

    pub(crate) fn is_initialized(&self) -> bool {
        matches!(
            self.initialized.value(),
            Some(Ok(InitializationStatus::Success))
        )
    }

    pub(crate) fn initialize(&self) {
        self.check_if_initialized();
    }

    pub(crate) fn abort_initialization(&self) {
        self.initialized.resolve(InitializationStatus::Aborted);
    }

    /// Fresh page targets report an empty URL until their first info
    /// change; hold off availability until there is something to show.
    fn check_if_initialized(&self) {
        if self.initialized.is_settled() {
            return;
        }
        let info = self.target_info.read();
        if info.kind != TargetType::Page || !info.url.is_empty() {
            drop(info);
            self.initialized.resolve(InitializationStatus::Success);
        }
    }

    pub(crate) fn target_info_changed(&self, target_info: TargetInfo) {
        *self.target_info.write() = target_info;
        self.check_if_initialized();
    }
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let info = self.target_info.read();
        f.debug_struct("Target")
            .field("target_id", &info.target_id)
            .field("type", &info.kind)
            .field("url", &info.url)
            .finish()
    }
}
