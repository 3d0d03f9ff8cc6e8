// Page: the controller-facing surface for one page-like target.
//
// Owns the frame manager for its target's session and wires the two
// session-level signals the manager cannot see on its own: child iframe
// sessions becoming ready (OOP adoption) and prerender activation swaps.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::frame_manager::{FrameManager, FrameManagerEvent};
use crate::session::{Session, SessionEvent};
use crate::target::Target;

pub struct Page {
    target: Arc<Target>,
    client: Arc<Session>,
    frame_manager: FrameManager,
}

impl Page {
    /// Build a page over an attached target and run the frame-manager
    /// handshake. The target must have a live session.
    pub async fn create(target: Arc<Target>) -> Result<Page> {
        let Some(session) = target.session() else {
            return Err(Error::TargetClosed(format!(
                "target {} has no session",
                target.target_id()
            )));
        };

        let frame_manager = FrameManager::new(Arc::clone(&session));

        // An iframe that moved out of process gets its own session; adopt
        // it into this page's frame tree once its handshake completes.
        let weak_manager = frame_manager.downgrade();
        session.emitter().on(move |event| {
            if let SessionEvent::Ready(child) = event {
                let Some(manager) = weak_manager.upgrade() else {
                    return;
                };
                if let Some(child_target) = child.target() {
                    manager.on_attached_to_target(&child_target);
                }
            }
        });

        // A prerendered page activating swaps the driving session while the
        // controller's Page and Frame handles live on.
        let weak_manager = frame_manager.downgrade();
        session.emitter().on(move |event| {
            if let SessionEvent::Swapped(new_session) = event {
                let Some(manager) = weak_manager.upgrade() else {
                    return;
                };
                let new_session = Arc::clone(new_session);
                tokio::spawn(async move {
                    if let Err(err) = manager.swap_frame_tree(new_session).await {
                        tracing::warn!("frame tree swap failed: {err}");
                    }
                });
            }
        });

        frame_manager.initialize(&session).await?;

        Ok(Page {
            target,
            client: session,
            frame_manager,
        })
    }

    pub fn target(&self) -> &Arc<Target> {
        &self.target
    }

    /// The session driving the page at creation time. After an activation
    /// swap, `frame_manager().client()` is the live one.
    pub fn client(&self) -> &Arc<Session> {
        &self.client
    }

    pub fn frame_manager(&self) -> &FrameManager {
        &self.frame_manager
    }

    pub fn main_frame(&self) -> Result<Arc<Frame>> {
        self.frame_manager.main_frame()
    }

    pub fn frames(&self) -> Vec<Arc<Frame>> {
        self.frame_manager.frames()
    }

    pub fn frame(&self, frame_id: &str) -> Option<Arc<Frame>> {
        self.frame_manager.frame(frame_id)
    }

    /// Frame lifecycle events for this page.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<FrameManagerEvent> {
        self.frame_manager.subscribe()
    }

    /// Navigate the main frame.
    pub async fn goto(&self, url: &str) -> Result<Value> {
        let client = self.frame_manager.client();
        client
            .send("Page.navigate", Some(serde_json::json!({ "url": url })))
            .await
    }

    /// Evaluate in the main frame's main world.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        self.main_frame()?.evaluate(expression).await
    }
}
