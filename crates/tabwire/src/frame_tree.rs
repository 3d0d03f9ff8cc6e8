// Ownership tree of frames, keyed by frame id.
//
// Attachment and navigation events can race across sessions, so a lookup
// for a frame that "should" exist may come up empty for a moment;
// `wait_for_frame` bridges that gap. There is no timeout at this layer —
// callers impose their own.

use std::collections::HashMap;

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::message::FrameId;

#[derive(Default)]
struct TreeState {
    frames: HashMap<FrameId, Arc<Frame>>,
    main_frame_id: Option<FrameId>,
    /// Child ids per parent, in insertion order.
    child_ids: HashMap<FrameId, Vec<FrameId>>,
    waiters: HashMap<FrameId, Vec<oneshot::Sender<Arc<Frame>>>>,
}

#[derive(Default)]
pub struct FrameTree {
    state: Mutex<TreeState>,
}

impl FrameTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a frame under its current id. A frame without a parent
    /// becomes the main frame. Pending `wait_for_frame` calls for this id
    /// resolve now.
    pub fn add_frame(&self, frame: Arc<Frame>) {
        let id = frame.id();
        let mut state = self.state.lock();
        state.frames.insert(id.clone(), Arc::clone(&frame));
        match frame.parent_id() {
            Some(parent_id) => {
                let children = state.child_ids.entry(parent_id).or_default();
                if !children.contains(&id) {
                    children.push(id.clone());
                }
            }
            None => {
                state.main_frame_id = Some(id.clone());
            }
        }
        if let Some(waiters) = state.waiters.remove(&id) {
            for waiter in waiters {
                let _ = waiter.send(Arc::clone(&frame));
            }
        }
    }

    /// Remove a frame by its current id. Children are not removed — the
    /// frame manager detaches subtrees recursively and calls this per node.
    pub fn remove_frame(&self, frame: &Arc<Frame>) {
        let id = frame.id();
        let mut state = self.state.lock();
        state.frames.remove(&id);
        state.child_ids.remove(&id);
        if let Some(parent_id) = frame.parent_id() {
            if let Some(children) = state.child_ids.get_mut(&parent_id) {
                children.retain(|child| child != &id);
            }
        } else if state.main_frame_id.as_deref() == Some(id.as_str()) {
            state.main_frame_id = None;
        }
    }

    pub fn get_by_id(&self, id: &str) -> Option<Arc<Frame>> {
        self.state.lock().frames.get(id).cloned()
    }

    pub fn get_main_frame(&self) -> Option<Arc<Frame>> {
        let state = self.state.lock();
        let id = state.main_frame_id.as_ref()?;
        state.frames.get(id).cloned()
    }

    /// Snapshot of every frame in the tree.
    pub fn frames(&self) -> Vec<Arc<Frame>> {
        self.state.lock().frames.values().cloned().collect()
    }

    /// Direct children of `id`, in attach order.
    pub fn child_frames(&self, id: &str) -> Vec<Arc<Frame>> {
        let state = self.state.lock();
        state
            .child_ids
            .get(id)
            .map(|children| {
                children
                    .iter()
                    .filter_map(|child| state.frames.get(child).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolve as soon as a frame with `id` is present: immediately if it
    /// already is, otherwise when `add_frame` inserts it.
    pub async fn wait_for_frame(&self, id: &str) -> Result<Arc<Frame>> {
        let rx = {
            let mut state = self.state.lock();
            if let Some(frame) = state.frames.get(id) {
                return Ok(Arc::clone(frame));
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.entry(id.to_string()).or_default().push(tx);
            rx
        };
        rx.await
            .map_err(|_| Error::FrameNotFound(id.to_string()))
    }
}
