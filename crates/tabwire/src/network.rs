// Network collaborator seam.
//
// The frame manager registers every session it drives with the network
// manager so request interception and response tracking (out of scope
// here) see traffic from all of a page's sessions, including OOP iframes
// and speculative prerender sessions.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::message::SessionId;
use crate::session::Session;

#[derive(Default)]
pub struct NetworkManager {
    clients: Mutex<HashSet<SessionId>>,
}

impl NetworkManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable network tracking on a session. Adding the same session twice
    /// is a no-op; a page re-initializing after a swap must not re-enable.
    pub async fn add_client(&self, session: &Arc<Session>) -> Result<()> {
        if !self.clients.lock().insert(session.id().to_string()) {
            return Ok(());
        }
        session.send("Network.enable", None).await?;
        Ok(())
    }

    pub fn has_client(&self, session_id: &str) -> bool {
        self.clients.lock().contains(session_id)
    }
}
