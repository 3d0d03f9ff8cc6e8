// Device-request prompt collaborator seam.
//
// Prompt handling itself is out of scope; what the core guarantees is one
// manager per session, created lazily by the frame manager, so a prompt
// raised on an OOP iframe's session is observed on that session and not
// on the page's.

use std::sync::{Arc, Weak};

use crate::error::Result;
use crate::message::SessionId;
use crate::session::Session;

pub struct DeviceRequestPromptManager {
    session: Weak<Session>,
    session_id: SessionId,
}

impl DeviceRequestPromptManager {
    pub(crate) fn new(session: &Arc<Session>) -> Self {
        Self {
            session: Arc::downgrade(session),
            session_id: session.id().to_string(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Enable prompt events on the owning session.
    pub async fn enable(&self) -> Result<()> {
        let Some(session) = self.session.upgrade() else {
            return Err(crate::error::Error::ConnectionClosed);
        };
        session.send("DeviceAccess.enable", None).await?;
        Ok(())
    }
}
