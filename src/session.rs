use tracing::{debug, warn};

use crate::error::FetchError;
use crate::model::SessionInfo;

#[derive(Clone, Debug)]
pub struct SessionReply {
    pub result: Result<SessionInfo, FetchError>,
}

/// Who the user is, asked once per process.
#[derive(Debug, Default)]
pub struct SessionGate {
    requested: bool,
    info: Option<SessionInfo>,
}

impl SessionGate {
    /// True the first time only; later calls reuse the memoized answer.
    pub fn request(&mut self) -> bool {
        if self.requested {
            return false;
        }
        self.requested = true;
        true
    }

    pub fn apply_reply(&mut self, reply: SessionReply) {
        let info = match reply.result {
            Ok(info) => info,
            Err(err) => {
                warn!("session lookup failed, treating as anonymous: {err}");
                SessionInfo::default()
            }
        };
        debug!(
            "session authenticated={} groups={}",
            info.is_authenticated,
            info.groups.len()
        );
        self.info = Some(info);
    }

    pub fn is_known(&self) -> bool {
        self.info.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.info.as_ref().is_some_and(|info| info.is_authenticated)
    }

    pub fn user_groups(&self) -> &[String] {
        self.info
            .as_ref()
            .map(|info| info.groups.as_slice())
            .unwrap_or(&[])
    }
}
