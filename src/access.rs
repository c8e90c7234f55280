//! Authorization for investigation-scoped operations
//!
//! Every engine call carries a [`Caller`]. One [`AccessPolicy`] decides
//! whether that caller may touch a given investigation; the engine evaluates
//! it before any read or write.

use serde::{Deserialize, Serialize};

use crate::investigation::Investigation;

/// The authenticated principal making a request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: String,
}

impl Caller {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

pub trait AccessPolicy: Send + Sync {
    fn permits(&self, investigation: &Investigation, caller: &Caller) -> bool;
}

/// Only the owning user may read or write an investigation
#[derive(Debug, Default, Clone, Copy)]
pub struct OwnerOnly;

impl AccessPolicy for OwnerOnly {
    fn permits(&self, investigation: &Investigation, caller: &Caller) -> bool {
        !caller.user_id.is_empty() && investigation.owner_id == caller.user_id
    }
}

impl<F> AccessPolicy for F
where
    F: Fn(&Investigation, &Caller) -> bool + Send + Sync,
{
    fn permits(&self, investigation: &Investigation, caller: &Caller) -> bool {
        self(investigation, caller)
    }
}
