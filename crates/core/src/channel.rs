//! Channels: the addressable chat surfaces events and messages live in.

use crate::message::ChannelId;
use mc_common::ids::TenantId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A channel is either scoped to one project or visible across the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelKind {
    TenantWide,
    Project { project_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub tenant_id: TenantId,
    pub name: String,
    pub kind: ChannelKind,
}

impl Channel {
    /// A member may post or subscribe if the channel is tenant-wide, or if
    /// it's scoped to a project the member belongs to.
    pub fn accessible_by(&self, member_project_ids: &[Uuid]) -> bool {
        match self.kind {
            ChannelKind::TenantWide => true,
            ChannelKind::Project { project_id } => member_project_ids.contains(&project_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(kind: ChannelKind) -> Channel {
        Channel {
            id: ChannelId(Uuid::new_v4()),
            tenant_id: TenantId::new(),
            name: "general".to_string(),
            kind,
        }
    }

    #[test]
    fn tenant_wide_channel_is_always_accessible() {
        let c = channel(ChannelKind::TenantWide);
        assert!(c.accessible_by(&[]));
    }

    #[test]
    fn project_channel_requires_membership() {
        let project_id = Uuid::new_v4();
        let c = channel(ChannelKind::Project { project_id });
        assert!(!c.accessible_by(&[]));
        assert!(c.accessible_by(&[project_id]));
    }
}
