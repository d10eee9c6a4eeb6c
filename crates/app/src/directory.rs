//! Group directory and admin list backed by the settings file.

use std::collections::HashSet;

use async_trait::async_trait;
use engine::{Authorizer, CollaboratorError, Directory, Group};

use crate::settings::GroupSettings;

/// The active groups listed in the settings.
pub struct ConfigDirectory {
    groups: Vec<Group>,
}

impl ConfigDirectory {
    pub fn new<'a>(groups: impl IntoIterator<Item = &'a GroupSettings>) -> Self {
        let groups: Vec<Group> = groups
            .into_iter()
            .filter(|group| group.active)
            .map(GroupSettings::to_group)
            .collect();
        let settleable = groups.iter().filter(|group| group.is_settleable()).count();
        tracing::info!(
            "{} active groups configured, {settleable} settled daily",
            groups.len()
        );
        Self { groups }
    }
}

#[async_trait]
impl Directory for ConfigDirectory {
    async fn list_active_groups(&self) -> Result<Vec<Group>, CollaboratorError> {
        Ok(self.groups.clone())
    }

    async fn group(&self, id: i64) -> Result<Option<Group>, CollaboratorError> {
        Ok(self.groups.iter().find(|group| group.id == id).cloned())
    }
}

pub struct AdminList {
    admins: HashSet<i64>,
}

impl AdminList {
    pub fn new(admins: impl IntoIterator<Item = i64>) -> Self {
        let admins: HashSet<i64> = admins.into_iter().collect();
        if admins.is_empty() {
            tracing::warn!("no admins configured, balance changes are disabled");
        }
        Self { admins }
    }
}

#[async_trait]
impl Authorizer for AdminList {
    async fn is_admin(&self, actor_id: i64) -> Result<bool, CollaboratorError> {
        Ok(self.admins.contains(&actor_id))
    }
}
