use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::Activity;

/// Read-only access to activity reference data.
#[async_trait]
pub trait ActivityLookup: Send + Sync {
    /// Fails with `NotFound` for an unknown id.
    async fn get_activity(&self, id: Ulid) -> Result<Activity, EngineError>;
}

/// Resolve ids in order, stopping at the first unknown one.
pub async fn resolve_activities(
    lookup: &dyn ActivityLookup,
    ids: &[Ulid],
) -> Result<Vec<Activity>, EngineError> {
    let mut activities = Vec::with_capacity(ids.len());
    for id in ids {
        activities.push(lookup.get_activity(*id).await?);
    }
    Ok(activities)
}

#[derive(Default)]
pub struct InMemoryCatalog {
    activities: DashMap<Ulid, Activity>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, activity: Activity) -> Option<Activity> {
        self.activities.insert(activity.id, activity)
    }

    pub fn remove(&self, id: &Ulid) -> Option<Activity> {
        self.activities.remove(id).map(|(_, a)| a)
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

impl FromIterator<Activity> for InMemoryCatalog {
    fn from_iter<I: IntoIterator<Item = Activity>>(iter: I) -> Self {
        let catalog = InMemoryCatalog::new();
        for activity in iter {
            catalog.insert(activity);
        }
        catalog
    }
}

#[async_trait]
impl ActivityLookup for InMemoryCatalog {
    async fn get_activity(&self, id: Ulid) -> Result<Activity, EngineError> {
        self.activities
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(id))
    }
}
