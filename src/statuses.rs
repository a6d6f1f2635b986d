use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::StatusNames;
use crate::errors::{LoanError, Result};
use crate::events::{Event, EventLog};
use crate::ports::{RepositoryError, StatusRepository};
use crate::types::{Status, StatusId};

/// find-or-create for the canonical pending-review status
///
/// No in-process locking: concurrent creators are arbitrated by the unique
/// name constraint of the store, and the loser re-reads the winner's row.
#[derive(Clone)]
pub struct StatusResolver {
    statuses: Arc<dyn StatusRepository>,
    names: StatusNames,
    attempts: u32,
    events: EventLog,
}

impl StatusResolver {
    pub fn new(
        statuses: Arc<dyn StatusRepository>,
        names: StatusNames,
        attempts: u32,
        events: EventLog,
    ) -> Self {
        Self {
            statuses,
            names,
            attempts: attempts.max(1),
            events,
        }
    }

    pub fn names(&self) -> &StatusNames {
        &self.names
    }

    pub async fn resolve_pending(&self) -> Result<Status> {
        let name = self.names.pending_review.as_str();
        let mut last_conflict = None;

        for attempt in 1..=self.attempts {
            if let Some(existing) = self.statuses.find_by_name(name).await? {
                return Ok(existing);
            }

            let draft = Status::new(name, self.names.pending_review_description.as_str());
            match self.statuses.save(draft).await {
                Ok(created) => {
                    info!(status_id = created.id, name, "pending review status created");
                    self.events.emit(Event::PendingStatusCreated {
                        status_id: created.id,
                        name: created.name.clone(),
                        timestamp: Utc::now(),
                    });
                    return Ok(created);
                }
                Err(conflict @ RepositoryError::Conflict { .. }) => {
                    debug!(attempt, name, "lost pending status creation race, re-reading");
                    last_conflict = Some(conflict);
                }
                Err(other) => return Err(other.into()),
            }
        }

        warn!(attempts = self.attempts, name, "pending status still unresolved after conflicts");
        Err(match last_conflict {
            Some(conflict) => conflict.into(),
            None => LoanError::StatusNotFound {
                reference: name.to_string(),
            },
        })
    }
}

/// maintenance of status reference data
#[derive(Clone)]
pub struct StatusCatalog {
    statuses: Arc<dyn StatusRepository>,
}

impl StatusCatalog {
    pub fn new(statuses: Arc<dyn StatusRepository>) -> Self {
        Self { statuses }
    }

    /// create a status; names are unique
    pub async fn create(&self, status: Status) -> Result<Status> {
        if self.statuses.exists_by_name(&status.name).await? {
            return Err(LoanError::DuplicateStatusName { name: status.name });
        }
        let name = status.name.clone();
        let saved = self.statuses.save(status).await.map_err(|err| duplicate_or(err, &name))?;
        info!(status_id = saved.id, name = %saved.name, "status created");
        Ok(saved)
    }

    pub async fn get(&self, id: StatusId) -> Result<Status> {
        self.statuses
            .find_by_id(id)
            .await?
            .ok_or_else(|| LoanError::StatusNotFound {
                reference: format!("id {id}"),
            })
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Status> {
        self.statuses
            .find_by_name(name)
            .await?
            .ok_or_else(|| LoanError::StatusNotFound {
                reference: name.to_string(),
            })
    }

    pub async fn list(&self) -> Result<Vec<Status>> {
        Ok(self.statuses.find_all().await?)
    }

    pub async fn update(&self, status: Status) -> Result<Status> {
        self.get(status.id).await?;
        let name = status.name.clone();
        self.statuses.save(status).await.map_err(|err| duplicate_or(err, &name))
    }

    pub async fn delete(&self, id: StatusId) -> Result<()> {
        Ok(self.statuses.delete_by_id(id).await?)
    }
}

fn duplicate_or(err: RepositoryError, name: &str) -> LoanError {
    match err {
        RepositoryError::Conflict { .. } => LoanError::DuplicateStatusName {
            name: name.to_string(),
        },
        other => other.into(),
    }
}
