use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{ApplicationId, ProductTypeId, StatusId};

/// lifecycle events emitted by the engine and the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    ApplicationCreated {
        application_id: ApplicationId,
        product_type_id: ProductTypeId,
        status_id: StatusId,
        amount: Money,
        timestamp: DateTime<Utc>,
    },
    PendingStatusCreated {
        status_id: StatusId,
        name: String,
        timestamp: DateTime<Utc>,
    },
    StatusChanged {
        application_id: ApplicationId,
        old_status_id: StatusId,
        new_status_id: StatusId,
        timestamp: DateTime<Utc>,
    },
    ValidationRequested {
        application_id: ApplicationId,
        requested_status_id: Option<StatusId>,
        active_loans: usize,
        timestamp: DateTime<Utc>,
    },
    ValidationDispatchFailed {
        application_id: ApplicationId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    ApplicantNotified {
        application_id: ApplicationId,
        status_name: String,
        timestamp: DateTime<Utc>,
    },
    DecisionApplied {
        application_id: ApplicationId,
        status_name: String,
        timestamp: DateTime<Utc>,
    },
}

/// events kept when no capacity is configured
pub const DEFAULT_EVENT_CAPACITY: usize = 1_024;

/// shared bounded event log; clones observe the same events
///
/// Once full, each new event evicts the oldest one.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: Arc<Mutex<VecDeque<Event>>>,
    capacity: usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// a zero capacity is raised to one
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn emit(&self, event: Event) {
        let mut events = self.lock();
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// copy of the retained events, oldest first
    pub fn events(&self) -> Vec<Event> {
        self.lock().iter().cloned().collect()
    }

    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut *self.lock()).into()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // a panic while pushing cannot leave the deque half-written
    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
