//! Compiled plan cache
//!
//! Insert-once, never evicted: paths are finite and written at definition
//! time. Keys are [`PathSpec::fingerprint`](crate::PathSpec::fingerprint).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::plan::Plan;

#[derive(Debug, Default)]
pub struct PlanCache {
    plans: RwLock<HashMap<String, Arc<Plan>>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &str) -> Option<Arc<Plan>> {
        let plans = self.plans.read().ok()?;
        plans.get(fingerprint).cloned()
    }

    /// Store `plan` unless another thread got there first; the stored plan
    /// is returned either way.
    pub fn insert(&self, fingerprint: String, plan: Plan) -> Arc<Plan> {
        let plan = Arc::new(plan);
        match self.plans.write() {
            Ok(mut plans) => {
                let stored = plans.entry(fingerprint).or_insert_with(|| plan.clone());
                stored.clone()
            }
            // A poisoned lock only loses caching, never the plan
            Err(_) => {
                debug!("plan cache lock poisoned, returning uncached plan");
                plan
            }
        }
    }

    pub fn len(&self) -> usize {
        self.plans.read().map(|plans| plans.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut plans) = self.plans.write() {
            plans.clear();
        }
    }
}
