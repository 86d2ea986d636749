//! The job trait and job identifiers.

use super::{JobContext, JobResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Identifier of a job record, kept exactly as stored in `_id`.
///
/// Freshly generated ids are UUID v4 in simple form (32 lowercase hex digits),
/// but ids read back from the store are never reinterpreted: a record must be
/// completed under the same `_id` it was claimed with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// A unit of work that can be stored as a payload and executed by any worker.
///
/// The job value itself is the payload: it is serialized at enqueue time and
/// deserialized by whichever worker claims it, so everything the job needs
/// must live in its fields.
///
/// # Example
///
/// ```rust
/// use docqueue::jobs::{Job, JobContext, JobResult};
/// use async_trait::async_trait;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Square {
///     n: i64,
/// }
///
/// #[async_trait]
/// impl Job for Square {
///     type Output = i64;
///
///     async fn execute(&self, _ctx: &JobContext) -> JobResult<i64> {
///         Ok(self.n * self.n)
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Result produced by the job.
    ///
    /// Objects are merged into the completed record field by field; any other
    /// value is stored under `result`.
    type Output: Serialize + Send;

    /// Run the job. May block for as long as it needs.
    async fn execute(&self, ctx: &JobContext) -> JobResult<Self::Output>;

    /// Parameters copied into the record once the payload is decoded.
    fn parameters(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Name used in logs.
    fn job_type(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_job_id_is_simple_hex() {
        let text = JobId::new().to_string();
        assert_eq!(text.len(), 32);
        assert!(text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_job_id_serde_is_verbatim() {
        for raw in ["0a1b2c3d-0000-4000-8000-000000000001", "0A1B2C3D000040008000000000000001", "design"] {
            let id: JobId = serde_json::from_value(Value::from(raw)).unwrap();
            assert_eq!(id.as_str(), raw);
            assert_eq!(serde_json::to_value(&id).unwrap(), Value::from(raw));
        }
    }

    proptest! {
        #[test]
        fn prop_generated_ids_do_not_collide(count in 1usize..2000) {
            let ids: HashSet<String> = (0..count).map(|_| JobId::new().to_string()).collect();
            prop_assert_eq!(ids.len(), count);
        }
    }
}
