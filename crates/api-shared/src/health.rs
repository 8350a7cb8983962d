use crate::HealthRes;

/// Simple health service shared by the analyst and evaluation APIs.
///
/// Both services report the same shape; only the service name differs.
#[derive(Clone)]
pub struct HealthService;

impl HealthService {
    pub const ANALYST: &'static str = "analysis";
    pub const EVALUATION: &'static str = "evaluation";

    pub fn new() -> Self {
        Self
    }

    /// Health response for `service`.
    ///
    /// # Returns
    /// A `HealthRes` indicating the service is healthy.
    pub fn check_health(service: &str) -> HealthRes {
        HealthRes {
            status: "healthy".into(),
            service: service.into(),
        }
    }
}

impl Default for HealthService {
    fn default() -> Self {
        Self::new()
    }
}
