//! Caller context for queue scoping
//!
//! Identity is established by the authentication layer in front of this
//! service and arrives here as opaque strings.

/// Roles whose queue is restricted to their own facility
pub mod roles {
    pub const PHC_STAFF: &str = "PHC_Staff";
    pub const PHC: &str = "PHC";
    pub const DHO: &str = "DHO";
    pub const DRIVER: &str = "DRIVER";

    /// Facility-scoped roles
    pub const FACILITY_SCOPED: [&str; 2] = [PHC_STAFF, PHC];
}

/// Who is asking, as supplied by the session layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub user_id: Option<String>,
    pub role: String,
    pub district: Option<String>,
    pub facility_id: Option<String>,
}

impl CallerContext {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            ..Default::default()
        }
    }

    pub fn with_facility(mut self, facility_id: impl Into<String>) -> Self {
        self.facility_id = Some(facility_id.into());
        self
    }

    pub fn with_district(mut self, district: impl Into<String>) -> Self {
        self.district = Some(district.into());
        self
    }

    /// Facility the caller's view is restricted to, if any
    pub fn facility_scope(&self) -> Option<&str> {
        if roles::FACILITY_SCOPED.contains(&self.role.as_str()) {
            // A facility-scoped role without a facility sees nothing
            Some(self.facility_id.as_deref().unwrap_or(""))
        } else {
            None
        }
    }
}

impl std::fmt::Display for CallerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.facility_id {
            Some(facility) => write!(f, "CallerContext({}@{})", self.role, facility),
            None => write!(f, "CallerContext({})", self.role),
        }
    }
}
