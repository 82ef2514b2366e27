use chrono::Utc;
use tracing::debug;

use crate::model::{CheckRequest, CheckResult, Coverage};
use crate::service::{AuthzError, AuthzService};

impl AuthzService {
    /// Decide whether a role may act on an object with the given field values.
    ///
    /// Denied when the object is inactive, when the grant is inactive or
    /// outside its validity window, or when any requested value is outside
    /// the field's effective set. Virtual module coverage allows everything.
    pub fn check_access(&self, req: &CheckRequest) -> Result<CheckResult, AuthzError> {
        self.require_role(&req.role_id)?;
        let object = self.store.get_object(&req.object_id)?;
        if !object.is_active {
            debug!(object = %object.id, "check denied: object inactive");
            return Ok(CheckResult::denied(Coverage::None, None));
        }

        let Some(grant) = self.find_grant(&req.role_id, &req.object_id)? else {
            if self.has_module_coverage(&req.role_id, &object.module)? {
                return Ok(CheckResult {
                    allowed: true,
                    coverage: Coverage::VirtualModule,
                    grant_id: None,
                    denied_field: None,
                });
            }
            return Ok(CheckResult::denied(Coverage::None, None));
        };

        let coverage = if grant.module_full_access {
            Coverage::Module
        } else if grant.object_full_access {
            Coverage::Object
        } else {
            Coverage::Custom
        };

        if !grant.is_active || !grant.is_valid_at(Utc::now()) {
            debug!(grant = %grant.id, "check denied: grant inactive or out of window");
            return Ok(CheckResult::denied(coverage, Some(grant.id)));
        }

        for (field, value) in &req.values {
            if !grant.effective_values(field).permits(value) {
                debug!(grant = %grant.id, field = %field, value = %value, "check denied");
                return Ok(CheckResult {
                    allowed: false,
                    coverage,
                    grant_id: Some(grant.id),
                    denied_field: Some(field.clone()),
                });
            }
        }

        Ok(CheckResult {
            allowed: true,
            coverage,
            grant_id: Some(grant.id),
            denied_field: None,
        })
    }
}
