pub mod health;
pub mod record;
pub mod scan;
pub mod session;

use rollcall_auth_types::identity::IdentityHeaders;

use crate::error::AttendanceServiceError;
use crate::usecase::session::SessionViewer;

fn require_student(identity: &IdentityHeaders) -> Result<(), AttendanceServiceError> {
    if identity.is_student() {
        Ok(())
    } else {
        Err(AttendanceServiceError::Forbidden)
    }
}

fn require_staff(identity: &IdentityHeaders) -> Result<SessionViewer, AttendanceServiceError> {
    if !identity.role.can_manage_sessions() {
        return Err(AttendanceServiceError::Forbidden);
    }
    Ok(SessionViewer {
        user_id: identity.user_id,
        is_admin: identity.is_admin(),
    })
}
