//! Gateway-injected identity headers extractor.

use axum::extract::FromRequestParts;
use http::StatusCode;
use http::request::Parts;
use uuid::Uuid;

use rollcall_domain::user::UserRole;

pub const USER_ID_HEADER: &str = "x-rollcall-user-id";
pub const USER_ROLE_HEADER: &str = "x-rollcall-user-role";

/// Caller identity injected by the gateway via `x-rollcall-user-id` and
/// `x-rollcall-user-role` headers.
///
/// Returns 401 if either header is absent, the id is not a UUID, or the role is not
/// a known `UserRole` wire value. Role enforcement (403) is done by handlers.
#[derive(Debug, Clone, Copy)]
pub struct IdentityHeaders {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl IdentityHeaders {
    pub fn is_student(&self) -> bool {
        self.role == UserRole::Student
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl<S> FromRequestParts<S> for IdentityHeaders
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    // Values are read synchronously so the returned future is 'static.
    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<Uuid>().ok());

        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u8>().ok())
            .and_then(UserRole::from_u8);

        async move {
            let user_id = user_id.ok_or(StatusCode::UNAUTHORIZED)?;
            let role = role.ok_or(StatusCode::UNAUTHORIZED)?;
            Ok(Self { user_id, role })
        }
    }
}
