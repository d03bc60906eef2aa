use tonic::transport::Channel;
use uuid::Uuid;

use rollcall_proto::subject::{GetSubjectRequest, subject_service_client::SubjectServiceClient};

use crate::domain::repository::SubjectPort;
use crate::domain::types::Subject;
use crate::error::AttendanceServiceError;

#[derive(Clone)]
pub struct GrpcSubjectPort {
    client: SubjectServiceClient<Channel>,
}

impl GrpcSubjectPort {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: SubjectServiceClient::new(channel),
        }
    }
}

impl SubjectPort for GrpcSubjectPort {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subject>, AttendanceServiceError> {
        let response = self
            .client
            .clone()
            .get_subject(GetSubjectRequest {
                subject_id: id.to_string(),
            })
            .await;
        match response {
            Ok(resp) => Ok(Some(resp.into_inner().try_into()?)),
            Err(status) if status.code() == tonic::Code::NotFound => Ok(None),
            Err(e) => Err(anyhow::anyhow!("gRPC get_subject failed: {e}").into()),
        }
    }
}

fn parse_uuid(value: &str, field: &str) -> Result<Uuid, AttendanceServiceError> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid {field} UUID from subjects service: {value}").into())
}

impl TryFrom<rollcall_proto::subject::Subject> for Subject {
    type Error = AttendanceServiceError;

    fn try_from(subject: rollcall_proto::subject::Subject) -> Result<Self, Self::Error> {
        let enrolled_students = subject
            .enrolled_student_ids
            .iter()
            .map(|id| parse_uuid(id, "student"))
            .collect::<Result<_, _>>()?;
        Ok(Subject {
            id: parse_uuid(&subject.id, "subject")?,
            name: subject.name,
            teacher_id: parse_uuid(&subject.teacher_id, "teacher")?,
            enrolled_students,
        })
    }
}
