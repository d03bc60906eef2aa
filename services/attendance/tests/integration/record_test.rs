use futures::future::join_all;
use uuid::Uuid;

use rollcall_attendance::domain::types::AcceptedScan;
use rollcall_attendance::error::AttendanceServiceError;
use rollcall_attendance::usecase::record::{
    ListStudentRecordsUseCase, ListSubjectRecordsUseCase, ManualMarkInput, ManualMarkUseCase,
};
use rollcall_attendance::usecase::session::SessionViewer;
use rollcall_domain::attendance::AttendanceStatus;
use rollcall_domain::pagination::{PageRequest, Sort};

use crate::helpers::{Fixture, MockRecordRepo, at, class_day, north_of_campus, scan_input};

fn accepted(fx: &Fixture, student_id: Uuid, accepted_at: chrono::DateTime<chrono::Utc>) -> AcceptedScan {
    AcceptedScan {
        student_id,
        subject_id: fx.subject.id,
        teacher_id: fx.teacher_id,
        accepted_at,
        session_start: at(9, 0),
        source_session_id: Uuid::new_v4(),
        location: None,
        device_info: None,
    }
}

fn owner(fx: &Fixture) -> SessionViewer {
    SessionViewer {
        user_id: fx.teacher_id,
        is_admin: false,
    }
}

fn manual_mark(fx: &Fixture) -> ManualMarkUseCase<crate::helpers::MockSubjectPort, MockRecordRepo, crate::helpers::TestClock> {
    ManualMarkUseCase {
        subjects: fx.subjects.clone(),
        recorder: fx.recorder(),
    }
}

#[tokio::test]
async fn should_overwrite_same_day_record_in_place() {
    let fx = Fixture::new();
    let morning = fx.seed_session(None);
    let refreshed = fx.seed_session_until(None, at(9, 40));
    let student = fx.students[0];
    let uc = fx.submit();

    fx.clock.set(at(8, 58));
    let first = uc
        .execute(scan_input(&morning, student, None))
        .await
        .unwrap();
    fx.clock.set(at(9, 30));
    let second = uc
        .execute(scan_input(&refreshed, student, Some(north_of_campus(4.0))))
        .await
        .unwrap();

    assert_eq!(first.status, AttendanceStatus::Present);
    assert_eq!(second.status, AttendanceStatus::Late);
    assert_eq!(second.id, first.id, "record identity survives overwrite");
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.marked_at, at(9, 30));
    assert_eq!(second.source_session_id, Some(refreshed.id));
    assert_eq!(second.location, Some(north_of_campus(4.0)));

    let records = fx.records.all();
    assert_eq!(records.len(), 1, "one record per student, subject and day");
    assert_eq!(records[0].day, class_day());
    assert_eq!(fx.records.all_events().len(), 2, "each marking notifies");
}

#[tokio::test]
async fn should_enqueue_notification_with_record() {
    let fx = Fixture::new();
    let session = fx.seed_session(None);
    fx.clock.set(at(9, 2));

    let record = fx
        .submit()
        .execute(scan_input(&session, fx.students[0], None))
        .await
        .unwrap();

    let events = fx.records.all_events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.kind, "attendance_marked");
    assert_eq!(event.payload["student_id"], record.student_id.to_string());
    assert_eq!(event.payload["subject_name"], "Operating Systems");
    assert_eq!(event.payload["status"], "late");
    assert_eq!(event.payload["timestamp"], "2025-03-10T09:02:00.000Z");
}

#[tokio::test]
async fn should_retry_upsert_on_conflict() {
    let mut fx = Fixture::new();
    fx.records = MockRecordRepo::with_conflicts(2);
    fx.clock.set(at(9, 1));

    let record = fx
        .recorder()
        .record_scan(accepted(&fx, fx.students[0], at(9, 1)), "Operating Systems")
        .await
        .unwrap();

    assert_eq!(record.status, AttendanceStatus::Late);
    assert_eq!(fx.records.attempts(), 3);
    assert_eq!(fx.records.all().len(), 1);
}

#[tokio::test]
async fn should_surface_persistence_conflict_after_retry_budget() {
    let mut fx = Fixture::new();
    fx.records = MockRecordRepo::with_conflicts(3);
    fx.clock.set(at(9, 1));

    let result = fx
        .recorder()
        .record_scan(accepted(&fx, fx.students[0], at(9, 1)), "Operating Systems")
        .await;

    assert!(
        matches!(result, Err(AttendanceServiceError::PersistenceConflict)),
        "expected PersistenceConflict, got {result:?}"
    );
    assert_eq!(fx.records.attempts(), 3);
    assert!(fx.records.all().is_empty());
}

#[tokio::test]
async fn should_converge_concurrent_upserts_to_one_record() {
    let fx = Fixture::new();
    let recorder = fx.recorder();
    let student = fx.students[0];

    let results = join_all((0..5).map(|i| {
        recorder.record_scan(
            accepted(&fx, student, at(9, i)),
            "Operating Systems",
        )
    }))
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    let records = fx.records.all();
    assert_eq!(records.len(), 1);
    let ids: Vec<Uuid> = results.into_iter().map(|r| r.unwrap().id).collect();
    assert!(ids.iter().all(|id| *id == records[0].id));
}

#[tokio::test]
async fn should_complete_recording_on_retry_after_expiry() {
    let fx = Fixture::new();
    let session = fx.seed_session(None);
    let student = fx.students[0];
    fx.clock.set(at(9, 1));
    fx.records.set_broken(true);

    let result = fx
        .submit()
        .execute(scan_input(&session, student, None))
        .await;
    assert!(matches!(
        result,
        Err(AttendanceServiceError::RecordingIncomplete)
    ));

    fx.records.set_broken(false);
    fx.clock.set(at(9, 30));
    let record = fx
        .retry()
        .execute(&session.code, &session.token, student)
        .await
        .unwrap();

    assert_eq!(record.marked_at, at(9, 1), "decision comes from the stored scan");
    assert_eq!(record.status, AttendanceStatus::Late);
    assert_eq!(record.source_session_id, Some(session.id));
    assert_eq!(fx.sessions.get(session.id).scan_count, 1);

    // Replaying the recording is idempotent.
    fx.retry()
        .execute(&session.code, &session.token, student)
        .await
        .unwrap();
    assert_eq!(fx.records.all().len(), 1);
    assert_eq!(fx.records.all_events().len(), 1);

    // The scan itself must not be replayed.
    let result = fx
        .submit()
        .execute(scan_input(&session, student, None))
        .await;
    assert!(matches!(
        result,
        Err(AttendanceServiceError::SessionExpired)
    ));
}

#[tokio::test]
async fn should_return_scan_not_found_when_nothing_to_retry() {
    let fx = Fixture::new();
    let session = fx.seed_session(None);

    let result = fx
        .retry()
        .execute(&session.code, &session.token, fx.students[0])
        .await;
    assert!(
        matches!(result, Err(AttendanceServiceError::ScanNotFound)),
        "expected ScanNotFound, got {result:?}"
    );

    let result = fx
        .retry()
        .execute("UNKNOWN", &session.token, fx.students[0])
        .await;
    assert!(matches!(
        result,
        Err(AttendanceServiceError::SessionNotFound)
    ));
}

#[tokio::test]
async fn should_excuse_absence_over_scan_record() {
    let fx = Fixture::new();
    let session = fx.seed_session(None);
    let student = fx.students[0];
    fx.clock.set(at(9, 3));
    let scanned = fx
        .submit()
        .execute(scan_input(&session, student, None))
        .await
        .unwrap();

    fx.clock.set(at(11, 0));
    let excused = manual_mark(&fx)
        .execute(ManualMarkInput {
            subject_id: fx.subject.id,
            student_id: student,
            day: class_day(),
            status: AttendanceStatus::Excused,
            actor: owner(&fx),
        })
        .await
        .unwrap();

    assert_eq!(excused.id, scanned.id);
    assert_eq!(excused.status, AttendanceStatus::Excused);
    assert_eq!(excused.source_session_id, None);
    assert_eq!(excused.marked_at, at(11, 0));
    assert_eq!(fx.records.all().len(), 1);
    let events = fx.records.all_events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].payload["status"], "excused");
}

#[tokio::test]
async fn should_keep_excuse_when_scan_recording_is_retried() {
    let fx = Fixture::new();
    let session = fx.seed_session(None);
    let student = fx.students[0];
    fx.clock.set(at(9, 3));
    fx.submit()
        .execute(scan_input(&session, student, None))
        .await
        .unwrap();

    fx.clock.set(at(11, 0));
    manual_mark(&fx)
        .execute(ManualMarkInput {
            subject_id: fx.subject.id,
            student_id: student,
            day: class_day(),
            status: AttendanceStatus::Excused,
            actor: owner(&fx),
        })
        .await
        .unwrap();

    fx.clock.set(at(11, 5));
    let record = fx
        .retry()
        .execute(&session.code, &session.token, student)
        .await
        .unwrap();

    assert_eq!(record.status, AttendanceStatus::Excused);
    assert_eq!(record.marked_at, at(11, 0));
    let stored: Vec<AttendanceStatus> = fx.records.all().iter().map(|r| r.status).collect();
    assert_eq!(stored, vec![AttendanceStatus::Excused]);
    assert_eq!(fx.records.all_events().len(), 2);
}

#[tokio::test]
async fn should_complete_retry_over_earlier_mark() {
    let fx = Fixture::new();
    fx.clock.set(at(8, 30));
    manual_mark(&fx)
        .execute(ManualMarkInput {
            subject_id: fx.subject.id,
            student_id: fx.students[0],
            day: class_day(),
            status: AttendanceStatus::Absent,
            actor: owner(&fx),
        })
        .await
        .unwrap();

    let session = fx.seed_session(None);
    let student = fx.students[0];
    fx.clock.set(at(9, 1));
    fx.records.set_broken(true);
    let result = fx
        .submit()
        .execute(scan_input(&session, student, None))
        .await;
    assert!(matches!(
        result,
        Err(AttendanceServiceError::RecordingIncomplete)
    ));

    fx.records.set_broken(false);
    let record = fx
        .retry()
        .execute(&session.code, &session.token, student)
        .await
        .unwrap();

    assert_eq!(record.status, AttendanceStatus::Late);
    assert_eq!(record.marked_at, at(9, 1));
    assert_eq!(record.source_session_id, Some(session.id));
    assert_eq!(fx.records.all().len(), 1);
}

#[tokio::test]
async fn should_guard_manual_marks() {
    let fx = Fixture::new();
    fx.clock.set(at(11, 0));
    let uc = manual_mark(&fx);
    let input = |student_id, actor| ManualMarkInput {
        subject_id: fx.subject.id,
        student_id,
        day: class_day(),
        status: AttendanceStatus::Absent,
        actor,
    };

    let result = uc.execute(input(Uuid::new_v4(), owner(&fx))).await;
    assert!(
        matches!(result, Err(AttendanceServiceError::NotEnrolled)),
        "expected NotEnrolled, got {result:?}"
    );

    let stranger = SessionViewer {
        user_id: Uuid::new_v4(),
        is_admin: false,
    };
    let result = uc.execute(input(fx.students[0], stranger)).await;
    assert!(matches!(result, Err(AttendanceServiceError::Forbidden)));

    let admin = SessionViewer {
        user_id: Uuid::new_v4(),
        is_admin: true,
    };
    let record = uc.execute(input(fx.students[0], admin)).await.unwrap();
    assert_eq!(record.status, AttendanceStatus::Absent);
    assert_eq!(record.teacher_id, fx.teacher_id);
}

#[tokio::test]
async fn should_list_records_for_student_and_subject() {
    let fx = Fixture::new();
    let recorder = fx.recorder();
    let other_subject = Uuid::new_v4();
    for day in 10..13 {
        let when = chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2025, 3, day, 9, 0, 0).unwrap();
        recorder
            .record_scan(accepted(&fx, fx.students[0], when), "Operating Systems")
            .await
            .unwrap();
    }
    let mut elsewhere = accepted(&fx, fx.students[0], at(9, 0));
    elsewhere.subject_id = other_subject;
    recorder.record_scan(elsewhere, "Networks").await.unwrap();
    recorder
        .record_scan(accepted(&fx, fx.students[1], at(9, 0)), "Operating Systems")
        .await
        .unwrap();

    let mine = ListStudentRecordsUseCase {
        records: fx.records.clone(),
    };
    let all_mine = mine
        .execute(fx.students[0], None, Sort::Desc, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(all_mine.len(), 4);

    let os_only = mine
        .execute(
            fx.students[0],
            Some(fx.subject.id),
            Sort::Desc,
            PageRequest {
                per_page: 2,
                page: 1,
            },
        )
        .await
        .unwrap();
    assert_eq!(os_only.len(), 2);
    assert!(os_only[0].day > os_only[1].day, "newest day first");

    let subject = ListSubjectRecordsUseCase {
        subjects: fx.subjects.clone(),
        records: fx.records.clone(),
    };
    let on_day = subject
        .execute(
            fx.subject.id,
            owner(&fx),
            Some(class_day()),
            Sort::Asc,
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(on_day.len(), 2);
    assert!(on_day.iter().all(|r| r.day == class_day()));

    let stranger = SessionViewer {
        user_id: Uuid::new_v4(),
        is_admin: false,
    };
    let result = subject
        .execute(fx.subject.id, stranger, None, Sort::Asc, PageRequest::default())
        .await;
    assert!(matches!(result, Err(AttendanceServiceError::Forbidden)));
}
