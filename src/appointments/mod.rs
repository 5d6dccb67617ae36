use axum::{
    Json, Router, debug_handler,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::notifications::{self, NotificationKind, Outgoing};
use crate::users::{self, Role, User};
use crate::{AppResult, AppState, PortalError, Presence, session};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/book", post(book_appointment))
        .route("/my", get(my_appointments))
}

/// Only `Pending` is ever written today; the confirm/cancel transitions are
/// an unfinished state machine and stay unimplemented on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub teacher_id: Uuid,
    pub date: DateTime<Utc>,
    pub reason: String,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BookAppointment {
    pub(crate) teacher_id: Uuid,
    pub(crate) date: DateTime<Utc>,
    pub(crate) reason: String,
}

pub(crate) async fn book(
    pool: &SqlitePool,
    presence: &Presence,
    student: &User,
    req: BookAppointment,
) -> AppResult<Appointment> {
    if student.role() != Role::Student {
        return Err(PortalError::Forbidden(
            "only students can book appointments",
        ));
    }
    if req.teacher_id == student.id {
        return Err(PortalError::validation(
            "cannot book an appointment with yourself",
        ));
    }
    if req.reason.trim().is_empty() {
        return Err(PortalError::validation("reason is required"));
    }
    let teacher = users::require(pool, req.teacher_id).await?;
    if teacher.role() != Role::Teacher {
        return Err(PortalError::validation("target user is not a teacher"));
    }

    let appointment = Appointment {
        id: Uuid::now_v7(),
        student_id: student.id,
        teacher_id: teacher.id,
        date: req.date,
        reason: req.reason,
        status: AppointmentStatus::Pending,
        created_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO appointments (id, student_id, teacher_id, date, reason, status, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(appointment.id)
    .bind(appointment.student_id)
    .bind(appointment.teacher_id)
    .bind(appointment.date)
    .bind(&appointment.reason)
    .bind(appointment.status)
    .bind(appointment.created_at)
    .execute(pool)
    .await?;

    notifications::notify(
        pool,
        presence,
        Outgoing {
            to: teacher.id,
            from: student.id,
            kind: NotificationKind::AppointmentRequest,
            message: format!(
                "New appointment requested by {} for {}",
                student.full_name(),
                appointment.date.format("%Y-%m-%d %H:%M")
            ),
            related_id: appointment.id,
        },
    )
    .await?;

    Ok(appointment)
}

/// Appointments the user is on either side of, newest first.
pub(crate) async fn for_user(pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<Appointment>> {
    Ok(sqlx::query_as(
        "SELECT id, student_id, teacher_id, date, reason, status, created_at FROM appointments \
         WHERE student_id = ? OR teacher_id = ? ORDER BY date DESC",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

#[debug_handler(state = AppState)]
async fn book_appointment(
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    session: Session,
    Json(req): Json<BookAppointment>,
) -> AppResult<(StatusCode, Json<Appointment>)> {
    let student = users::current(&db_pool, &session).await?;
    let appointment = book(&db_pool, &presence, &student, req).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

#[debug_handler(state = AppState)]
async fn my_appointments(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Vec<Appointment>>> {
    let user_id = session::require_user_id(&session).await?;
    Ok(Json(for_user(&db_pool, user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use chrono::Duration;

    fn booking(teacher_id: Uuid) -> BookAppointment {
        BookAppointment {
            teacher_id,
            date: Utc::now() + Duration::days(2),
            reason: "thesis supervision".into(),
        }
    }

    #[tokio::test]
    async fn booking_notifies_the_teacher_and_stays_pending() {
        let pool = testutil::pool().await;
        let presence = Presence::new();
        let student = testutil::student(&pool, "u6001", "Computer Science").await;
        let teacher = testutil::teacher(&pool, "t6001").await;

        let appointment = book(&pool, &presence, &student, booking(teacher.id))
            .await
            .unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Pending);

        let inbox = crate::notifications::for_user(&pool, teacher.id).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::AppointmentRequest);
        assert_eq!(inbox[0].related_id, appointment.id);

        // both sides list it
        assert_eq!(for_user(&pool, student.id).await.unwrap().len(), 1);
        assert_eq!(for_user(&pool, teacher.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn teachers_cannot_book_and_targets_must_teach() {
        let pool = testutil::pool().await;
        let presence = Presence::new();
        let student = testutil::student(&pool, "u6002", "Computer Science").await;
        let other_student = testutil::student(&pool, "u6003", "Economics").await;
        let teacher = testutil::teacher(&pool, "t6002").await;

        let err = book(&pool, &presence, &teacher, booking(student.id))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Forbidden(_)));

        let err = book(&pool, &presence, &student, booking(other_student.id))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));

        let err = book(&pool, &presence, &student, booking(student.id))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));
    }
}
