use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete as delete_route, get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::notifications::{self, NotificationKind, Outgoing};
use crate::users::{self, Role, RoleDetails, User};
use crate::{AppResult, AppState, PortalError, Presence};

/// Who an announcement is for: one major, or everyone scheduled for one
/// subject. Mutually exclusive by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "announcementType",
    rename_all = "lowercase",
    rename_all_fields = "camelCase"
)]
pub enum Audience {
    Major { target_major: String },
    Subject { target_subject: String },
}

impl Audience {
    fn kind(&self) -> &'static str {
        match self {
            Audience::Major { .. } => "major",
            Audience::Subject { .. } => "subject",
        }
    }

    fn target(&self) -> &str {
        match self {
            Audience::Major { target_major } => target_major,
            Audience::Subject { target_subject } => target_subject,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub title: String,
    pub content: String,
    #[serde(flatten)]
    pub audience: Audience,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AnnouncementRow {
    id: Uuid,
    sender_id: Uuid,
    title: String,
    content: String,
    kind: String,
    target: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AnnouncementRow> for Announcement {
    type Error = PortalError;

    fn try_from(row: AnnouncementRow) -> Result<Self, PortalError> {
        let audience = match row.kind.as_str() {
            "major" => Audience::Major {
                target_major: row.target,
            },
            "subject" => Audience::Subject {
                target_subject: row.target,
            },
            other => return Err(anyhow::anyhow!("unknown audience kind {other:?}").into()),
        };
        Ok(Announcement {
            id: row.id,
            sender_id: row.sender_id,
            title: row.title,
            content: row.content,
            audience,
            created_at: row.created_at,
        })
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(post_announcement))
        .route("/student", get(student_feed))
        .route("/teacher", get(teacher_list))
        .route("/{id}", delete_route(delete_announcement))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateAnnouncement {
    pub(crate) title: String,
    pub(crate) content: String,
    #[serde(flatten)]
    pub(crate) audience: Audience,
}

pub(crate) async fn create(
    pool: &SqlitePool,
    presence: &Presence,
    sender: &User,
    req: CreateAnnouncement,
) -> AppResult<Announcement> {
    if sender.role() != Role::Teacher {
        return Err(PortalError::Forbidden(
            "only teachers can post announcements",
        ));
    }
    if req.title.trim().is_empty() || req.content.trim().is_empty() {
        return Err(PortalError::validation("title and content are required"));
    }

    let announcement = Announcement {
        id: Uuid::now_v7(),
        sender_id: sender.id,
        title: req.title,
        content: req.content,
        audience: req.audience,
        created_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO announcements (id, sender_id, title, content, kind, target, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(announcement.id)
    .bind(announcement.sender_id)
    .bind(&announcement.title)
    .bind(&announcement.content)
    .bind(announcement.audience.kind())
    .bind(announcement.audience.target())
    .bind(announcement.created_at)
    .execute(pool)
    .await?;

    let recipients = audience_user_ids(pool, &announcement.audience).await?;
    let created = notifications::notify_each(pool, presence, &recipients, |to| Outgoing {
        to,
        from: sender.id,
        kind: NotificationKind::Announcement,
        message: format!("New announcement: {}", announcement.title),
        related_id: announcement.id,
    })
    .await;
    tracing::info!(announcement = %announcement.id, recipients = created, "announcement fanned out");

    Ok(announcement)
}

async fn audience_user_ids(pool: &SqlitePool, audience: &Audience) -> AppResult<Vec<Uuid>> {
    let ids = match audience {
        Audience::Major { target_major } => {
            sqlx::query_scalar("SELECT id FROM users WHERE role = 'student' AND major = ?")
                .bind(target_major)
                .fetch_all(pool)
                .await?
        }
        Audience::Subject { target_subject } => {
            sqlx::query_scalar(
                "SELECT DISTINCT u.id FROM users u \
                 JOIN schedule_entries s ON s.user_id = u.id \
                 WHERE u.role = 'student' AND s.subject = ?",
            )
            .bind(target_subject)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(ids)
}

/// Announcements aimed at the student's major or anything on their schedule,
/// newest first.
pub(crate) async fn for_student(pool: &SqlitePool, student: &User) -> AppResult<Vec<Announcement>> {
    let RoleDetails::Student { major } = &student.details else {
        return Err(PortalError::Forbidden("students only"));
    };

    let rows: Vec<AnnouncementRow> = sqlx::query_as(
        "SELECT id, sender_id, title, content, kind, target, created_at FROM announcements \
         WHERE (kind = 'major' AND target = ?) \
            OR (kind = 'subject' AND target IN (SELECT subject FROM schedule_entries WHERE user_id = ?)) \
         ORDER BY created_at DESC",
    )
    .bind(major)
    .bind(student.id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Announcement::try_from).collect()
}

pub(crate) async fn by_sender(pool: &SqlitePool, teacher: &User) -> AppResult<Vec<Announcement>> {
    if teacher.role() != Role::Teacher {
        return Err(PortalError::Forbidden("teachers only"));
    }
    let rows: Vec<AnnouncementRow> = sqlx::query_as(
        "SELECT id, sender_id, title, content, kind, target, created_at FROM announcements \
         WHERE sender_id = ? ORDER BY created_at DESC",
    )
    .bind(teacher.id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Announcement::try_from).collect()
}

pub(crate) async fn delete(pool: &SqlitePool, caller: &User, id: Uuid) -> AppResult<()> {
    if caller.role() != Role::Teacher {
        return Err(PortalError::Forbidden("teachers only"));
    }
    let sender_id: Option<Uuid> =
        sqlx::query_scalar("SELECT sender_id FROM announcements WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    let Some(sender_id) = sender_id else {
        return Err(PortalError::NotFound("announcement"));
    };
    if sender_id != caller.id {
        return Err(PortalError::Forbidden(
            "only the sender can delete an announcement",
        ));
    }
    sqlx::query("DELETE FROM announcements WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[debug_handler(state = AppState)]
async fn post_announcement(
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    session: Session,
    Json(req): Json<CreateAnnouncement>,
) -> AppResult<(StatusCode, Json<Announcement>)> {
    let sender = users::current(&db_pool, &session).await?;
    let announcement = create(&db_pool, &presence, &sender, req).await?;
    Ok((StatusCode::CREATED, Json(announcement)))
}

#[debug_handler(state = AppState)]
async fn student_feed(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Vec<Announcement>>> {
    let student = users::current(&db_pool, &session).await?;
    Ok(Json(for_student(&db_pool, &student).await?))
}

#[debug_handler(state = AppState)]
async fn teacher_list(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Vec<Announcement>>> {
    let teacher = users::current(&db_pool, &session).await?;
    Ok(Json(by_sender(&db_pool, &teacher).await?))
}

#[debug_handler(state = AppState)]
async fn delete_announcement(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let caller = users::current(&db_pool, &session).await?;
    delete(&db_pool, &caller, id).await?;
    Ok(Json(json!({ "message": "deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn announcement(title: &str, audience: Audience) -> CreateAnnouncement {
        CreateAnnouncement {
            title: title.into(),
            content: "details inside".into(),
            audience,
        }
    }

    #[tokio::test]
    async fn major_fanout_only_reaches_that_major() {
        let pool = testutil::pool().await;
        let presence = Presence::new();
        let teacher = testutil::teacher(&pool, "t5001").await;
        let cs_one = testutil::student(&pool, "u5001", "Computer Science").await;
        let cs_two = testutil::student(&pool, "u5002", "Computer Science").await;
        let econ = testutil::student(&pool, "u5003", "Economics").await;

        create(
            &pool,
            &presence,
            &teacher,
            announcement(
                "Lab moved",
                Audience::Major {
                    target_major: "Computer Science".into(),
                },
            ),
        )
        .await
        .unwrap();

        for student in [&cs_one, &cs_two] {
            let inbox = crate::notifications::for_user(&pool, student.id).await.unwrap();
            assert_eq!(inbox.len(), 1);
            assert_eq!(inbox[0].kind, NotificationKind::Announcement);
            // every recipient really is in the targeted major
            let RoleDetails::Student { major } = &student.details else {
                panic!("expected a student");
            };
            assert_eq!(major, "Computer Science");
        }
        assert!(
            crate::notifications::for_user(&pool, econ.id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn subject_fanout_follows_the_schedule() {
        let pool = testutil::pool().await;
        let presence = Presence::new();
        let teacher = testutil::teacher(&pool, "t5002").await;
        let enrolled = testutil::student_with_subject(&pool, "u5004", "Economics", "Algorithms").await;
        let outsider = testutil::student(&pool, "u5005", "Computer Science").await;

        let created = create(
            &pool,
            &presence,
            &teacher,
            announcement(
                "Midterm moved",
                Audience::Subject {
                    target_subject: "Algorithms".into(),
                },
            ),
        )
        .await
        .unwrap();

        let inbox = crate::notifications::for_user(&pool, enrolled.id).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].related_id, created.id);
        assert!(enrolled.schedule.iter().any(|e| e.subject == "Algorithms"));
        assert!(
            crate::notifications::for_user(&pool, outsider.id)
                .await
                .unwrap()
                .is_empty()
        );

        // and the student's feed picks the announcement up afterwards
        let feed = for_student(&pool, &enrolled).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].title, "Midterm moved");
    }

    #[tokio::test]
    async fn students_cannot_post() {
        let pool = testutil::pool().await;
        let presence = Presence::new();
        let student = testutil::student(&pool, "u5006", "Economics").await;

        let err = create(
            &pool,
            &presence,
            &student,
            announcement(
                "nope",
                Audience::Major {
                    target_major: "Economics".into(),
                },
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PortalError::Forbidden(_)));
    }

    #[tokio::test]
    async fn only_the_sender_may_delete() {
        let pool = testutil::pool().await;
        let presence = Presence::new();
        let author = testutil::teacher(&pool, "t5003").await;
        let other = testutil::teacher(&pool, "t5004").await;

        let created = create(
            &pool,
            &presence,
            &author,
            announcement(
                "mine",
                Audience::Major {
                    target_major: "Economics".into(),
                },
            ),
        )
        .await
        .unwrap();

        let err = delete(&pool, &other, created.id).await.unwrap_err();
        assert!(matches!(err, PortalError::Forbidden(_)));

        delete(&pool, &author, created.id).await.unwrap();
        let err = delete(&pool, &author, created.id).await.unwrap_err();
        assert!(matches!(err, PortalError::NotFound(_)));
    }
}
