use axum::extract::Path;
use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, Json, TypedHeader};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::auth::{bearer_account, is_mentor, require_mentor};
use crate::models::{MentorProfileView, MentorRow, StudentProfileView, StudentRow};
use crate::{breaks, proceeds, Error, Payload};

type BearerHeader = Option<TypedHeader<Authorization<Bearer>>>;

async fn own_student_row(pg: &SqlitePool, account_id: i64) -> Result<Option<StudentRow>, Error> {
    let row = sqlx::query_as::<_, StudentRow>(
        "SELECT * FROM student_profiles WHERE account_id = $1 LIMIT 1",
    )
    .bind(account_id)
    .fetch_optional(pg)
    .await?;
    Ok(row)
}

async fn own_mentor_row(pg: &SqlitePool, account_id: i64) -> Result<Option<MentorRow>, Error> {
    let row = sqlx::query_as::<_, MentorRow>(
        "SELECT * FROM mentor_profiles WHERE account_id = $1 LIMIT 1",
    )
    .bind(account_id)
    .fetch_optional(pg)
    .await?;
    Ok(row)
}

/// GET /profile/student — the caller's own profile; the caller must be a
/// student.
pub async fn student_profile(
    bearer: BearerHeader,
    Extension(pg): Extension<SqlitePool>,
) -> Payload<StudentProfileView> {
    let account = bearer_account(bearer, &pg).await?;
    let student = match own_student_row(&pg, account.id).await? {
        Some(student) => student,
        None => {
            return breaks(Error::NoRole {
                message: "User is not a student".to_string(),
            })
        }
    };
    proceeds(StudentProfileView::load(&pg, student).await?)
}

/// GET /profile/student/:id — any mentor may fetch any student; a student
/// only their own record.
pub async fn student_profile_by_id(
    bearer: BearerHeader,
    Path(student_id): Path<i64>,
    Extension(pg): Extension<SqlitePool>,
) -> Payload<StudentProfileView> {
    let account = bearer_account(bearer, &pg).await?;
    let student =
        sqlx::query_as::<_, StudentRow>("SELECT * FROM student_profiles WHERE id = $1 LIMIT 1")
            .bind(student_id)
            .fetch_optional(&pg)
            .await?;
    let student = match student {
        Some(student) => student,
        None => {
            return breaks(Error::not_found(format!(
                "No student profile with id {}",
                student_id
            )))
        }
    };

    if student.account_id != account.id && !is_mentor(&pg, account.id).await? {
        return breaks(Error::Forbidden {
            message: "You do not have permission to view this student profile".to_string(),
        });
    }
    proceeds(StudentProfileView::load(&pg, student).await?)
}

/// GET /profile/mentor — self only.
pub async fn mentor_profile(
    bearer: BearerHeader,
    Extension(pg): Extension<SqlitePool>,
) -> Payload<MentorProfileView> {
    let account = bearer_account(bearer, &pg).await?;
    let mentor = match own_mentor_row(&pg, account.id).await? {
        Some(mentor) => mentor,
        None => {
            return breaks(Error::NoRole {
                message: "User is not a mentor".to_string(),
            })
        }
    };
    proceeds(MentorProfileView::load(&pg, mentor).await?)
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentList {
    pub students: Vec<StudentProfileView>,
}

pub async fn all_students(
    bearer: BearerHeader,
    Extension(pg): Extension<SqlitePool>,
) -> Payload<StudentList> {
    let account = bearer_account(bearer, &pg).await?;
    require_mentor(&pg, &account, "access this endpoint").await?;

    let rows = sqlx::query_as::<_, StudentRow>("SELECT * FROM student_profiles ORDER BY id")
        .fetch_all(&pg)
        .await?;
    let mut students = Vec::with_capacity(rows.len());
    for row in rows {
        students.push(StudentProfileView::load(&pg, row).await?);
    }
    proceeds(StudentList { students })
}

/// Distinguishes an absent field (outer `None`, leave untouched) from an
/// explicit JSON `null` (`Some(None)`, clear the column).
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(de).map(Some)
}

/// Updatable fields, enumerated explicitly: anything absent from the patch is
/// left untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct StudentProfilePatch {
    pub leetcode: Option<String>,
    pub github: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub photo: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub bio: Option<Option<String>>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MentorProfilePatch {
    pub expertise: Option<String>,
    pub github: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub photo: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub bio: Option<Option<String>>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

fn check_patch_email(email: &Option<String>) -> Result<(), Error> {
    if let Some(email) = email {
        if email.is_empty() {
            return Err(Error::validation("email", "This field may not be blank"));
        }
        if !email.contains('@') {
            return Err(Error::validation("email", "Enter a valid email address"));
        }
    }
    Ok(())
}

async fn patch_account(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    account_id: i64,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
) -> Result<(), Error> {
    if first_name.is_none() && last_name.is_none() && email.is_none() {
        return Ok(());
    }
    sqlx::query(
        "UPDATE accounts SET
            first_name = COALESCE($1, first_name),
            last_name = COALESCE($2, last_name),
            email = COALESCE($3, email)
         WHERE id = $4",
    )
    .bind(first_name)
    .bind(last_name)
    .bind(email)
    .bind(account_id)
    .execute(&mut *tx)
    .await?;
    Ok(())
}

/// PUT /profile/student — self-update only.
pub async fn update_student_profile(
    bearer: BearerHeader,
    Extension(pg): Extension<SqlitePool>,
    Json(patch): Json<StudentProfilePatch>,
) -> Payload<StudentProfileView> {
    let account = bearer_account(bearer, &pg).await?;
    let mut student = match own_student_row(&pg, account.id).await? {
        Some(student) => student,
        None => {
            return breaks(Error::NoRole {
                message: "User is not a student".to_string(),
            })
        }
    };
    // Validate before touching anything so a rejected patch applies nothing.
    check_patch_email(&patch.email)?;

    if let Some(leetcode) = patch.leetcode {
        student.leetcode = leetcode;
    }
    if let Some(github) = patch.github {
        student.github = github;
    }
    if let Some(photo) = patch.photo {
        student.photo = photo;
    }
    if let Some(bio) = patch.bio {
        student.bio = bio;
    }

    let mut tx = pg.begin().await?;
    sqlx::query(
        "UPDATE student_profiles SET leetcode = $1, github = $2, photo = $3, bio = $4 WHERE id = $5",
    )
    .bind(&student.leetcode)
    .bind(&student.github)
    .bind(&student.photo)
    .bind(&student.bio)
    .bind(student.id)
    .execute(&mut tx)
    .await?;
    patch_account(&mut tx, account.id, patch.first_name, patch.last_name, patch.email).await?;
    tx.commit().await?;

    proceeds(StudentProfileView::load(&pg, student).await?)
}

/// PUT /profile/mentor — self-update only.
pub async fn update_mentor_profile(
    bearer: BearerHeader,
    Extension(pg): Extension<SqlitePool>,
    Json(patch): Json<MentorProfilePatch>,
) -> Payload<MentorProfileView> {
    let account = bearer_account(bearer, &pg).await?;
    let mut mentor = match own_mentor_row(&pg, account.id).await? {
        Some(mentor) => mentor,
        None => {
            return breaks(Error::NoRole {
                message: "User is not a mentor".to_string(),
            })
        }
    };
    check_patch_email(&patch.email)?;

    if let Some(expertise) = patch.expertise {
        mentor.expertise = expertise;
    }
    if let Some(github) = patch.github {
        mentor.github = github;
    }
    if let Some(photo) = patch.photo {
        mentor.photo = photo;
    }
    if let Some(bio) = patch.bio {
        mentor.bio = bio;
    }

    let mut tx = pg.begin().await?;
    sqlx::query(
        "UPDATE mentor_profiles SET expertise = $1, github = $2, photo = $3, bio = $4 WHERE id = $5",
    )
    .bind(&mentor.expertise)
    .bind(&mentor.github)
    .bind(&mentor.photo)
    .bind(&mentor.bio)
    .bind(mentor.id)
    .execute(&mut tx)
    .await?;
    patch_account(&mut tx, account.id, patch.first_name, patch.last_name, patch.email).await?;
    tx.commit().await?;

    proceeds(MentorProfileView::load(&pg, mentor).await?)
}
