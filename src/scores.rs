use axum::extract::Path;
use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, Json, TypedHeader};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::auth::{bearer_account, require_mentor};
use crate::err::unique_violation;
use crate::models::{ScoreRow, ScoreView, StudentRow, TestRow};
use crate::{breaks, creates, proceeds, Error, Payload};

type BearerHeader = Option<TypedHeader<Authorization<Bearer>>>;

const SCORE_RANGE: std::ops::RangeInclusive<i64> = 0..=100;

fn check_range(score: i64) -> Result<(), Error> {
    if !SCORE_RANGE.contains(&score) {
        return Err(Error::validation(
            "score",
            "Score must be between 0 and 100",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddScore {
    pub student_id: i64,
    pub test_id: i64,
    pub score: i64,
}

/// POST /test-scores — mentor only. Checks run in order: student exists,
/// test exists, range, then the (student, test) duplicate.
pub async fn add_score(
    bearer: BearerHeader,
    Extension(pg): Extension<SqlitePool>,
    Json(body): Json<AddScore>,
) -> Payload<ScoreView> {
    let account = bearer_account(bearer, &pg).await?;
    require_mentor(&pg, &account, "add test scores").await?;

    let student =
        sqlx::query_as::<_, StudentRow>("SELECT * FROM student_profiles WHERE id = $1 LIMIT 1")
            .bind(body.student_id)
            .fetch_optional(&pg)
            .await?;
    if student.is_none() {
        return breaks(Error::validation("student_id", "Student does not exist"));
    }
    let test = sqlx::query_as::<_, TestRow>("SELECT * FROM tests WHERE id = $1 LIMIT 1")
        .bind(body.test_id)
        .fetch_optional(&pg)
        .await?;
    if test.is_none() {
        return breaks(Error::validation("test_id", "Test does not exist"));
    }
    check_range(body.score)?;

    let duplicate = sqlx::query_as::<_, ScoreRow>(
        "SELECT * FROM test_scores WHERE student_id = $1 AND test_id = $2 LIMIT 1",
    )
    .bind(body.student_id)
    .bind(body.test_id)
    .fetch_optional(&pg)
    .await?;
    if duplicate.is_some() {
        return breaks(Error::validation(
            "test_id",
            "Test score already exists for this student and test",
        ));
    }

    let now = Utc::now();
    let res = sqlx::query(
        "INSERT INTO test_scores (student_id, test_id, score, date_taken) VALUES ($1, $2, $3, $4)",
    )
    .bind(body.student_id)
    .bind(body.test_id)
    .bind(body.score)
    .bind(now)
    .execute(&pg)
    .await
    .map_err(|e| {
        unique_violation(
            e,
            "test_id",
            "Test score already exists for this student and test",
        )
    })?;

    let view = ScoreView::load(
        &pg,
        ScoreRow {
            id: res.last_insert_rowid(),
            student_id: body.student_id,
            test_id: body.test_id,
            score: body.score,
            date_taken: now,
        },
    )
    .await?;
    creates(view)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScorePatch {
    pub score: i64,
}

/// PUT /test-scores/:id — mentor only; unknown ids 404 before the range
/// check.
pub async fn update_score(
    bearer: BearerHeader,
    Path(score_id): Path<i64>,
    Extension(pg): Extension<SqlitePool>,
    Json(patch): Json<ScorePatch>,
) -> Payload<ScoreView> {
    let account = bearer_account(bearer, &pg).await?;
    require_mentor(&pg, &account, "update test scores").await?;

    let row = sqlx::query_as::<_, ScoreRow>("SELECT * FROM test_scores WHERE id = $1 LIMIT 1")
        .bind(score_id)
        .fetch_optional(&pg)
        .await?;
    let mut row = match row {
        Some(row) => row,
        None => {
            return breaks(Error::not_found(format!(
                "No test score with id {}",
                score_id
            )))
        }
    };
    check_range(patch.score)?;

    sqlx::query("UPDATE test_scores SET score = $1 WHERE id = $2")
        .bind(patch.score)
        .bind(score_id)
        .execute(&pg)
        .await?;
    row.score = patch.score;

    proceeds(ScoreView::load(&pg, row).await?)
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreDeleted {
    pub message: String,
}

/// DELETE /test-scores/:id — mentor only; returns a confirmation message, not
/// the removed entity.
pub async fn delete_score(
    bearer: BearerHeader,
    Path(score_id): Path<i64>,
    Extension(pg): Extension<SqlitePool>,
) -> Payload<ScoreDeleted> {
    let account = bearer_account(bearer, &pg).await?;
    require_mentor(&pg, &account, "delete test scores").await?;

    let affected = sqlx::query("DELETE FROM test_scores WHERE id = $1")
        .bind(score_id)
        .execute(&pg)
        .await?;
    if affected.rows_affected() < 1 {
        return breaks(Error::not_found(format!(
            "No test score with id {}",
            score_id
        )));
    }
    proceeds(ScoreDeleted {
        message: "Test score deleted successfully".to_string(),
    })
}
