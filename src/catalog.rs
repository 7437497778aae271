use axum::extract::Path;
use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, Json, TypedHeader};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::auth::{bearer_account, require_mentor};
use crate::err::unique_violation;
use crate::models::TestRow;
use crate::{breaks, creates, proceeds, Error, Payload};

type BearerHeader = Option<TypedHeader<Authorization<Bearer>>>;

#[derive(Debug, Clone, Serialize)]
pub struct TestList {
    pub tests: Vec<TestRow>,
}

/// GET /tests — any authenticated caller, newest first.
pub async fn list_tests(
    bearer: BearerHeader,
    Extension(pg): Extension<SqlitePool>,
) -> Payload<TestList> {
    bearer_account(bearer, &pg).await?;
    let tests =
        sqlx::query_as::<_, TestRow>("SELECT * FROM tests ORDER BY created_at DESC, id DESC")
            .fetch_all(&pg)
            .await?;
    proceeds(TestList { tests })
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestInput {
    pub name: String,
    pub description: String,
}

async fn name_clash(pg: &SqlitePool, name: &str, exclude_id: Option<i64>) -> Result<bool, Error> {
    let clash = match exclude_id {
        Some(id) => {
            sqlx::query_as::<_, TestRow>(
                "SELECT * FROM tests WHERE name = $1 COLLATE NOCASE AND id != $2 LIMIT 1",
            )
            .bind(name)
            .bind(id)
            .fetch_optional(pg)
            .await?
        }
        None => {
            sqlx::query_as::<_, TestRow>("SELECT * FROM tests WHERE name = $1 COLLATE NOCASE LIMIT 1")
                .bind(name)
                .fetch_optional(pg)
                .await?
        }
    };
    Ok(clash.is_some())
}

/// POST /tests — mentor only.
pub async fn create_test(
    bearer: BearerHeader,
    Extension(pg): Extension<SqlitePool>,
    Json(test): Json<TestInput>,
) -> Payload<TestRow> {
    let account = bearer_account(bearer, &pg).await?;
    require_mentor(&pg, &account, "create tests").await?;

    if test.name.is_empty() {
        return breaks(Error::validation("name", "This field may not be blank"));
    }
    if name_clash(&pg, &test.name, None).await? {
        return breaks(Error::validation(
            "name",
            "A test with this name already exists",
        ));
    }

    let now = Utc::now();
    let res = sqlx::query(
        "INSERT INTO tests (name, description, created_at, updated_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(&test.name)
    .bind(&test.description)
    .bind(now)
    .bind(now)
    .execute(&pg)
    .await
    .map_err(|e| unique_violation(e, "name", "A test with this name already exists"))?;

    creates(TestRow {
        id: res.last_insert_rowid(),
        name: test.name,
        description: test.description,
        created_at: now,
        updated_at: now,
    })
}

/// PUT /tests/:id — mentor only; the clash check skips the record itself so a
/// test can be re-saved under its own name.
pub async fn update_test(
    bearer: BearerHeader,
    Path(test_id): Path<i64>,
    Extension(pg): Extension<SqlitePool>,
    Json(test): Json<TestInput>,
) -> Payload<TestRow> {
    let account = bearer_account(bearer, &pg).await?;
    require_mentor(&pg, &account, "update tests").await?;

    let existing = sqlx::query_as::<_, TestRow>("SELECT * FROM tests WHERE id = $1 LIMIT 1")
        .bind(test_id)
        .fetch_optional(&pg)
        .await?;
    let existing = match existing {
        Some(existing) => existing,
        None => return breaks(Error::not_found(format!("No test with id {}", test_id))),
    };

    if test.name.is_empty() {
        return breaks(Error::validation("name", "This field may not be blank"));
    }
    if name_clash(&pg, &test.name, Some(test_id)).await? {
        return breaks(Error::validation(
            "name",
            "A test with this name already exists",
        ));
    }

    let now = Utc::now();
    sqlx::query("UPDATE tests SET name = $1, description = $2, updated_at = $3 WHERE id = $4")
        .bind(&test.name)
        .bind(&test.description)
        .bind(now)
        .bind(test_id)
        .execute(&pg)
        .await
        .map_err(|e| unique_violation(e, "name", "A test with this name already exists"))?;

    proceeds(TestRow {
        id: test_id,
        name: test.name,
        description: test.description,
        created_at: existing.created_at,
        updated_at: now,
    })
}
