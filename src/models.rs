use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::Error;

/// Identity Store row. Never serialized directly (it carries the password
/// hash); public fields go out through [`AccountView`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StudentRow {
    pub id: i64,
    pub account_id: i64,
    pub leetcode: String,
    pub github: String,
    pub date_joined: DateTime<Utc>,
    pub photo: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MentorRow {
    pub id: i64,
    pub account_id: i64,
    pub expertise: String,
    pub github: String,
    pub date_joined: DateTime<Utc>,
    pub photo: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TestRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScoreRow {
    pub id: i64,
    pub student_id: i64,
    pub test_id: i64,
    pub score: i64,
    pub date_taken: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TokenRow {
    pub key: String,
    pub account_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl AccountView {
    pub fn of(account: Account) -> Self {
        Self {
            id: account.id,
            username: account.username,
            email: account.email,
            first_name: account.first_name,
            last_name: account.last_name,
        }
    }

    pub async fn load(pg: &SqlitePool, account_id: i64) -> Result<Self, Error> {
        let account =
            sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1 LIMIT 1")
                .bind(account_id)
                .fetch_optional(pg)
                .await?
                .ok_or_else(|| Error::InternalError {
                    kind: "DataIntegrity",
                    message: format!("Profile references missing account {}", account_id),
                })?;
        Ok(Self::of(account))
    }
}

/// A ledger entry with its test embedded, as returned inside student profiles
/// and from the score endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreView {
    pub id: i64,
    pub test: TestRow,
    pub score: i64,
    pub date_taken: DateTime<Utc>,
}

impl ScoreView {
    pub async fn load(pg: &SqlitePool, row: ScoreRow) -> Result<Self, Error> {
        let test = sqlx::query_as::<_, TestRow>("SELECT * FROM tests WHERE id = $1 LIMIT 1")
            .bind(row.test_id)
            .fetch_optional(pg)
            .await?
            .ok_or_else(|| Error::InternalError {
                kind: "DataIntegrity",
                message: format!("Score references missing test {}", row.test_id),
            })?;
        Ok(Self {
            id: row.id,
            test,
            score: row.score,
            date_taken: row.date_taken,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentProfileView {
    pub id: i64,
    pub user: AccountView,
    pub leetcode: String,
    pub github: String,
    pub date_joined: DateTime<Utc>,
    pub photo: Option<String>,
    pub bio: Option<String>,
    pub test_scores: Vec<ScoreView>,
}

impl StudentProfileView {
    pub async fn load(pg: &SqlitePool, row: StudentRow) -> Result<Self, Error> {
        let user = AccountView::load(pg, row.account_id).await?;
        let scores = sqlx::query_as::<_, ScoreRow>(
            "SELECT * FROM test_scores WHERE student_id = $1 ORDER BY id",
        )
        .bind(row.id)
        .fetch_all(pg)
        .await?;
        let mut test_scores = Vec::with_capacity(scores.len());
        for score in scores {
            test_scores.push(ScoreView::load(pg, score).await?);
        }
        Ok(Self {
            id: row.id,
            user,
            leetcode: row.leetcode,
            github: row.github,
            date_joined: row.date_joined,
            photo: row.photo,
            bio: row.bio,
            test_scores,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MentorProfileView {
    pub id: i64,
    pub user: AccountView,
    pub expertise: String,
    pub github: String,
    pub date_joined: DateTime<Utc>,
    pub photo: Option<String>,
    pub bio: Option<String>,
}

impl MentorProfileView {
    pub async fn load(pg: &SqlitePool, row: MentorRow) -> Result<Self, Error> {
        let user = AccountView::load(pg, row.account_id).await?;
        Ok(Self {
            id: row.id,
            user,
            expertise: row.expertise,
            github: row.github,
            date_joined: row.date_joined,
            photo: row.photo,
            bio: row.bio,
        })
    }
}
