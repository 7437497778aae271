use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, Json, TypedHeader};
use chrono::Utc;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand::{thread_rng, Rng};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::err::unique_violation;
use crate::models::{Account, MentorRow, StudentRow, TokenRow};
use crate::{breaks, creates, proceeds, Error, Payload};

/// Role of an authenticated account, with its profile row.
///
/// Resolution order is fixed: the student table is consulted before the
/// mentor table, so an account erroneously linked to both always resolves
/// as a student.
#[derive(Debug, Clone)]
pub enum Role {
    Student(StudentRow),
    Mentor(MentorRow),
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Student(_) => "student",
            Role::Mentor(_) => "mentor",
        }
    }

    pub fn profile_id(&self) -> i64 {
        match self {
            Role::Student(student) => student.id,
            Role::Mentor(mentor) => mentor.id,
        }
    }
}

pub async fn resolve_role(pg: &SqlitePool, account_id: i64) -> Result<Option<Role>, Error> {
    let student = sqlx::query_as::<_, StudentRow>(
        "SELECT * FROM student_profiles WHERE account_id = $1 LIMIT 1",
    )
    .bind(account_id)
    .fetch_optional(pg)
    .await?;
    if let Some(student) = student {
        return Ok(Some(Role::Student(student)));
    }

    let mentor = sqlx::query_as::<_, MentorRow>(
        "SELECT * FROM mentor_profiles WHERE account_id = $1 LIMIT 1",
    )
    .bind(account_id)
    .fetch_optional(pg)
    .await?;
    Ok(mentor.map(Role::Mentor))
}

/// Resolves the bearer token on a protected route to its account.
pub async fn bearer_account(
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    pg: &SqlitePool,
) -> Result<Account, Error> {
    let key = match &bearer {
        Some(TypedHeader(header)) => header.token().to_string(),
        None => {
            return Err(Error::Unauthorized {
                message: "Authentication credentials were not provided".to_string(),
            })
        }
    };

    let account = sqlx::query_as::<_, Account>(
        "SELECT a.* FROM accounts a JOIN tokens t ON t.account_id = a.id WHERE t.key = $1 LIMIT 1",
    )
    .bind(&key)
    .fetch_optional(pg)
    .await?;

    match account {
        Some(account) if account.is_active => Ok(account),
        Some(_) => Err(Error::Unauthorized {
            message: "User account is disabled".to_string(),
        }),
        None => Err(Error::Unauthorized {
            message: "Invalid token".to_string(),
        }),
    }
}

pub async fn is_mentor(pg: &SqlitePool, account_id: i64) -> Result<bool, Error> {
    let found = sqlx::query_as::<_, MentorRow>(
        "SELECT * FROM mentor_profiles WHERE account_id = $1 LIMIT 1",
    )
    .bind(account_id)
    .fetch_optional(pg)
    .await?;
    Ok(found.is_some())
}

pub async fn require_mentor(
    pg: &SqlitePool,
    account: &Account,
    action: &str,
) -> Result<MentorRow, Error> {
    let mentor = sqlx::query_as::<_, MentorRow>(
        "SELECT * FROM mentor_profiles WHERE account_id = $1 LIMIT 1",
    )
    .bind(account.id)
    .fetch_optional(pg)
    .await?;
    mentor.ok_or_else(|| Error::Forbidden {
        message: format!("Only mentors can {}", action),
    })
}

pub fn hash_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Pbkdf2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, stored: &str) -> Result<bool, Error> {
    let hash = PasswordHash::new(stored).map_err(Error::from)?;
    Ok(Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok())
}

/// Get-or-create: an account that already holds a token keeps it, so repeated
/// logins never leave multiple valid tokens behind.
pub async fn issue_token(pg: &SqlitePool, account_id: i64) -> Result<String, Error> {
    let existing =
        sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE account_id = $1 LIMIT 1")
            .bind(account_id)
            .fetch_optional(pg)
            .await?;
    if let Some(existing) = existing {
        return Ok(existing.key);
    }

    let key_bytes: [u8; 32] = thread_rng().gen();
    let mut hasher: Sha256 = Digest::new();
    hasher.update(key_bytes);
    let key = hex::encode(hasher.finalize());

    let inserted = sqlx::query("INSERT INTO tokens VALUES ($1, $2, $3)")
        .bind(&key)
        .bind(account_id)
        .bind(Utc::now())
        .execute(pg)
        .await;
    if let Err(err) = inserted {
        // A racing first login can beat us to the insert; the account UNIQUE
        // constraint keeps one token per account, so hand back the winner's.
        if matches!(&err, sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed"))
        {
            let winner = sqlx::query_as::<_, TokenRow>(
                "SELECT * FROM tokens WHERE account_id = $1 LIMIT 1",
            )
            .bind(account_id)
            .fetch_one(pg)
            .await?;
            return Ok(winner.key);
        }
        return Err(err.into());
    }
    Ok(key)
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterStudent {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub leetcode: String,
    pub github: String,
    pub photo: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredStudent {
    pub message: String,
    pub token: String,
    pub user_id: i64,
    pub student_id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterMentor {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub expertise: String,
    pub github: String,
    pub photo: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredMentor {
    pub message: String,
    pub token: String,
    pub user_id: i64,
    pub mentor_id: i64,
    pub username: String,
}

fn check_credentials(username: &str, email: &str, password: &str) -> Result<(), Error> {
    if username.is_empty() {
        return Err(Error::validation("username", "This field may not be blank"));
    }
    if email.is_empty() {
        return Err(Error::validation("email", "This field may not be blank"));
    }
    if !email.contains('@') {
        return Err(Error::validation("email", "Enter a valid email address"));
    }
    if password.len() < 6 {
        return Err(Error::validation(
            "password",
            "Ensure this field has at least 6 characters",
        ));
    }
    Ok(())
}

async fn check_account_free(pg: &SqlitePool, username: &str, email: &str) -> Result<(), Error> {
    let taken = sqlx::query_as::<_, Account>(
        "SELECT * FROM accounts WHERE username = $1 OR email = $2 LIMIT 1",
    )
    .bind(username)
    .bind(email)
    .fetch_optional(pg)
    .await?;
    if taken.is_some() {
        return Err(Error::validation(
            "username",
            "A user with that username or email already exists",
        ));
    }
    Ok(())
}

pub async fn register_student(
    Extension(pg): Extension<SqlitePool>,
    Json(student): Json<RegisterStudent>,
) -> Payload<RegisteredStudent> {
    check_credentials(&student.username, &student.email, &student.password)?;
    check_account_free(&pg, &student.username, &student.email).await?;

    let password_hash = hash_password(&student.password)?;
    let now = Utc::now();

    // Account and profile succeed or roll back together, so a failed profile
    // insert never strands an orphaned account.
    let mut tx = pg.begin().await?;
    let res = sqlx::query(
        "INSERT INTO accounts (username, email, password_hash, first_name, last_name, is_active, created_at)
         VALUES ($1, $2, $3, $4, $5, 1, $6)",
    )
    .bind(&student.username)
    .bind(&student.email)
    .bind(&password_hash)
    .bind(student.first_name.clone().unwrap_or_default())
    .bind(student.last_name.clone().unwrap_or_default())
    .bind(now)
    .execute(&mut tx)
    .await
    .map_err(|e| {
        unique_violation(e, "username", "A user with that username or email already exists")
    })?;
    let user_id = res.last_insert_rowid();

    let res = sqlx::query(
        "INSERT INTO student_profiles (account_id, leetcode, github, date_joined, photo, bio)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(user_id)
    .bind(&student.leetcode)
    .bind(&student.github)
    .bind(now)
    .bind(&student.photo)
    .bind(&student.bio)
    .execute(&mut tx)
    .await?;
    let student_id = res.last_insert_rowid();
    tx.commit().await?;

    let token = issue_token(&pg, user_id).await?;
    creates(RegisteredStudent {
        message: "Student registered successfully".to_string(),
        token,
        user_id,
        student_id,
        username: student.username,
    })
}

pub async fn register_mentor(
    Extension(pg): Extension<SqlitePool>,
    Json(mentor): Json<RegisterMentor>,
) -> Payload<RegisteredMentor> {
    check_credentials(&mentor.username, &mentor.email, &mentor.password)?;
    check_account_free(&pg, &mentor.username, &mentor.email).await?;

    let password_hash = hash_password(&mentor.password)?;
    let now = Utc::now();

    let mut tx = pg.begin().await?;
    let res = sqlx::query(
        "INSERT INTO accounts (username, email, password_hash, first_name, last_name, is_active, created_at)
         VALUES ($1, $2, $3, $4, $5, 1, $6)",
    )
    .bind(&mentor.username)
    .bind(&mentor.email)
    .bind(&password_hash)
    .bind(mentor.first_name.clone().unwrap_or_default())
    .bind(mentor.last_name.clone().unwrap_or_default())
    .bind(now)
    .execute(&mut tx)
    .await
    .map_err(|e| {
        unique_violation(e, "username", "A user with that username or email already exists")
    })?;
    let user_id = res.last_insert_rowid();

    let res = sqlx::query(
        "INSERT INTO mentor_profiles (account_id, expertise, github, date_joined, photo, bio)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(user_id)
    .bind(&mentor.expertise)
    .bind(&mentor.github)
    .bind(now)
    .bind(&mentor.photo)
    .bind(&mentor.bio)
    .execute(&mut tx)
    .await?;
    let mentor_id = res.last_insert_rowid();
    tx.commit().await?;

    let token = issue_token(&pg, user_id).await?;
    creates(RegisteredMentor {
        message: "Mentor registered successfully".to_string(),
        token,
        user_id,
        mentor_id,
        username: mentor.username,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct Login {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedIn {
    pub message: String,
    pub token: String,
    pub user_id: i64,
    pub role: &'static str,
    pub profile_id: i64,
    pub username: String,
}

pub async fn login(
    Extension(pg): Extension<SqlitePool>,
    Json(login): Json<Login>,
) -> Payload<LoggedIn> {
    if login.username.is_empty() || login.password.is_empty() {
        return breaks(Error::validation(
            "username",
            "Must include username and password",
        ));
    }

    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE username = $1 LIMIT 1")
        .bind(&login.username)
        .fetch_optional(&pg)
        .await?;
    let account = match account {
        Some(account) => account,
        None => {
            return breaks(Error::AuthenticationFailure {
                message: "Invalid credentials".to_string(),
            })
        }
    };

    if !verify_password(&login.password, &account.password_hash)? {
        return breaks(Error::AuthenticationFailure {
            message: "Invalid credentials".to_string(),
        });
    }
    if !account.is_active {
        return breaks(Error::AuthenticationFailure {
            message: "User account is disabled".to_string(),
        });
    }

    // Bad credentials and a roleless account are distinct failures: the
    // latter authenticated fine but cannot use the portal.
    let role = match resolve_role(&pg, account.id).await? {
        Some(role) => role,
        None => {
            return breaks(Error::NoRole {
                message: "User is neither a student nor a mentor".to_string(),
            })
        }
    };

    let token = issue_token(&pg, account.id).await?;
    proceeds(LoggedIn {
        message: "Login successful".to_string(),
        token,
        user_id: account.id,
        role: role.name(),
        profile_id: role.profile_id(),
        username: account.username,
    })
}
