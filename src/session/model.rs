//! Session data types.

use serde::{Deserialize, Serialize};

/// Account role. Decides which half of the route table a user may enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::Student => "student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "teacher" => Ok(Self::Teacher),
            "student" => Ok(Self::Student),
            other => Err(format!("unknown role '{other}' (expected teacher or student)")),
        }
    }
}

/// The logged-in account as returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub class_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

/// Point-in-time view of the session, as seen by observers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub token: Option<String>,
    pub is_authenticated: bool,
    /// Latches to `true` once per process; never goes back.
    pub hydrated: bool,
}

impl SessionSnapshot {
    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().map(|u| u.role)
    }
}

/// Input for [`SessionStore::register`](super::SessionStore::register).
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub role: Role,
    pub invite_code: String,
    /// Required for students, ignored for teachers.
    pub student_id: Option<String>,
}

/// Wire body for `POST /auth/register`.
#[derive(Debug, Serialize)]
pub(crate) struct RegisterBody<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub role: Role,
    pub invite_code: &'a str,
    pub student_id: Option<&'a str>,
}

/// Wire body of a successful `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub access_token: String,
    pub user: User,
}
