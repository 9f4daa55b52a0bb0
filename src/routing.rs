//! Route table and access guard.
//!
//! Routes are gated on `is_authenticated` and the user's role. Nothing is
//! evaluated until the session has hydrated; before that every route
//! resolves to [`Guard::Loading`].

use crate::session::{Role, SessionSnapshot};
use tokio::sync::watch;

/// Every screen the client knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Register,
    Root,
    TeacherDashboard,
    CreateAssignment,
    AssignmentDetail { id: i64 },
    AssignmentStats { id: i64 },
    SubmissionReport { id: i64, submission_id: i64 },
    ExcelView { id: i64 },
    ClassReport { id: i64 },
    StudentDashboard,
    StudentAssignment { id: i64 },
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Self::Login => "/login".into(),
            Self::Register => "/register".into(),
            Self::Root => "/".into(),
            Self::TeacherDashboard => "/teacher".into(),
            Self::CreateAssignment => "/teacher/assignments/new".into(),
            Self::AssignmentDetail { id } => format!("/teacher/assignments/{id}"),
            Self::AssignmentStats { id } => format!("/teacher/assignments/{id}/stats"),
            Self::SubmissionReport { id, submission_id } => {
                format!("/teacher/assignments/{id}/submissions/{submission_id}/report")
            }
            Self::ExcelView { id } => format!("/teacher/assignments/{id}/excel"),
            Self::ClassReport { id } => format!("/teacher/assignments/{id}/class-report"),
            Self::StudentDashboard => "/student".into(),
            Self::StudentAssignment { id } => format!("/student/assignments/{id}"),
        }
    }

    /// Match a location path. Query strings and fragments are ignored.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let route = match segments.as_slice() {
            [] => Self::Root,
            ["login"] => Self::Login,
            ["register"] => Self::Register,
            ["teacher"] => Self::TeacherDashboard,
            ["teacher", "assignments", "new"] => Self::CreateAssignment,
            ["teacher", "assignments", id] => Self::AssignmentDetail { id: id.parse().ok()? },
            ["teacher", "assignments", id, "stats"] => Self::AssignmentStats { id: id.parse().ok()? },
            ["teacher", "assignments", id, "submissions", sid, "report"] => Self::SubmissionReport {
                id: id.parse().ok()?,
                submission_id: sid.parse().ok()?,
            },
            ["teacher", "assignments", id, "excel"] => Self::ExcelView { id: id.parse().ok()? },
            ["teacher", "assignments", id, "class-report"] => {
                Self::ClassReport { id: id.parse().ok()? }
            }
            ["student"] => Self::StudentDashboard,
            ["student", "assignments", id] => Self::StudentAssignment { id: id.parse().ok()? },
            _ => return None,
        };
        Some(route)
    }

    /// Role a user needs to enter this route. `None` for the public routes
    /// and the root dispatcher.
    pub fn required_role(&self) -> Option<Role> {
        match self {
            Self::Login | Self::Register | Self::Root => None,
            Self::StudentDashboard | Self::StudentAssignment { .. } => Some(Role::Student),
            _ => Some(Role::Teacher),
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Self::Login | Self::Register)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}

/// Landing route for a role.
pub fn home_for(role: Role) -> Route {
    match role {
        Role::Teacher => Route::TeacherDashboard,
        Role::Student => Route::StudentDashboard,
    }
}

/// Outcome of guarding a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Session not hydrated yet; show a placeholder.
    Loading,
    Render,
    Redirect(Route),
}

pub fn evaluate(route: &Route, session: &SessionSnapshot) -> Guard {
    if !session.hydrated {
        return Guard::Loading;
    }
    if route.is_public() {
        return Guard::Render;
    }
    if !session.is_authenticated {
        return Guard::Redirect(Route::Login);
    }
    match (route, route.required_role(), session.role()) {
        (Route::Root, _, Some(role)) => Guard::Redirect(home_for(role)),
        (Route::Root, _, None) => Guard::Redirect(Route::Login),
        (_, Some(required), Some(role)) if required != role => Guard::Redirect(Route::Root),
        _ => Guard::Render,
    }
}

/// Follow redirects to the route that finally renders. `None` while the
/// session is still loading.
pub fn resolve(route: Route, session: &SessionSnapshot) -> Option<Route> {
    const MAX_HOPS: usize = 4;
    let mut current = route;
    for _ in 0..MAX_HOPS {
        match evaluate(&current, session) {
            Guard::Loading => return None,
            Guard::Render => return Some(current),
            Guard::Redirect(next) => current = next,
        }
    }
    Some(Route::Login)
}

/// Current navigation target. Redirects are hard: whatever was showing is
/// replaced.
pub struct Navigator {
    target: watch::Sender<Route>,
}

impl Navigator {
    pub fn new(initial: Route) -> Self {
        let (target, _) = watch::channel(initial);
        Self { target }
    }

    pub fn redirect(&self, route: Route) {
        tracing::debug!(to = %route, "Navigating");
        self.target.send_replace(route);
    }

    pub fn current(&self) -> Route {
        *self.target.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Route> {
        self.target.subscribe()
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(Route::Root)
    }
}
