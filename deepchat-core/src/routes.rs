//! Navigation targets and the auth guard in front of them.

use std::fmt;
use std::str::FromStr;

use crate::error::DeepchatError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Dashboard,
    Chat(String),
    Analysis(String),
}

impl Route {
    /// Everything except the login page needs an identity.
    pub fn is_protected(&self) -> bool {
        !matches!(self, Route::Login)
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Route::Chat(id) | Route::Analysis(id) => Some(id),
            Route::Login | Route::Dashboard => None,
        }
    }

    /// Where a navigation to `self` actually lands.
    pub fn resolve(self, authenticated: bool) -> Route {
        match (self, authenticated) {
            (route, false) if route.is_protected() => Route::Login,
            (Route::Login, true) => Route::Dashboard,
            (route, _) => route,
        }
    }

    /// Where to go after a call made from this route failed, if anywhere.
    ///
    /// An expired session always returns to login. A session page whose
    /// session could not be loaded falls back to the dashboard.
    pub fn after_load_error(&self, error: &DeepchatError) -> Option<Route> {
        match (self, error) {
            (_, DeepchatError::SessionExpired) => Some(Route::Login),
            (Route::Chat(_) | Route::Analysis(_), _) => Some(Route::Dashboard),
            _ => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Login => write!(f, "/login"),
            Route::Dashboard => write!(f, "/dashboard"),
            Route::Chat(id) => write!(f, "/chat/{}", id),
            Route::Analysis(id) => write!(f, "/analysis/{}", id),
        }
    }
}

impl FromStr for Route {
    type Err = DeepchatError;

    /// Parses `/login`, `/dashboard`, `/chat/{id}` and `/analysis/{id}`.
    /// The root path is the dashboard.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.trim().trim_matches('/').split('/').collect();
        match segments.as_slice() {
            [""] | ["dashboard"] => Ok(Route::Dashboard),
            ["login"] => Ok(Route::Login),
            ["chat", id] if !id.is_empty() => Ok(Route::Chat((*id).to_string())),
            ["analysis", id] if !id.is_empty() => Ok(Route::Analysis((*id).to_string())),
            _ => Err(DeepchatError::Validation(format!("unknown route: {}", s))),
        }
    }
}
