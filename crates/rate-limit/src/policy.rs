use snapgate_common::Environment;

/// Resolved per-request budget: at most `max_requests` within the trailing
/// `window_secs` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointBudget {
    pub max_requests: u64,
    pub window_secs: u64,
}

impl EndpointBudget {
    const fn new(max_requests: u64, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }
}

/// Stateless mapping from (path, method, auth state) to a budget.
///
/// Resolution is first-match-wins and total: every request resolves to some
/// finite budget, never "unlimited". The development multiplier is applied
/// after endpoint resolution so the relative strictness ordering across
/// endpoints is preserved.
pub struct EndpointPolicy {
    environment: Environment,
    auth_multiplier: u64,
    dev_multiplier: u64,
}

impl EndpointPolicy {
    pub fn new(environment: Environment, auth_multiplier: u64, dev_multiplier: u64) -> Self {
        Self {
            environment,
            auth_multiplier,
            dev_multiplier,
        }
    }

    pub fn limits_for(&self, path: &str, method: &str, authenticated: bool) -> EndpointBudget {
        let auth_scale = if authenticated { self.auth_multiplier } else { 1 };

        let base = if is_upload(path, method) {
            // Strictest tier; anonymous uploaders get half the budget.
            if authenticated {
                EndpointBudget::new(20, 600)
            } else {
                EndpointBudget::new(10, 600)
            }
        } else if path.starts_with("/auth") {
            // Fixed per-action budgets, identical regardless of auth state.
            auth_budget(path)
        } else if is_session_creation(path, method) {
            EndpointBudget::new(10 * auth_scale, 3600)
        } else if path.starts_with("/admin") {
            if authenticated {
                EndpointBudget::new(60, 3600)
            } else {
                EndpointBudget::new(2, 3600)
            }
        } else {
            EndpointBudget::new(100 * auth_scale, 3600)
        };

        if self.environment.is_development() {
            EndpointBudget::new(base.max_requests * self.dev_multiplier, base.window_secs)
        } else {
            base
        }
    }
}

fn is_upload(path: &str, method: &str) -> bool {
    method == "POST" && (path.contains("/photos") || path.contains("/upload"))
}

fn is_session_creation(path: &str, method: &str) -> bool {
    method == "POST" && (path == "/sessions" || path == "/sessions/")
}

fn auth_budget(path: &str) -> EndpointBudget {
    if path.starts_with("/auth/google/callback") {
        EndpointBudget::new(20, 300)
    } else if path.starts_with("/auth/google") {
        EndpointBudget::new(10, 300)
    } else if path.starts_with("/auth/logout") {
        EndpointBudget::new(30, 300)
    } else if path.starts_with("/auth/me") {
        EndpointBudget::new(120, 300)
    } else {
        EndpointBudget::new(50, 300)
    }
}
