use serde_json::{Map, Value};

/// An untyped entity snapshot returned by a remote collection.
pub type Snapshot = Map<String, Value>;

/// Fields never allowed to leave the lookup boundary.
pub const BLOCKED_FIELDS: &[&str] = &[
    "password",
    "is_staff",
    "is_superuser",
    "date_joined",
    "last_login",
];

pub fn strip_blocked(snapshot: &mut Snapshot) {
    for field in BLOCKED_FIELDS {
        snapshot.remove(*field);
    }
}

/// Classified result of one remote call. Every call resolves to exactly one variant;
/// nothing is thrown past the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Found(T),
    NotFound,
    RemoteError { status: u16, body: String },
    NetworkError(String),
    Malformed(String),
}

pub type LookupOutcome = Outcome<Snapshot>;
pub type ListOutcome = Outcome<Vec<Value>>;
pub type MutationOutcome = Outcome<Value>;

impl<T> Outcome<T> {
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        match self {
            Outcome::Found(v) => f(v),
            Outcome::NotFound => Outcome::NotFound,
            Outcome::RemoteError { status, body } => Outcome::RemoteError { status, body },
            Outcome::NetworkError(msg) => Outcome::NetworkError(msg),
            Outcome::Malformed(msg) => Outcome::Malformed(msg),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        self.and_then(|v| Outcome::Found(f(v)))
    }

    /// Human-readable failure reason, `None` for `Found`.
    pub fn reason(&self, collection: &str, target: &str) -> Option<String> {
        match self {
            Outcome::Found(_) => None,
            Outcome::NotFound => Some(format!("{} not found for ID {}", collection, target)),
            Outcome::RemoteError { status, body } => Some(format!(
                "{} service returned error {}: {}",
                collection, status, body
            )),
            Outcome::NetworkError(msg) => Some(format!(
                "Network error calling {} service for {}: {}",
                collection, target, msg
            )),
            Outcome::Malformed(msg) => Some(format!(
                "Malformed response from {} service for {}: {}",
                collection, target, msg
            )),
        }
    }

    /// Exactly one side is populated.
    pub fn into_parts(self, collection: &str, target: &str) -> (Option<T>, Option<String>) {
        let reason = self.reason(collection, target);
        match self {
            Outcome::Found(v) => (Some(v), None),
            _ => (None, reason),
        }
    }
}
