//! Local password requirements. Synchronous, no I/O.

use std::collections::BTreeMap;

use serde::Deserialize;
use warden_common::Requirement;
use warden_common::constants::messages;

/// Characters that satisfy the special-character requirement
pub const SPECIAL_CHARACTERS: &str = "~`!@#$%^&*()_=-+/?><\\|{}[].,";

/// Account details the candidate must not contain
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserContext {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserContext {
    pub fn new(username: Option<String>, email: Option<String>) -> Self {
        Self { username, email }
    }
}

/// Outcome of the local requirements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalReport {
    pub results: BTreeMap<Requirement, bool>,
    pub errors: Vec<String>,
}

impl LocalReport {
    /// Qualifies for the remote breach check
    pub fn all_passed(&self) -> bool {
        self.results.values().all(|passed| *passed)
    }

    pub fn passed(&self, requirement: Requirement) -> bool {
        self.results.get(&requirement).copied().unwrap_or(false)
    }
}

pub fn length_message(min_length: usize) -> String {
    format!("Password must be at least {} characters long", min_length)
}

/// Evaluate every local requirement against `value`
pub fn evaluate_local(value: &str, user: &UserContext, min_length: usize) -> LocalReport {
    let mut results = BTreeMap::new();
    let mut errors = Vec::new();

    let mut check = |requirement: Requirement, passed: bool, message: String| {
        results.insert(requirement, passed);
        if !passed {
            errors.push(message);
        }
    };

    check(
        Requirement::Length,
        value.chars().count() >= min_length,
        length_message(min_length),
    );
    check(
        Requirement::Uppercase,
        value.chars().any(|c| c.is_ascii_uppercase()),
        messages::UPPERCASE.to_string(),
    );
    check(
        Requirement::Lowercase,
        value.chars().any(|c| c.is_ascii_lowercase()),
        messages::LOWERCASE.to_string(),
    );
    check(
        Requirement::Number,
        value.chars().any(|c| c.is_ascii_digit()),
        messages::NUMBER.to_string(),
    );
    check(
        Requirement::Special,
        value.chars().any(|c| SPECIAL_CHARACTERS.contains(c)),
        messages::SPECIAL.to_string(),
    );

    let personal = personal_info_violations(value, user);
    results.insert(Requirement::NoPersonalInfo, personal.is_empty());
    errors.extend(personal.into_iter().map(str::to_string));

    LocalReport { results, errors }
}

/// Case-insensitive containment of the username, the email, or its local part
fn personal_info_violations(value: &str, user: &UserContext) -> Vec<&'static str> {
    let value = value.to_lowercase();
    let mut violations = Vec::new();

    if let Some(username) = user.username.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        if value.contains(&username.to_lowercase()) {
            violations.push(messages::CONTAINS_USERNAME);
        }
    }

    if let Some(email) = user.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        let email = email.to_lowercase();
        let local_part = email.split('@').next().unwrap_or_default();
        let leaks_local = !local_part.is_empty() && value.contains(local_part);
        if leaks_local || value.contains(&email) {
            violations.push(messages::CONTAINS_EMAIL);
        }
    }

    violations
}
