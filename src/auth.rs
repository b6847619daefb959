use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// The signed-in user. Credentials are never checked against a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserInfo {
    pub email: String,
    pub name: String,
}

/// Fields of the sign-up form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Local login state.
#[derive(Debug, Default)]
pub struct Session {
    user: Option<UserInfo>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log in with any non-empty email and password.
    pub fn login(&mut self, email: &str, password: &str) -> Result<&UserInfo> {
        let email = required("email", email)?;
        required("password", password)?;

        let name = email.split('@').next().unwrap_or(email).to_string();
        tracing::info!("Session started for {}", email);
        Ok(&*self.user.insert(UserInfo {
            email: email.to_string(),
            name,
        }))
    }

    pub fn signup(&mut self, form: &SignupForm) -> Result<&UserInfo> {
        let name = required("name", &form.name)?;
        let email = required("email", &form.email)?;
        required("password", &form.password)?;
        if form.password != form.confirm_password {
            return Err(TrackerError::Validation("passwords do not match".to_string()));
        }

        tracing::info!("Account created for {}", email);
        Ok(&*self.user.insert(UserInfo {
            email: email.to_string(),
            name: name.to_string(),
        }))
    }

    pub fn logout(&mut self) {
        if let Some(user) = self.user.take() {
            tracing::info!("Session ended for {}", user.email);
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    /// Return the user if a session exists.
    pub fn validate_session(&self) -> Result<&UserInfo> {
        self.user.as_ref().ok_or(TrackerError::Unauthorized)
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TrackerError::Validation(format!("{} is required", field)));
    }
    Ok(value)
}
