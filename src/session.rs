use tracing::{info, warn};

use crate::error::{DashboardError, Result};
use crate::model::User;
use crate::store::EntityStore;

/// Sign in as the user whose email and password match exactly.
pub fn login(store: &EntityStore, email: &str, password: &str) -> Result<User> {
    let email = email.trim();
    let user = store
        .users()
        .iter()
        .find(|u| u.email == email && u.password == password)
        .cloned()
        .ok_or_else(|| DashboardError::validation("Invalid email or password"))?;
    store.persistence().set_current_user_id(Some(user.id))?;
    info!("User #{} signed in", user.id);
    Ok(user)
}

/// The signed-in user, if any. A pointer to a deleted user is cleared.
pub fn current_user(store: &EntityStore) -> Result<Option<User>> {
    let Some(id) = store.persistence().current_user_id() else {
        return Ok(None);
    };
    match store.user(id) {
        Some(user) => Ok(Some(user.clone())),
        None => {
            warn!("Session pointed at deleted user #{}, clearing", id);
            store.persistence().set_current_user_id(None)?;
            Ok(None)
        }
    }
}

pub fn logout(store: &EntityStore) -> Result<()> {
    store.persistence().set_current_user_id(None)
}
