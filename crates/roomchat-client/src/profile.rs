//! Local user profile bootstrap.

use tracing::info;
use uuid::Uuid;

use roomchat_shared::constants::DEFAULT_DISPLAY_NAME;
use roomchat_store::{Database, StoreError, UserProfile};

/// Return the stored profile, creating it on first launch.
///
/// A new profile gets a fresh user id and the first available name out of
/// `display_name`, the host name, and `"User"`.
pub fn load_or_create(db: &Database, display_name: Option<&str>) -> Result<UserProfile, StoreError> {
    match db.get_profile() {
        Ok(profile) => Ok(profile),
        Err(StoreError::NotFound) => {
            let profile = UserProfile {
                user_id: Uuid::new_v4().to_string(),
                display_name: display_name
                    .map(str::to_string)
                    .or_else(host_name)
                    .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
            };
            db.save_profile(&profile)?;
            info!(user_id = %profile.user_id, name = %profile.display_name, "Created profile");
            Ok(profile)
        }
        Err(e) => Err(e),
    }
}

/// Persist a new display name.  Blank names are refused.
pub fn rename(db: &Database, display_name: &str) -> Result<UserProfile, StoreError> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return db.get_profile();
    }
    db.update_display_name(display_name)?;
    info!(name = %display_name, "Renamed profile");
    db.get_profile()
}

fn host_name() -> Option<String> {
    ["HOSTNAME", "COMPUTERNAME"]
        .into_iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_once() {
        let db = Database::open_in_memory().unwrap();
        let first = load_or_create(&db, Some("Ana")).unwrap();
        assert_eq!(first.display_name, "Ana");

        let again = load_or_create(&db, Some("Someone else")).unwrap();
        assert_eq!(again, first);
    }

    #[test]
    fn test_fallback_name_is_never_blank() {
        let db = Database::open_in_memory().unwrap();
        let profile = load_or_create(&db, None).unwrap();
        assert!(!profile.display_name.is_empty());
        assert!(Uuid::parse_str(&profile.user_id).is_ok());
    }

    #[test]
    fn test_rename_keeps_user_id() {
        let db = Database::open_in_memory().unwrap();
        let before = load_or_create(&db, Some("Ana")).unwrap();

        let after = rename(&db, "  Bea ").unwrap();
        assert_eq!(after.display_name, "Bea");
        assert_eq!(after.user_id, before.user_id);

        let unchanged = rename(&db, "   ").unwrap();
        assert_eq!(unchanged.display_name, "Bea");
    }
}
