//! The single-row local user profile.

use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::UserProfile;

impl Database {
    pub fn get_profile(&self) -> Result<UserProfile> {
        self.conn()
            .query_row(
                "SELECT user_id, display_name FROM profile WHERE id = 1",
                [],
                |row| {
                    Ok(UserProfile {
                        user_id: row.get(0)?,
                        display_name: row.get(1)?,
                    })
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO profile (id, user_id, display_name) VALUES (1, ?1, ?2)",
            params![profile.user_id, profile.display_name],
        )?;
        Ok(())
    }

    /// Change the display name, keeping the user id.
    pub fn update_display_name(&self, display_name: &str) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE profile SET display_name = ?1 WHERE id = 1",
            params![display_name],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
