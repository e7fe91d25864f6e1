use tracing::info;

use crate::error::TemplateError;
use crate::store::{self, Database};

use super::model::{Profile, TemplateVersion};

/// Create a profile with a unique, non-blank name.
pub fn create_profile(db: &Database, name: &str) -> Result<Profile, TemplateError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TemplateError::Invalid("Profile name must not be empty.".into()));
    }

    db.with_conn(|conn| {
        if store::profiles::find_profile_by_name(conn, name)?.is_some() {
            return Err(TemplateError::Invalid(format!(
                "A profile named '{name}' already exists."
            )));
        }

        let profile = Profile {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: store::now_timestamp(),
        };
        store::profiles::insert_profile(conn, &profile)?;

        info!(profile_id = %profile.id, name, "Created profile");
        Ok(profile)
    })
}

pub fn list_profiles(db: &Database) -> Result<Vec<Profile>, TemplateError> {
    db.with_conn(|conn| Ok(store::profiles::list_profiles(conn)?))
}

/// Load the active template version of a profile.
pub fn active_version(db: &Database, profile_id: &str) -> Result<TemplateVersion, TemplateError> {
    db.with_conn(|conn| {
        if store::profiles::get_profile(conn, profile_id)?.is_none() {
            return Err(TemplateError::NotFound(format!(
                "Profile not found: {profile_id}"
            )));
        }
        store::templates::load_active_version(conn, profile_id)?.ok_or_else(|| {
            TemplateError::NotFound("No active template version found for this profile.".into())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_list_profiles() {
        let db = Database::open_in_memory().unwrap();
        create_profile(&db, "Skin").unwrap();
        create_profile(&db, "  Bone ").unwrap();

        let names: Vec<_> = list_profiles(&db)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["Bone", "Skin"]);
    }

    #[test]
    fn test_duplicate_profile_rejected() {
        let db = Database::open_in_memory().unwrap();
        create_profile(&db, "Skin").unwrap();

        let err = create_profile(&db, "Skin").unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_active_version_missing() {
        let db = Database::open_in_memory().unwrap();
        let profile = create_profile(&db, "Skin").unwrap();

        let err = active_version(&db, &profile.id).unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(_)));
        assert!(matches!(
            active_version(&db, "nope").unwrap_err(),
            TemplateError::NotFound(_)
        ));
    }
}
