//! Profile rows.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::template::Profile;

fn profile_from_row(row: &Row) -> Result<Profile, rusqlite::Error> {
    Ok(Profile {
        id: row.get("id")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
    })
}

pub fn insert_profile(conn: &Connection, profile: &Profile) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO profiles (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![profile.id, profile.name, profile.created_at],
    )?;
    Ok(())
}

pub fn get_profile(conn: &Connection, id: &str) -> Result<Option<Profile>, StoreError> {
    let profile = conn
        .query_row(
            "SELECT id, name, created_at FROM profiles WHERE id = ?1",
            params![id],
            profile_from_row,
        )
        .optional()?;
    Ok(profile)
}

pub fn find_profile_by_name(conn: &Connection, name: &str) -> Result<Option<Profile>, StoreError> {
    let profile = conn
        .query_row(
            "SELECT id, name, created_at FROM profiles WHERE name = ?1",
            params![name],
            profile_from_row,
        )
        .optional()?;
    Ok(profile)
}

/// All profiles ordered by name.
pub fn list_profiles(conn: &Connection) -> Result<Vec<Profile>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, name, created_at FROM profiles ORDER BY name")?;
    let profiles = stmt
        .query_map([], profile_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(profiles)
}
