use rusqlite::{Connection, OptionalExtension, Result};

use crate::schema;

/// Creates `schema` on a fresh database. Returns false when the database was
/// created by an incompatible version.
pub fn ensure_schema(conn: &mut Connection, schema: &str) -> Result<bool> {
    trace!("trying to get schema version");

    conn.execute_batch(schema::META_SCHEMA)?;

    let schema_version: Option<u32> = conn
        .query_row(
            "SELECT value FROM MediaIndex WHERE key = 'schema'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match schema_version {
        Some(v) if v == schema::SCHEMA_VERSION => {
            trace!("schema version {} is current", v);
            Ok(true)
        }
        Some(v) => {
            error!(
                "schema version {} differs from {}, refusing to use the database",
                v,
                schema::SCHEMA_VERSION
            );
            Ok(false)
        }
        None => {
            info!("initializing schema version {}", schema::SCHEMA_VERSION);

            let tx = conn.transaction()?;
            tx.execute_batch(schema)?;
            tx.execute(
                "INSERT INTO MediaIndex (key, value) VALUES ('schema', ?)",
                [schema::SCHEMA_VERSION],
            )?;
            tx.commit()?;

            Ok(true)
        }
    }
}

pub fn schema_version(conn: &Connection) -> Result<Option<u32>> {
    conn.query_row(
        "SELECT value FROM MediaIndex WHERE key = 'schema'",
        [],
        |row| row.get(0),
    )
    .optional()
}
