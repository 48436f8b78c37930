use crate::domain::model::{Image, NewPlace, Place, PlaceWithImages};
use crate::utils::error::{PlacesError, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS places (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description_short TEXT NOT NULL DEFAULT '',
    description_long TEXT NOT NULL DEFAULT '',
    lng REAL NOT NULL,
    lat REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    place_id INTEGER NOT NULL REFERENCES places(id) ON DELETE CASCADE,
    image TEXT NOT NULL,
    position INTEGER NOT NULL DEFAULT 0 CHECK (position >= 0)
);

CREATE INDEX IF NOT EXISTS idx_images_place_position ON images(place_id, position);
";

const PLACE_COLUMNS: &str = "id, title, description_short, description_long, lat, lng";
const IMAGE_COLUMNS: &str = "id, place_id, image, position";

/// Location of the SQLite database. Every caller opens its own connection.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Opens the database at `path`, creating the file and schema if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Self { path };
        db.connection()?.execute_batch(SCHEMA)?;
        tracing::debug!("Database ready at {}", db.path.display());
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connect(&self) -> Result<PlaceRepository> {
        Ok(PlaceRepository::new(self.connection()?))
    }

    fn connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }
}

fn place_mapper(row: &Row<'_>) -> rusqlite::Result<Place> {
    Ok(Place {
        id: row.get(0)?,
        title: row.get(1)?,
        description_short: row.get(2)?,
        description_long: row.get(3)?,
        lat: row.get(4)?,
        lng: row.get(5)?,
    })
}

fn image_mapper(row: &Row<'_>) -> rusqlite::Result<Image> {
    Ok(Image {
        id: row.get(0)?,
        place_id: row.get(1)?,
        blob_ref: row.get(2)?,
        position: row.get(3)?,
    })
}

pub struct PlaceRepository {
    conn: Connection,
}

impl PlaceRepository {
    pub fn new(conn: Connection) -> PlaceRepository {
        PlaceRepository { conn }
    }

    pub fn select_all(&self) -> Result<Vec<Place>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {PLACE_COLUMNS} FROM places ORDER BY id"))?;
        let rows = stmt.query_map([], place_mapper)?;

        let mut places: Vec<Place> = Vec::new();
        for place in rows {
            places.push(place?);
        }

        Ok(places)
    }

    /// All places with their images, in two queries regardless of the
    /// number of places.
    pub fn select_all_with_images(&self) -> Result<Vec<PlaceWithImages>> {
        let places = self.select_all()?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images ORDER BY place_id, position, id"
        ))?;
        let rows = stmt.query_map([], image_mapper)?;

        let mut images_by_place: HashMap<i64, Vec<Image>> = HashMap::new();
        for image in rows {
            let image = image?;
            images_by_place.entry(image.place_id).or_default().push(image);
        }

        Ok(places
            .into_iter()
            .map(|place| {
                let images = images_by_place.remove(&place.id).unwrap_or_default();
                PlaceWithImages { place, images }
            })
            .collect())
    }

    pub fn select_by_id(&self, id: i64) -> Result<Option<Place>> {
        let place = self
            .conn
            .query_row(
                &format!("SELECT {PLACE_COLUMNS} FROM places WHERE id = ?1"),
                params![id],
                place_mapper,
            )
            .optional()?;
        Ok(place)
    }

    /// Case-insensitive substring match on the title.
    /// Case-insensitive substring match on the title. SQLite's `lower()`
    /// only folds ASCII, so folding happens here on full Unicode.
    pub fn search_by_title(&self, query: &str) -> Result<Vec<Place>> {
        let needle = query.to_lowercase();
        let places = self
            .select_all()?
            .into_iter()
            .filter(|place| place.title.to_lowercase().contains(&needle))
            .collect();

        Ok(places)
    }

    pub fn select_images(&self, place_id: i64) -> Result<Vec<Image>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE place_id = ?1 ORDER BY position, id"
        ))?;
        let rows = stmt.query_map(params![place_id], image_mapper)?;

        let mut images: Vec<Image> = Vec::new();
        for image in rows {
            images.push(image?);
        }

        Ok(images)
    }

    pub fn select_image(&self, id: i64) -> Result<Option<Image>> {
        let image = self
            .conn
            .query_row(
                &format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?1"),
                params![id],
                image_mapper,
            )
            .optional()?;
        Ok(image)
    }

    pub fn insert_place(&self, place: &NewPlace) -> Result<Place> {
        self.conn.execute(
            "INSERT INTO places (title, description_short, description_long, lat, lng) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                place.title,
                place.description_short,
                place.description_long,
                place.lat,
                place.lng
            ],
        )?;

        Ok(with_id(self.conn.last_insert_rowid(), place))
    }

    /// Inserts a place and its images (`(blob_ref, position)`) in one
    /// transaction: either all rows exist afterwards or none do.
    pub fn insert_place_with_images(
        &mut self,
        place: &NewPlace,
        images: &[(String, u32)],
    ) -> Result<PlaceWithImages> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO places (title, description_short, description_long, lat, lng) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                place.title,
                place.description_short,
                place.description_long,
                place.lat,
                place.lng
            ],
        )?;
        let place = with_id(tx.last_insert_rowid(), place);

        let mut inserted = Vec::with_capacity(images.len());
        for (blob_ref, position) in images {
            tx.execute(
                "INSERT INTO images (place_id, image, position) VALUES (?1, ?2, ?3)",
                params![place.id, blob_ref, position],
            )?;
            inserted.push(Image {
                id: tx.last_insert_rowid(),
                place_id: place.id,
                blob_ref: blob_ref.clone(),
                position: *position,
            });
        }

        tx.commit()?;

        Ok(PlaceWithImages {
            place,
            images: inserted,
        })
    }

    /// Replaces all editable fields. Returns `None` for an unknown id.
    pub fn update_place(&self, id: i64, place: &NewPlace) -> Result<Option<Place>> {
        let changed = self.conn.execute(
            "UPDATE places SET title = ?1, description_short = ?2, description_long = ?3, lat = ?4, lng = ?5 WHERE id = ?6",
            params![
                place.title,
                place.description_short,
                place.description_long,
                place.lat,
                place.lng,
                id
            ],
        )?;

        Ok((changed > 0).then(|| with_id(id, place)))
    }

    /// Image rows go with the place through `ON DELETE CASCADE`.
    pub fn delete_place(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM places WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    pub fn insert_image(&self, place_id: i64, blob_ref: &str, position: u32) -> Result<Image> {
        self.conn.execute(
            "INSERT INTO images (place_id, image, position) VALUES (?1, ?2, ?3)",
            params![place_id, blob_ref, position],
        )?;

        Ok(Image {
            id: self.conn.last_insert_rowid(),
            place_id,
            blob_ref: blob_ref.to_string(),
            position,
        })
    }

    pub fn delete_image(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM images WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Assigns positions `0..n` following `ordered_ids`, which must name
    /// every image of the place exactly once.
    pub fn reorder_images(&mut self, place_id: i64, ordered_ids: &[i64]) -> Result<()> {
        let tx = self.conn.transaction()?;

        let current: HashSet<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM images WHERE place_id = ?1")?;
            let rows = stmt.query_map(params![place_id], |row| row.get(0))?;
            let ids = rows.collect::<rusqlite::Result<HashSet<i64>>>()?;
            ids
        };

        let requested: HashSet<i64> = ordered_ids.iter().copied().collect();
        if requested.len() != ordered_ids.len() || requested != current {
            return Err(PlacesError::ValidationError {
                message: format!(
                    "image order for place {} must list each of its {} images exactly once",
                    place_id,
                    current.len()
                ),
            });
        }

        for (position, image_id) in ordered_ids.iter().enumerate() {
            tx.execute(
                "UPDATE images SET position = ?1 WHERE id = ?2",
                params![position as u32, image_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

fn with_id(id: i64, place: &NewPlace) -> Place {
    Place {
        id,
        title: place.title.clone(),
        description_short: place.description_short.clone(),
        description_long: place.description_long.clone(),
        lat: place.lat,
        lng: place.lng,
    }
}
