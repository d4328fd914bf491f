//! faceid-store — SQLite persistence for users and their face galleries.
//!
//! All queries run on tokio-rusqlite's connection thread. Descriptors are
//! encoded outside the connection closure so encryption never blocks it.

pub mod crypto;
pub mod schema;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use faceid_core::{Descriptor, DescriptorError, Person};
use rusqlite::{params, OptionalExtension};
use thiserror::Error;
use tokio_rusqlite::Connection;

pub use crypto::{CryptoError, DescriptorCipher};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} already exists")]
    Conflict(&'static str),
    #[error("stored descriptor is invalid: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("descriptor is encrypted but no descriptor key is configured")]
    MissingKey,
    #[error("invalid stored value: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// How an account signs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProvider {
    Local,
    Google,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Google => "google",
        }
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthProvider {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Self::Local),
            "google" => Ok(Self::Google),
            other => Err(StoreError::Corrupt(format!("unknown auth provider {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Argon2 PHC string; `None` for Google-only accounts.
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub profile_picture: Option<String>,
    pub auth_provider: AuthProvider,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub profile_picture: Option<String>,
    pub auth_provider: AuthProvider,
}

#[derive(Debug, Clone)]
pub struct NewPerson {
    pub name: String,
    pub info: String,
    pub descriptor: Descriptor,
}

/// Emails are compared trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Key used for per-owner, case-insensitive name uniqueness.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Descriptor column as read from the database, before decoding.
struct RawPerson {
    id: String,
    owner_id: String,
    name: String,
    info: String,
    blob: Vec<u8>,
    encrypted: bool,
    created_at: String,
}

/// User row with the provider still as text.
struct RawUser {
    user: User,
    provider: String,
}

const USER_COLUMNS: &str = "id, email, first_name, last_name, password_hash, google_id, \
                            profile_picture, auth_provider, created_at";

fn read_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawUser> {
    Ok(RawUser {
        user: User {
            id: row.get(0)?,
            email: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            password_hash: row.get(4)?,
            google_id: row.get(5)?,
            profile_picture: row.get(6)?,
            auth_provider: AuthProvider::Local,
            created_at: row.get(8)?,
        },
        provider: row.get(7)?,
    })
}

fn finish_user(raw: RawUser) -> Result<User> {
    let mut user = raw.user;
    user.auth_provider = raw.provider.parse()?;
    Ok(user)
}

/// Handle to the database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    conn: Connection,
    cipher: Option<Arc<DescriptorCipher>>,
    path: PathBuf,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("encrypted", &self.cipher.is_some())
            .finish()
    }
}

impl Store {
    /// Open or create the database at `path`, creating parent directories.
    pub async fn open(path: impl AsRef<Path>, cipher: Option<DescriptorCipher>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(&path).await?;
        conn.call(|conn| {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
            schema::initialize(conn)?;
            Ok(())
        })
        .await?;

        tracing::info!(path = %path.display(), encrypted = cipher.is_some(), "database opened");
        Ok(Self {
            conn,
            cipher: cipher.map(Arc::new),
            path,
        })
    }

    /// In-memory database, for tests.
    pub async fn open_in_memory(cipher: Option<DescriptorCipher>) -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        conn.call(|conn| {
            schema::initialize(conn)?;
            Ok(())
        })
        .await?;
        Ok(Self {
            conn,
            cipher: cipher.map(Arc::new),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cheap liveness check for health checks.
    pub async fn ping(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.query_row("SELECT 1", [], |_| Ok(()))?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // --- users ---

    pub async fn create_user(&self, new: NewUser) -> Result<User> {
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: normalize_email(&new.email),
            first_name: new.first_name.trim().to_string(),
            last_name: new.last_name.trim().to_string(),
            password_hash: new.password_hash,
            google_id: new.google_id,
            profile_picture: new.profile_picture,
            auth_provider: new.auth_provider,
            created_at: Utc::now().to_rfc3339(),
        };

        let row = user.clone();
        let inserted = self
            .conn
            .call(move |conn| {
                let res = conn.execute(
                    "INSERT INTO users (id, email, first_name, last_name, password_hash, google_id,
                                        profile_picture, auth_provider, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        row.id,
                        row.email,
                        row.first_name,
                        row.last_name,
                        row.password_hash,
                        row.google_id,
                        row.profile_picture,
                        row.auth_provider.as_str(),
                        row.created_at,
                    ],
                );
                match res {
                    Ok(_) => Ok(true),
                    Err(e) if is_unique_violation(&e) => Ok(false),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        if !inserted {
            return Err(StoreError::Conflict("user"));
        }
        tracing::info!(user_id = %user.id, provider = %user.auth_provider, "user created");
        Ok(user)
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalize_email(email);
        let raw = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
                Ok(conn.query_row(&sql, [email], read_user).optional()?)
            })
            .await?;
        raw.map(finish_user).transpose()
    }

    pub async fn user_by_id(&self, id: &str) -> Result<Option<User>> {
        let id = id.to_string();
        let raw = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
                Ok(conn.query_row(&sql, [id], read_user).optional()?)
            })
            .await?;
        raw.map(finish_user).transpose()
    }

    /// Attach a Google identity to an account and switch it to Google sign-in.
    pub async fn link_google(
        &self,
        user_id: &str,
        google_id: &str,
        profile_picture: Option<String>,
    ) -> Result<bool> {
        let (user_id, google_id) = (user_id.to_string(), google_id.to_string());
        let updated = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE users SET google_id = ?2, profile_picture = COALESCE(?3, profile_picture),
                                      auth_provider = 'google'
                     WHERE id = ?1",
                    params![user_id, google_id, profile_picture],
                )?)
            })
            .await?;
        Ok(updated > 0)
    }

    // --- people ---

    fn encode_descriptor(&self, descriptor: &Descriptor) -> Result<(Vec<u8>, bool)> {
        let bytes = descriptor.to_le_bytes();
        match &self.cipher {
            Some(cipher) => Ok((cipher.encrypt(&bytes)?, true)),
            None => Ok((bytes, false)),
        }
    }

    fn decode_person(&self, raw: RawPerson) -> Result<Person> {
        let bytes = if raw.encrypted {
            let cipher = self.cipher.as_ref().ok_or(StoreError::MissingKey)?;
            cipher.decrypt(&raw.blob)?
        } else {
            raw.blob
        };
        Ok(Person {
            id: raw.id,
            owner_id: raw.owner_id,
            name: raw.name,
            info: raw.info,
            descriptor: Descriptor::from_le_bytes(&bytes)?,
            created_at: raw.created_at,
        })
    }

    /// Register a person for `owner_id`. Names are trimmed and unique per
    /// owner regardless of case.
    pub async fn insert_person(&self, owner_id: &str, new: NewPerson) -> Result<Person> {
        let (blob, encrypted) = self.encode_descriptor(&new.descriptor)?;
        let now = Utc::now().to_rfc3339();
        let person = Person {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            name: new.name.trim().to_string(),
            info: new.info.trim().to_string(),
            descriptor: new.descriptor,
            created_at: now.clone(),
        };

        let (id, owner, name, info) = (
            person.id.clone(),
            owner_id.to_string(),
            person.name.clone(),
            person.info.clone(),
        );
        let key = name_key(&name);
        let inserted = self
            .conn
            .call(move |conn| {
                let res = conn.execute(
                    "INSERT INTO people (id, owner_id, name, name_key, info, descriptor, encrypted,
                                         created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                    params![id, owner, name, key, info, blob, encrypted, now],
                );
                match res {
                    Ok(_) => Ok(true),
                    Err(e) if is_unique_violation(&e) => Ok(false),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        if !inserted {
            return Err(StoreError::Conflict("person"));
        }
        tracing::info!(owner_id, person = %person.name, "person registered");
        Ok(person)
    }

    pub async fn person_by_name(&self, owner_id: &str, name: &str) -> Result<Option<Person>> {
        let (owner, key) = (owner_id.to_string(), name_key(name));
        let raw = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, owner_id, name, info, descriptor, encrypted, created_at
                         FROM people WHERE owner_id = ?1 AND name_key = ?2",
                        params![owner, key],
                        read_person,
                    )
                    .optional()?)
            })
            .await?;
        raw.map(|r| self.decode_person(r)).transpose()
    }

    /// All people registered by `owner_id`, oldest first.
    pub async fn list_people(&self, owner_id: &str) -> Result<Vec<Person>> {
        let owner = owner_id.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, owner_id, name, info, descriptor, encrypted, created_at
                     FROM people WHERE owner_id = ?1 ORDER BY created_at, rowid",
                )?;
                let rows = stmt
                    .query_map([owner], read_person)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(|r| self.decode_person(r)).collect()
    }

    /// Delete by case-insensitive name. Returns whether a row was removed.
    pub async fn delete_person_by_name(&self, owner_id: &str, name: &str) -> Result<bool> {
        let (owner, key) = (owner_id.to_string(), name_key(name));
        let deleted = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM people WHERE owner_id = ?1 AND name_key = ?2",
                    params![owner, key],
                )?)
            })
            .await?;
        if deleted > 0 {
            tracing::info!(owner_id, person = name.trim(), "person deleted");
        }
        Ok(deleted > 0)
    }

    pub async fn count_people(&self, owner_id: &str) -> Result<u64> {
        let owner = owner_id.to_string();
        let count: i64 = self
            .conn
            .call(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM people WHERE owner_id = ?1",
                    [owner],
                    |r| r.get(0),
                )?)
            })
            .await?;
        u64::try_from(count).map_err(|_| StoreError::Corrupt(format!("negative count {count}")))
    }
}

fn read_person(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPerson> {
    Ok(RawPerson {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        info: row.get(3)?,
        blob: row.get(4)?,
        encrypted: row.get(5)?,
        created_at: row.get(6)?,
    })
}
