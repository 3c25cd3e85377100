use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

const DUPLICATE_KEY_CODE: i32 = 11_000;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("invalid value `{value}` for environment variable `{var}`")]
    InvalidEnvVar { var: &'static str, value: String },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("username `{username}` already taken")]
    DuplicateAccount { username: String },
    #[error("failed to create account `{username}`")]
    CreateAccount {
        username: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load account `{username}`")]
    LoadAccount {
        username: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save progress of `{id}`")]
    SaveProgress {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load progress of `{id}`")]
    LoadProgress {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to append completion for `{id}`")]
    AppendCompletion {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to compute leaderboard")]
    Leaderboard {
        #[source]
        source: MongoError,
    },
    #[error("stored identifier `{raw}` is not a valid UUID")]
    CorruptIdentifier {
        raw: String,
        #[source]
        source: uuid::Error,
    },
}

/// True when `err` reports a unique index violation.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write)) if write.code == DUPLICATE_KEY_CODE
    )
}
