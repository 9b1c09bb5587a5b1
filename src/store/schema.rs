use crate::sqlite_column;
use crate::sqlite_persistence::{
    ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

const USER_FK: ForeignKey = ForeignKey {
    foreign_table: "user",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

pub(super) const USER_TABLE_V_0: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_unique = true
        ),
        sqlite_column!("handle", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("email", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_user_handle", "handle")],
    unique_constraints: &[],
};

pub(super) const USER_PASSWORD_CREDENTIALS_TABLE_V_0: Table = Table {
    name: "user_password_credentials",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!("salt", &SqlType::Text, non_null = true),
        sqlite_column!("hash", &SqlType::Text, non_null = true),
        sqlite_column!("hasher", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("last_tried", &SqlType::Integer),
        sqlite_column!("last_used", &SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[&["user_id"]],
};

pub(super) const AUTH_TOKEN_TABLE_V_0: Table = Table {
    name: "auth_token",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!("value", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("last_used", &SqlType::Integer),
    ],
    indices: &[("idx_auth_token_value", "value")],
    unique_constraints: &[],
};

pub(super) const GENRE_TABLE_V_0: Table = Table {
    name: "genre",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "description",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "color",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'#6D6D00'")
        ),
        sqlite_column!(
            "external_id",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

/// Predictions keep their genre alive.
const PREDICTION_GENRE_FK: ForeignKey = ForeignKey {
    foreign_table: "genre",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Restrict,
};

pub(super) const PREDICTION_TABLE_V_0: Table = Table {
    name: "prediction",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!("audio_file", &SqlType::Text, non_null = true),
        sqlite_column!(
            "genre_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&PREDICTION_GENRE_FK)
        ),
        sqlite_column!("confidence", &SqlType::Real, non_null = true),
        // JSON array of floats
        sqlite_column!("features", &SqlType::Text, non_null = true),
        sqlite_column!("created", &SqlType::Integer, non_null = true),
        sqlite_column!("feedback", &SqlType::Integer),
    ],
    indices: &[
        ("idx_prediction_user", "user_id"),
        ("idx_prediction_genre", "genre_id"),
        ("idx_prediction_created", "created"),
    ],
    unique_constraints: &[],
};

pub(super) const USER_ACTIVITY_TABLE_V_0: Table = Table {
    name: "user_activity",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!("last_prediction", &SqlType::Integer),
        sqlite_column!(
            "total_predictions",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[],
    unique_constraints: &[&["user_id"]],
};

pub(super) const TRENDING_GENRE_TABLE_V_0: Table = Table {
    name: "trending_genre",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "genre_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "genre",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("score", &SqlType::Real, non_null = true),
        // YYYY-MM-DD
        sqlite_column!("date", &SqlType::Text, non_null = true),
        // Sequence number of the aggregation run that produced the row.
        sqlite_column!("run", &SqlType::Integer, non_null = true),
        sqlite_column!("created", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_trending_genre_run", "run")],
    unique_constraints: &[&["genre_id", "run"]],
};

pub(super) const REVIEW_TABLE_V_0: Table = Table {
    name: "review",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!(
            "genre_id",
            &SqlType::Integer,
            foreign_key = Some(&ForeignKey {
                foreign_table: "genre",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::SetNull,
            })
        ),
        sqlite_column!("message", &SqlType::Text, non_null = true),
        sqlite_column!("created", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_review_created", "created")],
    unique_constraints: &[],
};

pub(super) const VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        USER_TABLE_V_0,
        USER_PASSWORD_CREDENTIALS_TABLE_V_0,
        AUTH_TOKEN_TABLE_V_0,
        GENRE_TABLE_V_0,
        PREDICTION_TABLE_V_0,
        USER_ACTIVITY_TABLE_V_0,
        TRENDING_GENRE_TABLE_V_0,
        REVIEW_TABLE_V_0,
    ],
    migration: None,
}];
