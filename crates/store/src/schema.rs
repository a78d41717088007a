//! Embedded schema migration for the content tables. The `jobs` table
//! itself is owned by [`pipeline_queue::backend::postgres`]; this crate
//! only migrates the tables listed in its own responsibility.

pub const MIGRATION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sources (
    id               UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name             TEXT NOT NULL,
    kind             TEXT NOT NULL,
    url              TEXT NOT NULL,
    active           BOOLEAN NOT NULL DEFAULT true,
    config_json      JSONB NOT NULL DEFAULT '{}',
    last_fetched_at  TIMESTAMPTZ,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at       TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS raw_items (
    id                 UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    source_ref         UUID NOT NULL REFERENCES sources(id),
    external_id        TEXT NOT NULL,
    title              TEXT NOT NULL,
    description        TEXT,
    body               TEXT NOT NULL DEFAULT '',
    published_at       TIMESTAMPTZ NOT NULL,
    metadata_json      JSONB NOT NULL DEFAULT '{}',
    processing_status  TEXT NOT NULL DEFAULT 'pending',
    created_at         TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (source_ref, external_id)
);

CREATE TABLE IF NOT EXISTS processed_items (
    id                      UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    raw_ref                 UUID NOT NULL UNIQUE REFERENCES raw_items(id),
    normalized_text         TEXT NOT NULL,
    topics_json             JSONB NOT NULL DEFAULT '[]',
    sentiment_score         DOUBLE PRECISION NOT NULL,
    entities_json           JSONB NOT NULL DEFAULT '{}',
    summary                 TEXT NOT NULL,
    processing_metadata_json JSONB NOT NULL DEFAULT '{}',
    created_at              TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS daily_analyses (
    id                UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    date              DATE NOT NULL UNIQUE,
    market_sentiment  TEXT NOT NULL,
    key_themes_json   JSONB NOT NULL DEFAULT '[]',
    summary           TEXT NOT NULL,
    ai_blob_json      JSONB NOT NULL DEFAULT '{}',
    confidence        DOUBLE PRECISION NOT NULL,
    sources_analyzed  INTEGER NOT NULL,
    created_at        TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS predictions (
    id            UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    analysis_ref  UUID NOT NULL REFERENCES daily_analyses(id),
    kind          TEXT NOT NULL,
    text          TEXT NOT NULL,
    confidence    DOUBLE PRECISION NOT NULL,
    horizon       TEXT NOT NULL,
    data_json     JSONB NOT NULL DEFAULT '{}',
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (analysis_ref, horizon)
);

CREATE TABLE IF NOT EXISTS prediction_comparisons (
    id                   UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    prediction_ref       UUID NOT NULL UNIQUE REFERENCES predictions(id),
    analysis_ref         UUID NOT NULL REFERENCES daily_analyses(id),
    accuracy             DOUBLE PRECISION NOT NULL,
    outcome_description  TEXT NOT NULL,
    created_at           TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;
