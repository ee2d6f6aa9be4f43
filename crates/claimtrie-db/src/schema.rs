//! SQL schema definitions.

/// Complete schema for the v1 claim index.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Claims
-- ============================================================

CREATE TABLE IF NOT EXISTS claim (
    claim_hash BLOB PRIMARY KEY,
    claim_id TEXT NOT NULL,
    claim_name TEXT NOT NULL,
    normalized TEXT NOT NULL,
    txo_hash BLOB NOT NULL,
    tx_position INTEGER NOT NULL,
    amount INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,            -- last updated timestamp
    creation_timestamp INTEGER NOT NULL,
    height INTEGER NOT NULL,               -- last updated height
    creation_height INTEGER NOT NULL,
    activation_height INTEGER,
    expiration_height INTEGER NOT NULL,
    release_time INTEGER NOT NULL,

    short_url TEXT NOT NULL,               -- name#shortest-unique-claim_id
    canonical_url TEXT,                    -- channel short_url/name#shortest-unique-claim_id-within-channel

    claim_type INTEGER,

    -- streams
    stream_type INTEGER,
    media_type TEXT,
    fee_amount INTEGER NOT NULL DEFAULT 0,
    fee_currency TEXT,

    -- reposts
    reposted_claim_hash BLOB,

    -- channels
    public_key_bytes BLOB,
    public_key_hash BLOB,
    claims_in_channel INTEGER,

    -- claims signed by a channel
    channel_hash BLOB,
    channel_join INTEGER,                  -- height the current valid signature first held
    signature BLOB,
    signature_digest BLOB,
    signature_valid INTEGER,

    effective_amount INTEGER NOT NULL DEFAULT 0,
    support_amount INTEGER NOT NULL DEFAULT 0,
    trending_group INTEGER NOT NULL DEFAULT 0,
    trending_mixed INTEGER NOT NULL DEFAULT 0,
    trending_local INTEGER NOT NULL DEFAULT 0,
    trending_global INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS claim_normalized_idx ON claim (normalized, activation_height);
CREATE INDEX IF NOT EXISTS claim_channel_hash_idx ON claim (channel_hash, signature, claim_hash);
CREATE INDEX IF NOT EXISTS claim_claims_in_channel_idx ON claim (signature_valid, channel_hash, normalized);
CREATE INDEX IF NOT EXISTS claim_txo_hash_idx ON claim (txo_hash);
CREATE INDEX IF NOT EXISTS claim_activation_height_idx ON claim (activation_height, claim_hash);
CREATE INDEX IF NOT EXISTS claim_expiration_height_idx ON claim (expiration_height);
CREATE INDEX IF NOT EXISTS claim_reposted_claim_hash_idx ON claim (reposted_claim_hash);

-- search ordering and filters
CREATE INDEX IF NOT EXISTS claim_height_normalized_idx ON claim (height, normalized);
CREATE INDEX IF NOT EXISTS claim_resolve_idx ON claim (normalized, claim_id);
CREATE INDEX IF NOT EXISTS claim_id_idx ON claim (claim_id, claim_hash);
CREATE INDEX IF NOT EXISTS claim_effective_amount_idx ON claim (effective_amount, claim_hash);
CREATE INDEX IF NOT EXISTS claim_release_time_idx ON claim (release_time, claim_hash);
CREATE INDEX IF NOT EXISTS claim_public_key_hash_idx ON claim (public_key_hash);

-- ============================================================
-- Supports
-- ============================================================

CREATE TABLE IF NOT EXISTS support (
    txo_hash BLOB PRIMARY KEY,
    tx_position INTEGER NOT NULL,
    height INTEGER NOT NULL,
    claim_hash BLOB NOT NULL,
    amount INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS support_claim_hash_idx ON support (claim_hash, height);

-- ============================================================
-- Claim trie: one controlling claim per normalized name
-- ============================================================

CREATE TABLE IF NOT EXISTS claimtrie (
    normalized TEXT PRIMARY KEY,
    claim_hash BLOB NOT NULL,
    last_take_over_height INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS claimtrie_claim_hash_idx ON claimtrie (claim_hash);

-- ============================================================
-- Search facets
-- ============================================================

CREATE TABLE IF NOT EXISTS tag (
    tag TEXT NOT NULL,
    claim_hash BLOB NOT NULL,
    height INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS tag_claim_hash_tag_idx ON tag (claim_hash, tag);
CREATE INDEX IF NOT EXISTS tag_tag_idx ON tag (tag, claim_hash);

CREATE TABLE IF NOT EXISTS language (
    language TEXT NOT NULL,
    claim_hash BLOB NOT NULL,
    height INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS language_claim_hash_language_idx ON language (claim_hash, language);
CREATE INDEX IF NOT EXISTS language_language_idx ON language (language, claim_hash);

CREATE TABLE IF NOT EXISTS location (
    location TEXT NOT NULL,
    claim_hash BLOB NOT NULL,
    height INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS location_claim_hash_location_idx ON location (claim_hash, location);
CREATE INDEX IF NOT EXISTS location_location_idx ON location (location, claim_hash);
"#;

/// v2: the height of the last applied block, written with every block.
///
/// Indexes created at v1 start from the highest height their rows record.
pub const SCHEMA_V2: &str = r#"
CREATE TABLE IF NOT EXISTS sync_state (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    height INTEGER NOT NULL
);

INSERT OR IGNORE INTO sync_state (id, height)
SELECT 0, height FROM (
    SELECT MAX(height) AS height FROM (
        SELECT MAX(height) AS height FROM claim
        UNION ALL SELECT MAX(height) FROM support
        UNION ALL SELECT MAX(last_take_over_height) FROM claimtrie
    )
)
WHERE height IS NOT NULL;
"#;
