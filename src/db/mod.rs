// Database access layer (SQLite via sqlx).

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::engine::profile::{
    decode_achievements, decode_upgrades, encode_achievements, encode_upgrades,
};
use crate::engine::Profile;
use crate::gateway::{GatewayError, LeaderboardEntry, ProfileGateway};

const PROFILE_COLUMNS: &str =
    "identity, display_name, score, level, high_score, coins, upgrades, achievements, last_updated";

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProfileRow {
    identity: String,
    display_name: Option<String>,
    score: i64,
    level: i64,
    high_score: i64,
    coins: i64,
    upgrades: String,
    achievements: String,
    last_updated: String,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        let upgrades = decode_upgrades(&row.identity, &row.upgrades);
        let achievements = decode_achievements(&row.identity, &row.achievements);
        Profile {
            display_name: row.display_name,
            score: from_db(row.score),
            level: u32::try_from(row.level).unwrap_or(1).max(1),
            high_score: from_db(row.high_score),
            coins: from_db(row.coins),
            upgrades,
            achievements,
            last_updated: Some(row.last_updated),
            identity: row.identity,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct LeaderboardRow {
    identity: String,
    display_name: Option<String>,
    high_score: i64,
    level: i64,
    coins: i64,
}

impl From<LeaderboardRow> for LeaderboardEntry {
    fn from(row: LeaderboardRow) -> Self {
        LeaderboardEntry {
            identity: row.identity,
            high_score: from_db(row.high_score),
            level: u32::try_from(row.level).unwrap_or(1).max(1),
            coins: from_db(row.coins),
            display_name: row.display_name,
        }
    }
}

// SQLite integers are signed
fn to_db(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn from_db(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        // Every connection to an in-memory database opens a separate one
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identity TEXT NOT NULL UNIQUE,
                display_name TEXT,
                score INTEGER NOT NULL DEFAULT 0,
                level INTEGER NOT NULL DEFAULT 1,
                high_score INTEGER NOT NULL DEFAULT 0,
                coins INTEGER NOT NULL DEFAULT 0,
                upgrades TEXT NOT NULL DEFAULT '{}',
                achievements TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                last_updated TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_profiles_high_score ON profiles (high_score DESC, id ASC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Profiles ──────────────────────────────────────────────────────

    pub async fn get_profile(&self, identity: &str) -> Result<Option<Profile>, sqlx::Error> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE identity = ?"
        ))
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Profile::from))
    }

    /// Insert-or-fetch in one statement. A display name only fills a missing one.
    pub async fn upsert_profile(
        &self,
        identity: &str,
        display_name: Option<&str>,
    ) -> Result<Profile, sqlx::Error> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "INSERT INTO profiles (identity, display_name) VALUES (?, ?) \
             ON CONFLICT(identity) DO UPDATE SET display_name = COALESCE(profiles.display_name, excluded.display_name) \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(identity)
        .bind(display_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    /// Whole-record replace. A `None` display name keeps the stored one.
    pub async fn update_profile(&self, identity: &str, profile: &Profile) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE profiles SET display_name = COALESCE(?, display_name), score = ?, level = ?, \
             high_score = ?, coins = ?, upgrades = ?, achievements = ?, last_updated = datetime('now') \
             WHERE identity = ?",
        )
        .bind(profile.display_name.as_deref())
        .bind(to_db(profile.score))
        .bind(i64::from(profile.level))
        .bind(to_db(profile.high_score))
        .bind(to_db(profile.coins))
        .bind(encode_upgrades(&profile.upgrades))
        .bind(encode_achievements(&profile.achievements))
        .bind(identity)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn top_profiles(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, sqlx::Error> {
        let rows = sqlx::query_as::<_, LeaderboardRow>(
            "SELECT identity, display_name, high_score, level, coins FROM profiles \
             ORDER BY high_score DESC, id ASC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(LeaderboardEntry::from).collect())
    }

    pub async fn profile_rank(&self, identity: &str) -> Result<Option<u64>, sqlx::Error> {
        let rank: Option<i64> = sqlx::query_scalar(
            "SELECT 1 + (SELECT COUNT(*) FROM profiles o WHERE o.high_score > p.high_score) \
             FROM profiles p WHERE p.identity = ?",
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rank.map(from_db))
    }

    pub async fn count_profiles(&self) -> Result<u64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles")
            .fetch_one(&self.pool)
            .await?;
        Ok(from_db(count))
    }
}

impl ProfileGateway for Database {
    async fn fetch_profile(&self, identity: &str) -> Result<Option<Profile>, GatewayError> {
        Ok(self.get_profile(identity).await?)
    }

    async fn create_profile(
        &self,
        identity: &str,
        display_name: Option<&str>,
    ) -> Result<Profile, GatewayError> {
        Ok(self.upsert_profile(identity, display_name).await?)
    }

    async fn overwrite_profile(&self, identity: &str, profile: &Profile) -> Result<u64, GatewayError> {
        Ok(self.update_profile(identity, profile).await?)
    }

    async fn list_top_profiles(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, GatewayError> {
        Ok(self.top_profiles(limit).await?)
    }

    async fn rank_of(&self, identity: &str) -> Result<Option<u64>, GatewayError> {
        Ok(self.profile_rank(identity).await?)
    }
}
