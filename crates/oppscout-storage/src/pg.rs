//! Postgres-backed store and subscriber directory (sqlx, runtime-checked queries).

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use oppscout_core::{
    Category, Difficulty, MissingFieldPatch, NewOpportunity, OpportunityRecord, RiskAssessment,
    RiskLevel, SubscriberPreference, WinProbability,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::{OpportunityStore, StoreError, SubscriberDirectory};

const RECORD_COLUMNS: &str = r#"
    id, title, description, url, normalized_url, source, source_native_id, category,
    chain, reward_pool, deadline, tags, required_skills, content_hash, ai_summary,
    ai_strategy, ai_score, win_probability, difficulty, trust_score, risk_score,
    risk_level, risk_flags, is_verified, is_open, created_at, updated_at
"#;

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .context("connecting to DATABASE_URL")
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("applying opportunity store migrations")?;
    info!("migrations applied");
    Ok(())
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Conflict {
                constraint: db_err.constraint().unwrap_or("unique").to_string(),
            };
        }
    }
    StoreError::Database(err)
}

fn record_from_row(row: &PgRow) -> Result<OpportunityRecord, StoreError> {
    let category: String = row.try_get("category")?;
    let category = Category::from_label(&category)
        .ok_or_else(|| StoreError::Decode(format!("unknown category {category:?}")))?;

    let ai_score: Option<i16> = row.try_get("ai_score")?;
    let trust_score: i16 = row.try_get("trust_score")?;
    let risk_score: Option<i16> = row.try_get("risk_score")?;
    let risk_level: Option<String> = row.try_get("risk_level")?;
    let risk_flags: Option<Json<Vec<String>>> = row.try_get("risk_flags")?;
    let win_probability: Option<String> = row.try_get("win_probability")?;
    let difficulty: Option<String> = row.try_get("difficulty")?;

    let risk = risk_score.map(|score| RiskAssessment {
        risk_score: oppscout_core::clamp_score(score.into()),
        risk_level: risk_level.as_deref().and_then(RiskLevel::from_label),
        flags: risk_flags.map(|Json(flags)| flags).unwrap_or_default(),
    });

    Ok(OpportunityRecord {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        url: row.try_get("url")?,
        normalized_url: row.try_get("normalized_url")?,
        source: row.try_get("source")?,
        source_native_id: row.try_get("source_native_id")?,
        category,
        chain: row.try_get("chain")?,
        reward_pool: row.try_get("reward_pool")?,
        deadline: row.try_get("deadline")?,
        tags: row.try_get("tags")?,
        required_skills: row.try_get("required_skills")?,
        content_hash: row.try_get("content_hash")?,
        ai_summary: row.try_get("ai_summary")?,
        ai_strategy: row.try_get("ai_strategy")?,
        ai_score: ai_score.map(|s| oppscout_core::clamp_score(s.into())),
        win_probability: win_probability.as_deref().and_then(WinProbability::from_label),
        difficulty: difficulty.as_deref().and_then(Difficulty::from_label),
        trust_score: oppscout_core::clamp_score(trust_score.into()),
        risk,
        is_verified: row.try_get("is_verified")?,
        is_open: row.try_get("is_open")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[derive(Debug, Clone)]
pub struct PgOpportunityStore {
    pool: PgPool,
}

impl PgOpportunityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OpportunityStore for PgOpportunityStore {
    async fn find_existing(
        &self,
        source: &str,
        source_native_id: Option<&str>,
        normalized_url: &str,
    ) -> Result<Option<OpportunityRecord>, StoreError> {
        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS}
              FROM opportunities
             WHERE (source = $1 AND source_native_id = $2)
                OR ($3 <> '' AND normalized_url = $3)
             ORDER BY created_at
             LIMIT 1
            "#
        );
        let row = sqlx::query(&sql)
            .bind(source)
            .bind(source_native_id)
            .bind(normalized_url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn insert(&self, opportunity: &NewOpportunity) -> Result<OpportunityRecord, StoreError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            INSERT INTO opportunities (
                id, title, description, url, normalized_url, source, source_native_id,
                category, chain, reward_pool, deadline, tags, required_skills, content_hash,
                ai_summary, ai_strategy, ai_score, win_probability, difficulty, trust_score,
                risk_score, risk_level, risk_flags, is_verified, is_open
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
            RETURNING {RECORD_COLUMNS}
            "#
        );
        let risk = opportunity.risk.as_ref();
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(&opportunity.title)
            .bind(&opportunity.description)
            .bind(&opportunity.url)
            .bind(&opportunity.normalized_url)
            .bind(&opportunity.source)
            .bind(&opportunity.source_native_id)
            .bind(opportunity.category.as_str())
            .bind(&opportunity.chain)
            .bind(&opportunity.reward_pool)
            .bind(opportunity.deadline)
            .bind(&opportunity.tags)
            .bind(&opportunity.required_skills)
            .bind(&opportunity.content_hash)
            .bind(&opportunity.ai_summary)
            .bind(&opportunity.ai_strategy)
            .bind(opportunity.ai_score.map(i16::from))
            .bind(opportunity.win_probability.map(|w| w.as_str()))
            .bind(opportunity.difficulty.map(|d| d.as_str()))
            .bind(i16::from(opportunity.trust_score))
            .bind(risk.map(|r| i16::from(r.risk_score)))
            .bind(risk.and_then(|r| r.risk_level).map(|l| l.as_str()))
            .bind(risk.map(|r| Json(r.flags.clone())))
            .bind(opportunity.is_verified)
            .bind(opportunity.is_open)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_write_error)?;
        let record = record_from_row(&row)?;
        tx.commit().await.map_err(map_write_error)?;
        debug!(id = %record.id, source = %record.source, "opportunity inserted");
        Ok(record)
    }

    async fn fill_missing(
        &self,
        id: Uuid,
        patch: &MissingFieldPatch,
    ) -> Result<Option<OpportunityRecord>, StoreError> {
        let sql = format!(
            r#"
            UPDATE opportunities
               SET reward_pool = COALESCE(NULLIF(BTRIM(reward_pool), ''), $2),
                   deadline = COALESCE(deadline, $3),
                   required_skills = CASE
                       WHEN cardinality(required_skills) = 0 THEN $4
                       ELSE required_skills
                   END,
                   updated_at = NOW()
             WHERE id = $1
               AND (   (NULLIF(BTRIM(reward_pool), '') IS NULL AND $2::text IS NOT NULL)
                    OR (deadline IS NULL AND $3::timestamptz IS NOT NULL)
                    OR (cardinality(required_skills) = 0 AND cardinality($4::text[]) > 0))
            RETURNING {RECORD_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(&patch.reward_pool)
            .bind(patch.deadline)
            .bind(&patch.required_skills)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_write_error)?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn get(&self, id: Uuid) -> Result<Option<OpportunityRecord>, StoreError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM opportunities WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_open(&self, limit: usize) -> Result<Vec<OpportunityRecord>, StoreError> {
        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS}
              FROM opportunities
             WHERE is_open
             ORDER BY created_at DESC
             LIMIT $1
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM opportunities")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.max(0) as u64)
    }
}

#[derive(Debug, Clone)]
pub struct PgSubscriberDirectory {
    pool: PgPool,
}

impl PgSubscriberDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriberDirectory for PgSubscriberDirectory {
    async fn notifiable_subscribers(&self) -> Result<Vec<SubscriberPreference>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, email, preferred_chains, preferred_categories, skills, notifications_enabled
              FROM users
             WHERE notifications_enabled
               AND email IS NOT NULL
               AND BTRIM(email) <> ''
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(SubscriberPreference {
                user_id: row.try_get("id")?,
                email: row.try_get("email")?,
                preferred_chains: row.try_get("preferred_chains")?,
                preferred_categories: row.try_get("preferred_categories")?,
                skills: row.try_get("skills")?,
                notifications_enabled: row.try_get("notifications_enabled")?,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Live-database tests run only when `OPPSCOUT_TEST_DATABASE_URL` points at a scratch Postgres.
    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var("OPPSCOUT_TEST_DATABASE_URL").ok()?;
        let pool = connect(&url).await.ok()?;
        run_migrations(&pool).await.ok()?;
        Some(pool)
    }

    fn opportunity(native_id: &str) -> NewOpportunity {
        NewOpportunity {
            title: "Grant for DeFi tooling".into(),
            description: String::new(),
            url: String::new(),
            normalized_url: String::new(),
            source: "pg-test".into(),
            source_native_id: Some(native_id.into()),
            category: Category::Grant,
            chain: None,
            reward_pool: Some("$5,000".into()),
            deadline: None,
            tags: vec![],
            required_skills: vec![],
            content_hash: String::new(),
            ai_summary: None,
            ai_strategy: None,
            ai_score: None,
            win_probability: None,
            difficulty: None,
            trust_score: 80,
            risk: None,
            is_verified: false,
            is_open: true,
        }
    }

    #[tokio::test]
    async fn fill_missing_leaves_complete_rows_untouched() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let store = PgOpportunityStore::new(pool);
        let record = store
            .insert(&opportunity(&Uuid::new_v4().to_string()))
            .await
            .unwrap();

        let only_reward = MissingFieldPatch {
            reward_pool: Some("$1".into()),
            ..Default::default()
        };
        assert!(store.fill_missing(record.id, &only_reward).await.unwrap().is_none());
        let stored = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at, record.updated_at);
        assert_eq!(stored.reward_pool.as_deref(), Some("$5,000"));

        let skills = MissingFieldPatch {
            required_skills: vec!["Rust".into()],
            ..Default::default()
        };
        let updated = store.fill_missing(record.id, &skills).await.unwrap().unwrap();
        assert_eq!(updated.required_skills, vec!["Rust".to_string()]);
        assert_eq!(updated.reward_pool.as_deref(), Some("$5,000"));
    }
}
