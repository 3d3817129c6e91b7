// src/store/postgres.rs - Production store over tokio-postgres/bb8.
//
// Schema assumptions:
// - `registrant` holds one row per raw registration, normalization fields
//   included (empty string until the backfill reaches them).
// - `review_candidate` carries a unique index on (left_id, right_id), which
//   is what makes concurrent detection runs safe: duplicates from a racing
//   run fall into ON CONFLICT DO NOTHING.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashSet;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::models::core::{
    Audience, DetectionMethod, NewReviewCandidate, Registrant, ReviewCandidate, ReviewDecision,
    SuggestedAction,
};
use crate::models::stats_models::QueueStats;
use crate::store::{
    CandidateStore, DecisionWrite, MatchingError, NormalizationUpdate, PersonStore,
    PopulationFilter, StatusFilter,
};
use crate::utils::db_connect::PgPool;

pub struct PgMatchStore {
    pool: PgPool,
}

impl PgMatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const REGISTRANT_COLUMNS: &str = "id, raw_full_name, normalized_full_name, canonical_full_name, \
     canonical_record_id, career_raw, career_normalized, audience, national_id, email, phone, \
     row_valid, event_id, year, created_at";

const CANDIDATE_COLUMNS: &str = "id, left_id, right_id, audience, left_context, right_context, \
     similarity, method, suggested_action, status, decided_by, decided_at, created_at";

fn registrant_from_row(row: &Row) -> Result<Registrant, MatchingError> {
    let audience: String = row.get("audience");
    Ok(Registrant {
        id: row.get("id"),
        raw_full_name: row.get("raw_full_name"),
        normalized_full_name: row.get("normalized_full_name"),
        canonical_full_name: row.get("canonical_full_name"),
        canonical_record_id: row.get("canonical_record_id"),
        career_raw: row.get("career_raw"),
        career_normalized: row.get("career_normalized"),
        audience: audience.parse()?,
        national_id: row.get("national_id"),
        email: row.get("email"),
        phone: row.get("phone"),
        row_valid: row.get("row_valid"),
        event_id: row.get("event_id"),
        year: row.get("year"),
        created_at: row.get("created_at"),
    })
}

fn candidate_from_row(row: &Row) -> Result<ReviewCandidate, MatchingError> {
    let audience: String = row.get("audience");
    let method: String = row.get("method");
    let suggested_action: String = row.get("suggested_action");
    let status: String = row.get("status");

    let method = match method.as_str() {
        "name_fuzzy" => DetectionMethod::NameFuzzy,
        "strong_identifier" => DetectionMethod::StrongIdentifier,
        "batch_scoped" => DetectionMethod::BatchScoped,
        other => {
            return Err(MatchingError::InvalidInput(format!(
                "unknown detection method '{}' in storage",
                other
            )))
        }
    };
    let suggested_action = match suggested_action.as_str() {
        "auto_accept" => SuggestedAction::AutoAccept,
        "manual_review" => SuggestedAction::ManualReview,
        other => {
            return Err(MatchingError::InvalidInput(format!(
                "unknown suggested action '{}' in storage",
                other
            )))
        }
    };

    Ok(ReviewCandidate {
        id: row.get("id"),
        left_id: row.get("left_id"),
        right_id: row.get("right_id"),
        audience: audience.parse()?,
        left_context: row.get("left_context"),
        right_context: row.get("right_context"),
        similarity: row.get("similarity"),
        method,
        suggested_action,
        status: status.parse()?,
        decided_by: row.get("decided_by"),
        decided_at: row.get("decided_at"),
        created_at: row.get("created_at"),
    })
}

/// Builds the shared WHERE clause for candidate listing. Parameter slots start
/// at `$1`; the returned values line up with the clause's placeholders.
fn candidate_listing_filter(
    status: StatusFilter,
    audience: Option<Audience>,
) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    if let StatusFilter::Only(s) = status {
        params.push(s.as_str().to_string());
        clauses.push(format!("status = ${}", params.len()));
    }
    if let Some(a) = audience {
        params.push(a.as_str().to_string());
        clauses.push(format!("audience = ${}", params.len()));
    }
    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    (where_clause, params)
}

#[async_trait]
impl PersonStore for PgMatchStore {
    async fn get_registrant(&self, id: &str) -> Result<Option<Registrant>, MatchingError> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for get_registrant")?;
        let row = conn
            .query_opt(
                format!(
                    "SELECT {} FROM public.registrant WHERE id = $1",
                    REGISTRANT_COLUMNS
                )
                .as_str(),
                &[&id],
            )
            .await
            .context("Failed to query registrant")?;
        row.as_ref().map(registrant_from_row).transpose()
    }

    async fn query_population(
        &self,
        filter: &PopulationFilter,
    ) -> Result<Vec<Registrant>, MatchingError> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for query_population")?;

        let mut sql = format!(
            "SELECT {} FROM public.registrant \
             WHERE row_valid = TRUE AND normalized_full_name <> ''",
            REGISTRANT_COLUMNS
        );
        // Send bound because the vec is held across the query await.
        let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::new();
        if let Some(audience) = filter.audience {
            params.push(Box::new(audience.as_str().to_string()));
            sql.push_str(&format!(" AND audience = ${}", params.len()));
        }
        if let Some(year) = filter.year {
            params.push(Box::new(year));
            sql.push_str(&format!(" AND year = ${}", params.len()));
        }
        if let Some(event_id) = &filter.event_id {
            params.push(Box::new(event_id.clone()));
            sql.push_str(&format!(" AND event_id = ${}", params.len()));
        }
        // Stable order so limited runs resume deterministically.
        sql.push_str(" ORDER BY id");

        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();
        let rows = conn
            .query(sql.as_str(), &param_refs)
            .await
            .context("Failed to query detection population")?;
        debug!("Loaded {} registrants for detection", rows.len());
        rows.iter().map(registrant_from_row).collect()
    }

    async fn query_unnormalized(&self) -> Result<Vec<Registrant>, MatchingError> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for query_unnormalized")?;
        let rows = conn
            .query(
                format!(
                    "SELECT {} FROM public.registrant \
                     WHERE normalized_full_name = '' ORDER BY id",
                    REGISTRANT_COLUMNS
                )
                .as_str(),
                &[],
            )
            .await
            .context("Failed to query unnormalized registrants")?;
        rows.iter().map(registrant_from_row).collect()
    }

    async fn apply_normalization(
        &self,
        updates: &[NormalizationUpdate],
    ) -> Result<usize, MatchingError> {
        if updates.is_empty() {
            return Ok(0);
        }
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for apply_normalization")?;
        let tx = conn
            .transaction()
            .await
            .context("Failed to begin normalization transaction")?;

        let stmt = tx
            .prepare(
                "UPDATE public.registrant
                 SET raw_full_name = $2, normalized_full_name = $3,
                     canonical_full_name = $4, career_normalized = $5, audience = $6
                 WHERE id = $1",
            )
            .await
            .context("Failed to prepare normalization update")?;

        let mut updated = 0usize;
        for update in updates {
            updated += tx
                .execute(
                    &stmt,
                    &[
                        &update.id,
                        &update.raw_full_name,
                        &update.normalized_full_name,
                        &update.canonical_full_name,
                        &update.career_normalized,
                        &update.audience.as_str(),
                    ],
                )
                .await
                .context(format!("Failed to normalize registrant {}", update.id))?
                as usize;
        }

        tx.commit()
            .await
            .context("Failed to commit normalization batch")?;
        Ok(updated)
    }

    async fn count_registrants(&self) -> Result<(usize, usize), MatchingError> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for count_registrants")?;
        let row = conn
            .query_one(
                "SELECT COUNT(*) AS total,
                        COUNT(*) FILTER (WHERE normalized_full_name <> '') AS normalized
                 FROM public.registrant",
                &[],
            )
            .await
            .context("Failed to count registrants")?;
        let total: i64 = row.get("total");
        let normalized: i64 = row.get("normalized");
        Ok((total as usize, normalized as usize))
    }
}

#[async_trait]
impl CandidateStore for PgMatchStore {
    async fn get_candidate(&self, id: &str) -> Result<Option<ReviewCandidate>, MatchingError> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for get_candidate")?;
        let row = conn
            .query_opt(
                format!(
                    "SELECT {} FROM public.review_candidate WHERE id = $1",
                    CANDIDATE_COLUMNS
                )
                .as_str(),
                &[&id],
            )
            .await
            .context("Failed to query review candidate")?;
        row.as_ref().map(candidate_from_row).transpose()
    }

    async fn existing_pairs(&self) -> Result<HashSet<(String, String)>, MatchingError> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for existing_pairs")?;
        let rows = conn
            .query("SELECT left_id, right_id FROM public.review_candidate", &[])
            .await
            .context("Failed to load existing candidate pairs")?;
        Ok(rows
            .iter()
            .map(|row| (row.get("left_id"), row.get("right_id")))
            .collect())
    }

    async fn insert_candidates(
        &self,
        candidates: &[NewReviewCandidate],
    ) -> Result<usize, MatchingError> {
        if candidates.is_empty() {
            return Ok(0);
        }
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for insert_candidates")?;
        let tx = conn
            .transaction()
            .await
            .context("Failed to begin candidate insert transaction")?;

        let stmt = tx
            .prepare(
                "INSERT INTO public.review_candidate
                 (id, left_id, right_id, audience, left_context, right_context,
                  similarity, method, suggested_action, status, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', CURRENT_TIMESTAMP)
                 ON CONFLICT (left_id, right_id) DO NOTHING",
            )
            .await
            .context("Failed to prepare candidate insert")?;

        let mut added = 0usize;
        for new in candidates {
            let id = Uuid::new_v4().to_string();
            added += tx
                .execute(
                    &stmt,
                    &[
                        &id,
                        &new.left_id,
                        &new.right_id,
                        &new.audience.as_str(),
                        &new.left_context,
                        &new.right_context,
                        &new.similarity,
                        &new.method.as_str(),
                        &new.suggested_action.as_str(),
                    ],
                )
                .await
                .context(format!(
                    "Failed to insert candidate for pair ({}, {})",
                    new.left_id, new.right_id
                ))? as usize;
        }

        tx.commit()
            .await
            .context("Failed to commit candidate batch")?;
        debug!("Inserted {} of {} candidates", added, candidates.len());
        Ok(added)
    }

    async fn list_candidates(
        &self,
        status: StatusFilter,
        audience: Option<Audience>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<ReviewCandidate>, usize), MatchingError> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for list_candidates")?;

        let (where_clause, params) = candidate_listing_filter(status, audience);
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let count_row = conn
            .query_one(
                format!(
                    "SELECT COUNT(*) AS total FROM public.review_candidate {}",
                    where_clause
                )
                .as_str(),
                &param_refs,
            )
            .await
            .context("Failed to count review candidates")?;
        let total: i64 = count_row.get("total");

        let offset = offset as i64;
        let limit = limit as i64;
        let mut page_params = param_refs.clone();
        page_params.push(&limit);
        page_params.push(&offset);
        let rows = conn
            .query(
                format!(
                    "SELECT {} FROM public.review_candidate {} \
                     ORDER BY similarity DESC, created_at ASC \
                     LIMIT ${} OFFSET ${}",
                    CANDIDATE_COLUMNS,
                    where_clause,
                    params.len() + 1,
                    params.len() + 2
                )
                .as_str(),
                &page_params,
            )
            .await
            .context("Failed to list review candidates")?;

        let candidates = rows
            .iter()
            .map(candidate_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((candidates, total as usize))
    }

    async fn apply_decision(
        &self,
        write: &DecisionWrite,
    ) -> Result<ReviewCandidate, MatchingError> {
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for apply_decision")?;
        let tx = conn
            .transaction()
            .await
            .context("Failed to begin decision transaction")?;

        // Lock the candidate row for the duration of the decision so a
        // concurrent reviewer blocks here and then sees a terminal status.
        let row = tx
            .query_opt(
                format!(
                    "SELECT {} FROM public.review_candidate WHERE id = $1 FOR UPDATE",
                    CANDIDATE_COLUMNS
                )
                .as_str(),
                &[&write.candidate_id],
            )
            .await
            .context("Failed to lock review candidate")?
            .ok_or_else(|| MatchingError::not_found("review candidate", &write.candidate_id))?;
        let candidate = candidate_from_row(&row)?;

        if candidate.status.is_terminal() {
            return Err(MatchingError::InvalidTransition {
                id: candidate.id,
                status: candidate.status,
            });
        }

        if write.decision == ReviewDecision::Accept {
            let canonical_name = write.canonical_name.as_deref().ok_or_else(|| {
                MatchingError::InvalidInput("accept requires a canonical name".to_string())
            })?;
            let canonical_record_id = write.canonical_record_id.as_deref().ok_or_else(|| {
                MatchingError::InvalidInput("accept requires a canonical record id".to_string())
            })?;
            tx.execute(
                "UPDATE public.registrant
                 SET canonical_full_name = $1, canonical_record_id = $2
                 WHERE id = ANY($3)",
                &[
                    &canonical_name,
                    &canonical_record_id,
                    &vec![candidate.left_id.clone(), candidate.right_id.clone()],
                ],
            )
            .await
            .context("Failed to relabel registrants with canonical identity")?;
        }

        let decided_at: DateTime<Utc> = Utc::now();
        let new_status = write.decision.resulting_status();
        tx.execute(
            "UPDATE public.review_candidate
             SET status = $2, decided_by = $3, decided_at = $4
             WHERE id = $1",
            &[
                &candidate.id,
                &new_status.as_str(),
                &write.decided_by,
                &decided_at,
            ],
        )
        .await
        .context("Failed to update candidate status")?;

        tx.commit().await.context("Failed to commit decision")?;

        let mut decided = candidate;
        decided.status = new_status;
        decided.decided_by = Some(write.decided_by.clone());
        decided.decided_at = Some(decided_at);
        Ok(decided)
    }

    async fn queue_stats(&self) -> Result<QueueStats, MatchingError> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for queue_stats")?;
        let row = conn
            .query_one(
                "SELECT COUNT(*) AS total,
                        COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                        COUNT(*) FILTER (WHERE status = 'accepted') AS accepted,
                        COUNT(*) FILTER (WHERE status = 'rejected') AS rejected,
                        COUNT(*) FILTER (WHERE status = 'skipped') AS skipped,
                        COUNT(*) FILTER (WHERE audience = 'estudiantes') AS students,
                        COUNT(*) FILTER (WHERE audience = 'colaboradores') AS staff
                 FROM public.review_candidate",
                &[],
            )
            .await
            .context("Failed to load queue stats")?;

        let get = |name: &str| -> usize {
            let value: i64 = row.get(name);
            value as usize
        };
        Ok(QueueStats {
            total: get("total"),
            pending: get("pending"),
            accepted: get("accepted"),
            rejected: get("rejected"),
            skipped: get("skipped"),
            students: get("students"),
            staff: get("staff"),
            ..Default::default()
        })
    }
}
