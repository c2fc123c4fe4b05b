//! Orphaned posts reconciliation.
//!
//! A post is an orphan when its author identifier is missing or does not
//! match any user. Cascading deletion keeps most of them from appearing; this
//! sweep removes those that slipped through (failed cascades, concurrent
//! writes, posts created with a stale identifier).

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::Result;
use crate::id::UserId;
use crate::user::UserFilter;

/// How orphans are found.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Check every post's author one by one. One point query per post, but
    /// every deletion is logged with its reason.
    Scan,
    /// Snapshot user identifiers and delete all non-matching posts in a
    /// single store operation.
    #[default]
    Bulk,
}

impl ReconcileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileMode::Scan => "scan",
            ReconcileMode::Bulk => "bulk",
        }
    }
}

impl fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a reconciliation.
///
/// Only a scan knows how many posts it examined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileReport {
    Scan { deleted: u64, total: u64 },
    Bulk { deleted: u64 },
}

impl ReconcileReport {
    /// Number of deleted posts.
    pub fn deleted(&self) -> u64 {
        match self {
            ReconcileReport::Scan { deleted, .. } | ReconcileReport::Bulk { deleted } => *deleted,
        }
    }

    /// Number of examined posts, for a scan.
    pub fn total(&self) -> Option<u64> {
        match self {
            ReconcileReport::Scan { total, .. } => Some(*total),
            ReconcileReport::Bulk { .. } => None,
        }
    }
}

/// Counts observed by [`Reconciler::audit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Audit {
    pub total_users: u64,
    pub orphans_found: u64,
    pub deleted: u64,
}

/// Finds and deletes orphaned posts.
#[derive(Clone)]
pub struct Reconciler {
    db: Database,
}

impl Reconciler {
    /// Create a new [`Reconciler`].
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Delete every orphaned post using `mode`.
    pub async fn run(&self, mode: ReconcileMode) -> Result<ReconcileReport> {
        tracing::info!(%mode, "starting orphaned posts cleanup");

        let report = match mode {
            ReconcileMode::Scan => self.scan().await?,
            ReconcileMode::Bulk => self.bulk().await?,
        };

        metrics::counter!("orphaned_posts_deleted_total", "mode" => mode.as_str())
            .increment(report.deleted());
        tracing::info!(%mode, deleted = report.deleted(), total = ?report.total(), "orphaned posts cleanup complete");

        Ok(report)
    }

    async fn scan(&self) -> Result<ReconcileReport> {
        let posts = self.db.posts.find_all().await?;
        tracing::debug!(total = posts.len(), "examining posts");

        let mut deleted = 0;
        for post in &posts {
            let Some(author_id) = &post.author_id else {
                tracing::info!(post_id = %post.id, "post has no author, deleting");
                deleted += self.db.posts.delete_by_id(&post.id).await?;
                continue;
            };

            if self.db.users.find_by_id(author_id).await?.is_none() {
                tracing::info!(post_id = %post.id, %author_id, "post author does not exist, deleting");
                deleted += self.db.posts.delete_by_id(&post.id).await?;
            }
        }

        Ok(ReconcileReport::Scan {
            deleted,
            total: posts.len() as u64,
        })
    }

    async fn bulk(&self) -> Result<ReconcileReport> {
        let valid = self.valid_users().await?;
        let deleted = self.db.posts.delete_orphans(&valid).await?;

        Ok(ReconcileReport::Bulk { deleted })
    }

    /// Count orphans then bulk-delete them.
    ///
    /// The count and the deletion are two independent store calls, so
    /// `deleted` may differ from `orphans_found` under concurrent writes.
    pub async fn audit(&self) -> Result<Audit> {
        let valid = self.valid_users().await?;
        let orphans_found = self.db.posts.count_orphans(&valid).await?;
        let deleted = self.db.posts.delete_orphans(&valid).await?;

        metrics::counter!("orphaned_posts_deleted_total", "mode" => ReconcileMode::Bulk.as_str())
            .increment(deleted);
        tracing::info!(
            total_users = valid.len(),
            orphans_found,
            deleted,
            "deleted orphaned posts"
        );

        Ok(Audit {
            total_users: valid.len() as u64,
            orphans_found,
            deleted,
        })
    }

    async fn valid_users(&self) -> Result<HashSet<UserId>> {
        let valid: HashSet<UserId> = self
            .db
            .users
            .find_ids(&UserFilter::all())
            .await?
            .into_iter()
            .collect();
        tracing::debug!(users = valid.len(), "found valid users");

        Ok(valid)
    }
}
