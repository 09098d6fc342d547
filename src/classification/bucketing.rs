//! Bucket assignment.
//!
//! A `BucketIndex` holds the compiled signatures of all buckets. Buckets
//! whose signature does not compile are reported once at build time and
//! never match.

use serde::Serialize;

use crate::crashinfo::CrashInfo;
use crate::logging::structured::LogContext;
use crate::signature::CompiledSignature;
use crate::storage::Bucket;

/// Outcome of classifying one crash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ClassificationDecision {
    Bucketed(i64),
    Unbucketed,
}

impl ClassificationDecision {
    pub fn bucket_id(&self) -> Option<i64> {
        match self {
            ClassificationDecision::Bucketed(id) => Some(*id),
            ClassificationDecision::Unbucketed => None,
        }
    }
}

/// A bucket whose signature failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidBucket {
    pub bucket_id: i64,
    pub error: String,
}

/// Compiled signatures ordered by bucket id.
#[derive(Debug, Default)]
pub struct BucketIndex {
    compiled: Vec<(i64, CompiledSignature)>,
    invalid: Vec<InvalidBucket>,
}

impl BucketIndex {
    /// Compile all saved buckets. Unsaved buckets are skipped.
    pub fn compile(buckets: &[Bucket], ctx: &LogContext) -> Self {
        let mut index = Self::default();

        let mut saved: Vec<(i64, &Bucket)> = buckets
            .iter()
            .filter_map(|bucket| bucket.pk.map(|pk| (pk, bucket)))
            .collect();
        saved.sort_by_key(|(pk, _)| *pk);

        for (pk, bucket) in saved {
            match bucket.signature() {
                Ok(signature) => index.compiled.push((pk, signature)),
                Err(e) => {
                    log::warn!("{} SIGNATURE_INVALID bucket={} error={}", ctx, pk, e);
                    index.invalid.push(InvalidBucket {
                        bucket_id: pk,
                        error: e.to_string(),
                    });
                }
            }
        }

        log::debug!(
            "{} BUCKET_INDEX_COMPILED valid={} invalid={}",
            ctx,
            index.compiled.len(),
            index.invalid.len()
        );

        index
    }

    /// First bucket, by id, whose signature matches.
    pub fn classify(&self, info: &CrashInfo) -> ClassificationDecision {
        self.compiled
            .iter()
            .find(|(_, signature)| signature.matches(info))
            .map(|(pk, _)| ClassificationDecision::Bucketed(*pk))
            .unwrap_or(ClassificationDecision::Unbucketed)
    }

    pub fn invalid_buckets(&self) -> &[InvalidBucket] {
        &self.invalid
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}
