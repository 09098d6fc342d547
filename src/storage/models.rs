//! Database models for crash triage.
//!
//! These models represent the rows of the crash management tables. Reading
//! and writing them is delegated to a `RecordStore`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::key_value;
use crate::crashinfo::{CrashInfo, ProgramConfiguration};
use crate::error::{FormatError, ProviderError, SignatureSyntaxError, StoreError};
use crate::providers::{BugTrackerProvider, ProviderRegistry, RepositoryConfig, RepositoryProvider};
use crate::signature::{compute_hash, normalize_line_endings, CompiledSignature};

use super::store::RecordStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Os {
    pub name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub name: String,
}

/// An external bug tracker instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugProvider {
    pub pk: Option<i64>,
    /// Registry name of the implementation.
    pub classname: String,
    pub hostname: String,
    /// Link to a ticket; every `%s` is replaced by the external id.
    pub url_template: String,
}

impl BugProvider {
    pub fn ticket_url(&self, external_id: &str) -> String {
        self.url_template.replace("%s", external_id)
    }

    /// Resolve the live provider for this record.
    pub fn instance(
        &self,
        registry: &ProviderRegistry,
    ) -> Result<Arc<dyn BugTrackerProvider>, ProviderError> {
        let pk = self.pk.ok_or_else(|| {
            ProviderError::InvalidConfig("bug provider has not been saved".to_string())
        })?;
        registry.resolve_bug_tracker(&self.classname, pk, &self.hostname)
    }
}

/// A ticket filed in an external bug tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bug {
    pub pk: Option<i64>,
    pub external_id: String,
    /// Primary key of the issuing `BugProvider`.
    pub provider_id: i64,
}

/// A deduplication bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub pk: Option<i64>,
    pub signature: String,
    pub short_description: String,
    pub bug_id: Option<i64>,
}

impl Bucket {
    pub fn new(signature: &str, short_description: &str) -> Self {
        Self {
            pk: None,
            signature: signature.to_string(),
            short_description: short_description.to_string(),
            bug_id: None,
        }
    }

    /// Compile the stored signature. Not cached; compile once per pass instead.
    pub fn signature(&self) -> Result<CompiledSignature, SignatureSyntaxError> {
        CompiledSignature::compile(&self.signature)
    }

    /// Hash of the signature text in its stored form.
    pub fn signature_hash(&self) -> String {
        compute_hash(&normalize_line_endings(&self.signature))
    }

    /// Normalize signature line endings and write the bucket.
    pub fn save(&mut self, store: &dyn RecordStore) -> Result<i64, StoreError> {
        self.signature = normalize_line_endings(&self.signature);
        let pk = store.save_bucket(self)?;
        self.pk = Some(pk);
        Ok(pk)
    }
}

/// One submitted crash report.
///
/// `args`, `env` and `metadata` hold canonical JSON. Their list views are not
/// decoded on load; call `deserialize_fields` first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashEntry {
    pub pk: Option<i64>,
    pub created: DateTime<Utc>,
    pub platform: Platform,
    pub product: Product,
    pub os: Os,
    pub client: Client,
    pub testcase_id: Option<i64>,
    pub bucket_id: Option<i64>,
    pub raw_stdout: String,
    pub raw_stderr: String,
    pub raw_crash_data: String,
    args: String,
    env: String,
    metadata: String,
    pub crash_address: String,
    pub short_signature: String,

    #[serde(skip)]
    args_list: Option<Vec<String>>,
    #[serde(skip)]
    env_list: Option<Vec<String>>,
    #[serde(skip)]
    metadata_list: Option<Vec<String>>,
}

impl CrashEntry {
    pub fn new(platform: Platform, product: Product, os: Os, client: Client) -> Self {
        Self {
            pk: None,
            created: Utc::now(),
            platform,
            product,
            os,
            client,
            testcase_id: None,
            bucket_id: None,
            raw_stdout: String::new(),
            raw_stderr: String::new(),
            raw_crash_data: String::new(),
            args: String::new(),
            env: String::new(),
            metadata: String::new(),
            crash_address: String::new(),
            short_signature: String::new(),
            args_list: None,
            env_list: None,
            metadata_list: None,
        }
    }

    pub fn args_text(&self) -> &str {
        &self.args
    }

    pub fn env_text(&self) -> &str {
        &self.env
    }

    pub fn metadata_text(&self) -> &str {
        &self.metadata
    }

    /// `None` until loaded by `deserialize_fields` or set explicitly.
    pub fn args_list(&self) -> Option<&[String]> {
        self.args_list.as_deref()
    }

    pub fn env_list(&self) -> Option<&[String]> {
        self.env_list.as_deref()
    }

    pub fn metadata_list(&self) -> Option<&[String]> {
        self.metadata_list.as_deref()
    }

    /// Decode the persisted JSON fields into their list views.
    ///
    /// Empty fields leave the matching list unloaded. Calling this again
    /// re-reads the persisted text.
    pub fn deserialize_fields(&mut self) -> Result<(), FormatError> {
        if !self.args.is_empty() {
            self.args_list = Some(key_value::decode_args(&self.args)?);
        }
        if !self.env.is_empty() {
            self.env_list = Some(key_value::decode(&self.env)?);
        }
        if !self.metadata.is_empty() {
            self.metadata_list = Some(key_value::decode(&self.metadata)?);
        }
        Ok(())
    }

    /// Replace the program arguments and re-encode the persisted field.
    pub fn set_args(&mut self, args: Vec<String>) -> Result<(), FormatError> {
        self.args = key_value::encode_args(&args)?;
        self.args_list = Some(args);
        Ok(())
    }

    /// Replace the environment (`"KEY=VALUE"` entries) and re-encode it.
    ///
    /// Fails without touching the entry when an entry has no `=`.
    pub fn set_env(&mut self, env: Vec<String>) -> Result<(), FormatError> {
        self.env = key_value::encode(&env)?;
        self.env_list = Some(env);
        Ok(())
    }

    /// Replace the metadata (`"KEY=VALUE"` entries) and re-encode it.
    pub fn set_metadata(&mut self, metadata: Vec<String>) -> Result<(), FormatError> {
        self.metadata = key_value::encode(&metadata)?;
        self.metadata_list = Some(metadata);
        Ok(())
    }

    /// Program configuration this crash ran under, including loaded lists.
    pub fn configuration(&self) -> ProgramConfiguration {
        let mut config = ProgramConfiguration::new(
            &self.product.name,
            &self.platform.name,
            &self.os.name,
            self.product.version.as_deref(),
        );
        if let Some(args) = &self.args_list {
            config = config.with_args(args);
        }
        if let Some(env) = &self.env_list {
            config = config.with_env(env);
        }
        if let Some(metadata) = &self.metadata_list {
            config = config.with_metadata(metadata);
        }
        config
    }

    /// Build crash information from the raw fields. Rebuilt on every call.
    pub fn crash_info(&self) -> CrashInfo {
        CrashInfo::from_raw_crash_data(
            &self.raw_stdout,
            &self.raw_stderr,
            self.configuration(),
            &self.raw_crash_data,
        )
    }

    /// Store the short signature and crash address derived from the raw data.
    pub fn refresh_derived_fields(&mut self) -> CrashInfo {
        let info = self.crash_info();
        self.short_signature = info.short_signature();
        self.crash_address = info.crash_address_string().unwrap_or_default();
        info
    }

    /// Copy of the entry as it reads back from storage: persisted text only,
    /// list views unloaded.
    pub(crate) fn unloaded(&self) -> Self {
        Self {
            args_list: None,
            env_list: None,
            metadata_list: None,
            ..self.clone()
        }
    }

    /// Write the entry. Fields whose lists were never set keep their text.
    pub fn save(&mut self, store: &dyn RecordStore) -> Result<i64, StoreError> {
        let pk = store.save_crash_entry(self)?;
        self.pk = Some(pk);
        Ok(pk)
    }
}

/// A source repository whose mirror is kept by a `RepositoryProvider`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub pk: Option<i64>,
    pub name: String,
    /// Registry name of the implementation.
    pub classname: String,
    /// Path of the local mirror.
    pub location: PathBuf,
}

impl Repository {
    pub fn config(&self, command_timeout: Option<Duration>) -> RepositoryConfig {
        RepositoryConfig {
            location: self.location.clone(),
            command_timeout,
        }
    }

    /// Resolve the live provider for this record.
    pub fn instance(
        &self,
        registry: &ProviderRegistry,
        command_timeout: Option<Duration>,
    ) -> Result<Arc<dyn RepositoryProvider>, ProviderError> {
        registry.resolve_repository(&self.classname, &self.config(command_timeout))
    }
}

/// A set of results reported against one repository revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub pk: Option<i64>,
    pub created: DateTime<Utc>,
    pub repository_id: i64,
    pub revision: String,
    pub branch: Option<String>,
    pub description: String,
}

impl Collection {
    pub fn new(repository_id: i64, revision: &str) -> Self {
        Self {
            pk: None,
            created: Utc::now(),
            repository_id,
            revision: revision.to_string(),
            branch: None,
            description: String::new(),
        }
    }
}
