// src/enrich/mod.rs
//! Phone and email lookup for exported candidates.
//!
//! Every row is run through the providers in a fixed order; the first
//! provider to return a phone is recorded as its source. Rows past the
//! configured limit are written back untouched with status `skipped`.

pub mod directory;
pub mod http;
pub mod hunter;
pub mod phone;
pub mod registry;

use crate::{
    config::EnrichmentConfig,
    error::PipelineError,
    export::{self, CandidateTable},
    normalize::canonical_name,
};
use anyhow::Result;
use futures::future::BoxFuture;
use std::{collections::BTreeMap, fmt, path::Path, time::Duration};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

pub const EMAIL: &str = "email";
pub const PHONE: &str = "phone";
pub const PHONE_SOURCE: &str = "phone_source";
pub const STATUS: &str = "enrichment_status";

/// What a provider is asked about one candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupQuery {
    pub first_name: String,
    pub last_name: String,
    pub registration: String,
    pub departement: String,
    /// Company name learned from an earlier provider.
    pub company: Option<String>,
}

impl LookupQuery {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    fn is_blank(&self) -> bool {
        self.first_name.trim().is_empty()
            && self.last_name.trim().is_empty()
            && self.registration.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contact {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
}

/// One external lookup source.
pub trait LookupProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` is a miss; errors are treated as misses by the resolver.
    fn lookup<'a>(&'a self, query: &'a LookupQuery) -> BoxFuture<'a, Result<Option<Contact>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EnrichmentStatus {
    Found,
    NotFound,
    Skipped,
    Error,
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Found => "found",
            Self::NotFound => "not_found",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub phone: Option<String>,
    pub phone_source: Option<&'static str>,
    pub email: Option<String>,
    pub status: EnrichmentStatus,
}

impl Enrichment {
    fn with_status(status: EnrichmentStatus) -> Self {
        Self {
            phone: None,
            phone_source: None,
            email: None,
            status,
        }
    }
}

/// Column positions of the name fields in a candidate table.
#[derive(Debug, Clone, Copy, Default)]
struct QueryColumns {
    first_name: Option<usize>,
    last_name: Option<usize>,
    registration: Option<usize>,
    departement: Option<usize>,
}

impl QueryColumns {
    fn locate(table: &CandidateTable) -> Self {
        let names: Vec<String> = table.columns.iter().map(|c| canonical_name(c)).collect();
        let find = |pred: fn(&str) -> bool| names.iter().position(|c| pred(c));
        Self {
            first_name: find(|c| c == "prenom" || c == "first_name")
                .or_else(|| find(|c| c.contains("prenom"))),
            last_name: find(|c| c == "nom" || c == "last_name")
                .or_else(|| find(|c| c.starts_with("nom") && !c.contains("complet"))),
            registration: find(|c| c.contains("numero")),
            departement: find(|c| c.contains("departement")),
        }
    }

    fn query(&self, row: &[String]) -> LookupQuery {
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| row.get(i))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };
        LookupQuery {
            first_name: cell(self.first_name),
            last_name: cell(self.last_name),
            registration: cell(self.registration),
            departement: cell(self.departement),
            company: None,
        }
    }
}

pub struct EnrichmentResolver {
    providers: Vec<Box<dyn LookupProvider>>,
    max_rows: usize,
    delay: Duration,
}

impl EnrichmentResolver {
    pub fn new(providers: Vec<Box<dyn LookupProvider>>, max_rows: usize, delay: Duration) -> Self {
        Self {
            providers,
            max_rows,
            delay,
        }
    }

    /// Registry, then directory, then Hunter, sharing one HTTP client.
    pub fn from_config(cfg: &EnrichmentConfig) -> Result<Self> {
        let client = http::build_client(cfg)?;
        let retry = http::RetryPolicy::from_config(cfg);
        let providers: Vec<Box<dyn LookupProvider>> = vec![
            Box::new(registry::RegistryProvider::new(
                client.clone(),
                &cfg.registry_url,
                retry,
            )?),
            Box::new(directory::DirectoryProvider::new(
                client.clone(),
                &cfg.directory_url,
                retry,
            )?),
            Box::new(hunter::HunterProvider::new(
                client,
                &cfg.hunter_url,
                cfg.hunter_api_key.clone(),
                retry,
            )?),
        ];
        Ok(Self::new(providers, cfg.max_rows, cfg.request_delay()))
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Query providers in order until both a phone and an email are known.
    pub async fn resolve(&self, query: &LookupQuery) -> Enrichment {
        if query.is_blank() {
            return Enrichment::with_status(EnrichmentStatus::NotFound);
        }

        let mut query = query.clone();
        let mut found = Enrichment::with_status(EnrichmentStatus::NotFound);
        let mut failures = 0;

        for provider in &self.providers {
            let contact = match provider.lookup(&query).await {
                Ok(Some(contact)) => contact,
                Ok(None) => {
                    debug!(provider = provider.name(), "miss");
                    continue;
                }
                Err(e) => {
                    failures += 1;
                    warn!(provider = provider.name(), error = %e, "lookup failed; treated as a miss");
                    continue;
                }
            };

            if query.company.is_none() {
                query.company = contact.company;
            }
            if found.phone.is_none() {
                if let Some(phone) = contact.phone {
                    found.phone = Some(phone);
                    found.phone_source = Some(provider.name());
                }
            }
            if found.email.is_none() {
                found.email = contact.email;
            }
            if found.phone.is_some() && found.email.is_some() {
                break;
            }
        }

        found.status = if found.phone.is_some() || found.email.is_some() {
            EnrichmentStatus::Found
        } else if failures > 0 && failures == self.providers.len() {
            EnrichmentStatus::Error
        } else {
            EnrichmentStatus::NotFound
        };
        found
    }

    /// Enrich up to `max_rows` rows, one after another, and append the
    /// result columns. Row order and input columns are preserved.
    pub async fn enrich(&self, mut table: CandidateTable) -> (CandidateTable, BTreeMap<EnrichmentStatus, usize>) {
        let columns = QueryColumns::locate(&table);
        if columns.first_name.is_none() && columns.last_name.is_none() && columns.registration.is_none() {
            warn!(columns = ?table.columns, "no name or registration column; nothing to look up");
        }

        let email = table.ensure_column(EMAIL);
        let phone = table.ensure_column(PHONE);
        let source = table.ensure_column(PHONE_SOURCE);
        let status = table.ensure_column(STATUS);

        let mut stats = BTreeMap::new();
        for (idx, row) in table.rows.iter_mut().enumerate() {
            let result = if idx < self.max_rows {
                if idx > 0 && !self.delay.is_zero() {
                    sleep(self.delay).await;
                }
                let query = columns.query(row);
                let result = self.resolve(&query).await;
                debug!(row = idx, name = %query.full_name(), status = %result.status, "row enriched");
                result
            } else {
                Enrichment::with_status(EnrichmentStatus::Skipped)
            };

            if let Some(v) = result.email {
                row[email] = v;
            }
            if let Some(v) = result.phone {
                row[phone] = v;
            }
            if let Some(v) = result.phone_source {
                row[source] = v.to_string();
            }
            row[status] = result.status.as_str().to_string();
            *stats.entry(result.status).or_insert(0) += 1;
        }
        (table, stats)
    }
}

/// Read `input`, enrich it, write `output`. `max_rows` overrides the configured limit.
#[instrument(level = "info", skip(input, output, cfg), fields(input = %input.display(), output = %output.display()))]
pub async fn enrich_csv(
    input: &Path,
    output: &Path,
    cfg: &EnrichmentConfig,
    max_rows: Option<usize>,
) -> Result<BTreeMap<EnrichmentStatus, usize>, PipelineError> {
    let table = export::read_table(input)?;
    if table.is_empty() {
        return Err(PipelineError::invalid_format(input, "no candidate rows"));
    }

    let mut resolver = EnrichmentResolver::from_config(cfg)?;
    if let Some(limit) = max_rows {
        resolver.max_rows = limit;
    }
    info!(
        rows = table.len(),
        max_rows = resolver.max_rows,
        providers = ?resolver.provider_names(),
        "enrichment started"
    );

    let (table, stats) = resolver.enrich(table).await;
    export::write_table(output, &table)?;
    info!(stats = ?stats, "enrichment finished");
    Ok(stats)
}
