//! Official French business registry (recherche-entreprises.api.gouv.fr).
//!
//! The registry exposes no phone or email; a match yields the company
//! name, which later providers use as a hint.

use super::{
    http::{get_json_with_retry, RetryPolicy},
    Contact, LookupProvider, LookupQuery,
};
use crate::normalize::canonical_name;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<Company>,
}

#[derive(Debug, Deserialize)]
pub struct Company {
    #[serde(default)]
    pub siren: String,
    #[serde(default)]
    pub nom_complet: String,
    #[serde(default)]
    pub dirigeants: Vec<Director>,
    pub siege: Option<Establishment>,
}

#[derive(Debug, Deserialize)]
pub struct Director {
    pub nom: Option<String>,
    pub prenoms: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Establishment {
    pub departement: Option<String>,
}

pub struct RegistryProvider {
    client: Client,
    base: Url,
    retry: RetryPolicy,
}

impl RegistryProvider {
    pub fn new(client: Client, base_url: &str, retry: RetryPolicy) -> Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("registry url {base_url}"))?;
        Ok(Self {
            client,
            base,
            retry,
        })
    }

    fn search_url(&self, query: &LookupQuery) -> Option<Url> {
        let name = query.full_name();
        if name.is_empty() {
            return None;
        }
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("q", &name)
            .append_pair("per_page", "5");
        if is_department_code(&query.departement) {
            url.query_pairs_mut()
                .append_pair("departement", query.departement.trim());
        }
        Some(url)
    }

    async fn search(&self, query: &LookupQuery) -> Result<Option<Contact>> {
        let Some(url) = self.search_url(query) else {
            return Ok(None);
        };
        let response: SearchResponse = get_json_with_retry(&self.client, &url, self.retry).await?;
        Ok(best_match(&response, query))
    }
}

impl LookupProvider for RegistryProvider {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn lookup<'a>(&'a self, query: &'a LookupQuery) -> BoxFuture<'a, Result<Option<Contact>>> {
        Box::pin(self.search(query))
    }
}

fn is_department_code(raw: &str) -> bool {
    let code = raw.trim();
    (2..=3).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphanumeric())
}

/// First company whose director (or, failing that, whose name) carries the
/// candidate's last name.
pub fn best_match(response: &SearchResponse, query: &LookupQuery) -> Option<Contact> {
    let last = canonical_name(&query.last_name);
    if last.is_empty() {
        return None;
    }
    let first = canonical_name(&query.first_name);

    let hit = response.results.iter().find(|c| {
        let by_director = c.dirigeants.iter().any(|d| {
            let nom = canonical_name(d.nom.as_deref().unwrap_or_default());
            let prenoms = canonical_name(d.prenoms.as_deref().unwrap_or_default());
            nom == last && (first.is_empty() || prenoms.contains(&first))
        });
        by_director || canonical_name(&c.nom_complet).contains(&last)
    })?;

    debug!(siren = %hit.siren, company = %hit.nom_complet, "registry match");
    Some(Contact {
        company: Some(hit.nom_complet.clone()).filter(|n| !n.is_empty()),
        ..Contact::default()
    })
}
