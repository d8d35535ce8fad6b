//! Hunter.io email finder. Needs an API key and a company hint.

use super::{
    http::{get_json_with_retry, RetryPolicy},
    phone, Contact, LookupProvider, LookupQuery,
};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
pub struct FinderResponse {
    pub data: Option<FinderData>,
}

#[derive(Debug, Deserialize)]
pub struct FinderData {
    pub email: Option<String>,
    pub score: Option<u32>,
    pub phone_number: Option<String>,
}

pub struct HunterProvider {
    client: Client,
    base: Url,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl HunterProvider {
    pub fn new(
        client: Client,
        base_url: &str,
        api_key: Option<String>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("hunter url {base_url}"))?;
        Ok(Self {
            client,
            base,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            retry,
        })
    }

    fn finder_url(&self, query: &LookupQuery) -> Option<Url> {
        let key = self.api_key.as_deref()?;
        let company = query.company.as_deref().filter(|c| !c.trim().is_empty())?;
        if query.first_name.trim().is_empty() || query.last_name.trim().is_empty() {
            return None;
        }
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("company", company.trim())
            .append_pair("first_name", query.first_name.trim())
            .append_pair("last_name", query.last_name.trim())
            .append_pair("api_key", key);
        Some(url)
    }

    async fn find(&self, query: &LookupQuery) -> Result<Option<Contact>> {
        let Some(url) = self.finder_url(query) else {
            debug!("hunter lookup needs an api key, a company and both names");
            return Ok(None);
        };
        let response: FinderResponse = get_json_with_retry(&self.client, &url, self.retry).await?;
        Ok(contact_from(response))
    }
}

impl LookupProvider for HunterProvider {
    fn name(&self) -> &'static str {
        "hunter"
    }

    fn lookup<'a>(&'a self, query: &'a LookupQuery) -> BoxFuture<'a, Result<Option<Contact>>> {
        Box::pin(self.find(query))
    }
}

pub fn contact_from(response: FinderResponse) -> Option<Contact> {
    let data = response.data?;
    let contact = Contact {
        email: data.email.filter(|e| e.contains('@')),
        phone: data.phone_number.as_deref().and_then(phone::normalize),
        company: None,
    };
    if contact.email.is_none() && contact.phone.is_none() {
        return None;
    }
    debug!(score = ?data.score, "hunter match");
    Some(contact)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(key: Option<&str>) -> HunterProvider {
        HunterProvider::new(
            Client::new(),
            "https://hunter.test/v2/email-finder",
            key.map(str::to_string),
            RetryPolicy {
                max_retries: 0,
                initial_backoff_ms: 1,
            },
        )
        .expect("valid url")
    }

    fn query(company: Option<&str>) -> LookupQuery {
        LookupQuery {
            first_name: "Jean".into(),
            last_name: "Dupont".into(),
            company: company.map(str::to_string),
            ..LookupQuery::default()
        }
    }

    #[test]
    fn decodes_email_and_phone() -> Result<()> {
        let response: FinderResponse = serde_json::from_str(
            r#"{"data": {"email": "jean@vtc-premium.fr", "score": 91, "phone_number": "+33 6 12 34 56 78"}, "meta": {}}"#,
        )?;
        let contact = contact_from(response).expect("contact");
        assert_eq!(contact.email.as_deref(), Some("jean@vtc-premium.fr"));
        assert_eq!(contact.phone.as_deref(), Some("06 12 34 56 78"));
        Ok(())
    }

    #[test]
    fn empty_data_is_a_miss() -> Result<()> {
        let response: FinderResponse =
            serde_json::from_str(r#"{"data": {"email": null, "score": null, "phone_number": null}}"#)?;
        assert!(contact_from(response).is_none());
        let response: FinderResponse = serde_json::from_str(r#"{"errors": []}"#)?;
        assert!(contact_from(response).is_none());
        Ok(())
    }

    #[test]
    fn url_needs_key_and_company() {
        assert!(provider(None).finder_url(&query(Some("VTC PREMIUM"))).is_none());
        assert!(provider(Some("k")).finder_url(&query(None)).is_none());
        let url = provider(Some("k"))
            .finder_url(&query(Some("VTC PREMIUM")))
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://hunter.test/v2/email-finder?company=VTC+PREMIUM&first_name=Jean&last_name=Dupont&api_key=k"
        );
    }

    #[tokio::test]
    async fn missing_prerequisites_skip_the_network() -> Result<()> {
        let result = provider(None).lookup(&query(Some("X"))).await?;
        assert!(result.is_none());
        Ok(())
    }
}
