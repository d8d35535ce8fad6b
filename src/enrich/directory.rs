//! Public people directory (Pages Blanches result pages).

use super::{
    http::{get_text_with_retry, RetryPolicy},
    phone, Contact, LookupProvider, LookupQuery,
};
use crate::normalize::canonical_name;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, trace};
use url::Url;

static LISTING: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li.bi, article.bi, div.bi").expect("listing selector"));
static NAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".bi-denomination, h3").expect("name selector"));
static TEL_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href^="tel:"]"#).expect("tel selector"));
static NUMBER: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".number-contact, .tel").expect("number selector"));
static MAIL_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href^="mailto:"]"#).expect("mailto selector"));

pub struct DirectoryProvider {
    client: Client,
    base: Url,
    retry: RetryPolicy,
}

impl DirectoryProvider {
    pub fn new(client: Client, base_url: &str, retry: RetryPolicy) -> Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("directory url {base_url}"))?;
        Ok(Self {
            client,
            base,
            retry,
        })
    }

    fn search_url(&self, query: &LookupQuery) -> Option<Url> {
        if query.last_name.trim().is_empty() {
            return None;
        }
        let who = format!("{} {}", query.last_name.trim(), query.first_name.trim());
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("quoiqui", who.trim())
            .append_pair("ou", query.departement.trim());
        Some(url)
    }

    async fn search(&self, query: &LookupQuery) -> Result<Option<Contact>> {
        let Some(url) = self.search_url(query) else {
            return Ok(None);
        };
        let body = get_text_with_retry(&self.client, &url, self.retry).await?;
        Ok(parse_listing(&body, query))
    }
}

impl LookupProvider for DirectoryProvider {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn lookup<'a>(&'a self, query: &'a LookupQuery) -> BoxFuture<'a, Result<Option<Contact>>> {
        Box::pin(self.search(query))
    }
}

/// First listing whose displayed name carries the candidate's last name and
/// shows a phone number or an email.
pub fn parse_listing(html: &str, query: &LookupQuery) -> Option<Contact> {
    let doc = Html::parse_document(html);
    let last = canonical_name(&query.last_name);
    if last.is_empty() {
        return None;
    }

    for block in doc.select(&LISTING) {
        let name = block
            .select(&NAME)
            .next()
            .map(|n| n.text().collect::<String>())
            .unwrap_or_default();
        if !canonical_name(&name).contains(&last) {
            trace!(name = %name.trim(), "listing skipped");
            continue;
        }

        let contact = Contact {
            phone: block_phone(block),
            email: block
                .select(&MAIL_LINK)
                .filter_map(|a| a.value().attr("href"))
                .filter_map(|href| href.strip_prefix("mailto:"))
                .map(|m| m.split('?').next().unwrap_or(m).trim().to_string())
                .find(|m| m.contains('@')),
            company: None,
        };
        if contact.phone.is_some() || contact.email.is_some() {
            debug!(name = %name.trim(), "directory listing matched");
            return Some(contact);
        }
    }
    None
}

/// Linked numbers first (mobiles preferred), then displayed ones, then any
/// number in the listing text.
fn block_phone(block: ElementRef<'_>) -> Option<String> {
    let linked: Vec<String> = block
        .select(&TEL_LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| href.strip_prefix("tel:"))
        .filter_map(phone::normalize)
        .collect();
    linked
        .iter()
        .find(|p| phone::is_mobile(p))
        .or_else(|| linked.first())
        .cloned()
        .or_else(|| {
            block
                .select(&NUMBER)
                .map(|n| n.text().collect::<String>())
                .find_map(|t| phone::find_in_text(&t))
        })
        .or_else(|| phone::find_in_text(&block.text().collect::<Vec<_>>().join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> LookupQuery {
        LookupQuery {
            first_name: "Jean".into(),
            last_name: "Dupont".into(),
            departement: "75".into(),
            ..LookupQuery::default()
        }
    }

    #[test]
    fn tel_link_wins() {
        let html = r#"
            <ul>
              <li class="bi"><h3 class="bi-denomination">MARTIN Paul</h3>
                <a href="tel:+33142000000">Appeler</a></li>
              <li class="bi"><h3 class="bi-denomination">DUPONT Jean</h3>
                <span class="number-contact">01 45 00 00 00</span>
                <a href="tel:+33612345678">Appeler</a>
                <a href="mailto:jean.dupont@example.fr?subject=x">Écrire</a></li>
            </ul>"#;
        let contact = parse_listing(html, &query()).expect("listing");
        assert_eq!(contact.phone.as_deref(), Some("06 12 34 56 78"));
        assert_eq!(contact.email.as_deref(), Some("jean.dupont@example.fr"));
    }

    #[test]
    fn mobile_link_is_preferred() {
        let html = r#"<li class="bi"><h3 class="bi-denomination">DUPONT Jean</h3>
            <a href="tel:0145000000">Fixe</a><a href="tel:0712345678">Mobile</a></li>"#;
        let contact = parse_listing(html, &query()).expect("listing");
        assert_eq!(contact.phone.as_deref(), Some("07 12 34 56 78"));
    }

    #[test]
    fn number_text_is_used_without_link() {
        let html = r#"<article class="bi"><div class="bi-denomination">Dupont Jean</div>
            <div class="bi-fantomas"><span class="number-contact">Tél : 01.45.00.00.00</span></div>
            </article>"#;
        let contact = parse_listing(html, &query()).expect("listing");
        assert_eq!(contact.phone.as_deref(), Some("01 45 00 00 00"));
        assert_eq!(contact.email, None);
    }

    #[test]
    fn other_names_and_empty_listings_are_misses() {
        let html = r#"<li class="bi"><h3>DURAND Luc</h3><a href="tel:0145000000">x</a></li>
            <li class="bi"><h3>DUPONT Jean</h3><p>Paris 15e</p></li>"#;
        assert!(parse_listing(html, &query()).is_none());
        assert!(parse_listing("<html><body>Aucun résultat</body></html>", &query()).is_none());
    }

    #[test]
    fn url_is_built_from_name_and_department() -> Result<()> {
        let provider = DirectoryProvider::new(
            Client::new(),
            "https://directory.test/recherche",
            RetryPolicy {
                max_retries: 0,
                initial_backoff_ms: 1,
            },
        )?;
        let url = provider.search_url(&query()).expect("url");
        assert_eq!(
            url.as_str(),
            "https://directory.test/recherche?quoiqui=Dupont+Jean&ou=75"
        );
        assert!(provider.search_url(&LookupQuery::default()).is_none());
        Ok(())
    }
}
